use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{self, CONFIG_FILE};
use crate::error;

// ── CLI commands ──────────────────────────────────────────────────────

/// List configured aliases, sorted by spelling.
///
/// # Errors
///
/// Returns errors from config loading.
pub fn cmd_list(root: &Path) -> Result<(), error::Error> {
    let aliases = configured(root)?;

    if aliases.is_empty() {
        println!("No aliases configured.");
        return Ok(());
    }

    for (spelling, book) in &aliases {
        println!("{spelling} -> {book}");
    }
    return Ok(());
}

/// Add an alias after checking it keeps normalization consistent.
///
/// # Errors
///
/// Returns `Error::InvalidAlias` if the alias is rejected, or errors from
/// config reading and writing.
pub fn cmd_add(root: &Path, spelling: &str, book: &str) -> Result<(), error::Error> {
    let config = config::Config::load(root)?;
    let mut aliases = config.aliases;
    aliases.insert(spelling.to_string(), book.to_string());
    let normalizer = crate::books::BookNormalizer::new().with_aliases(&aliases)?;
    let canonical = normalizer.normalize(book);

    add_to_config(root, spelling, &canonical)?;
    println!("Added alias: {spelling} -> {canonical}");
    return Ok(());
}

/// Remove an alias.
///
/// # Errors
///
/// Returns `Error::AliasNotFound` if the spelling isn't configured, or errors
/// from config reading and writing.
pub fn cmd_remove(root: &Path, spelling: &str) -> Result<(), error::Error> {
    remove_from_config(root, spelling)?;
    println!("Removed alias: {spelling}");
    return Ok(());
}

// ── Config file editing ───────────────────────────────────────────────

/// Parse `.verseref.toml` into a format-preserving document.
/// Returns an empty document if the file doesn't exist.
///
/// # Errors
///
/// Returns `Error::Io` on read failure or `Error::TomlEdit` on parse failure.
fn read_config_doc(root: &Path) -> Result<(PathBuf, toml_edit::DocumentMut), error::Error> {
    let config_path = root.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(error::Error::Io(e)),
    };

    let doc: toml_edit::DocumentMut = content.parse()?;
    return Ok((config_path, doc));
}

/// Write an alias into `.verseref.toml`, creating `[aliases]` if needed.
///
/// # Errors
///
/// Returns `Error::TomlEdit` if the config can't be parsed, or `Error::Io`
/// if writing fails.
fn add_to_config(root: &Path, spelling: &str, book: &str) -> Result<(), error::Error> {
    let (config_path, mut doc) = read_config_doc(root)?;

    if !doc.contains_key("aliases") {
        doc["aliases"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    doc["aliases"][spelling] = toml_edit::value(book);

    std::fs::write(&config_path, doc.to_string())?;
    tracing::info!(spelling, book, path = %config_path.display(), "alias written");
    return Ok(());
}

/// Remove an alias key from `.verseref.toml`.
///
/// # Errors
///
/// Returns `Error::AliasNotFound` if the spelling isn't in `[aliases]`.
fn remove_from_config(root: &Path, spelling: &str) -> Result<(), error::Error> {
    let (config_path, mut doc) = read_config_doc(root)?;
    let not_found = || return error::Error::AliasNotFound { spelling: spelling.to_string() };

    let aliases = doc
        .get_mut("aliases")
        .and_then(toml_edit::Item::as_table_mut)
        .ok_or_else(not_found)?;
    if aliases.remove(spelling).is_none() {
        return Err(not_found());
    }

    std::fs::write(&config_path, doc.to_string())?;
    return Ok(());
}

/// Aliases as currently written, for callers that don't need the full config.
///
/// # Errors
///
/// Returns errors from config loading.
pub fn configured(root: &Path) -> Result<BTreeMap<String, String>, error::Error> {
    return Ok(config::Config::load(root)?.aliases);
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use super::*;

    #[test]
    fn add_creates_table_and_preserves_other_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "# my bible\ndataset = \"kjv.json\"\n").unwrap();

        cmd_add(dir.path(), "canticle", "song of solomon").unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# my bible\ndataset = \"kjv.json\"\n"));
        let aliases = configured(dir.path()).unwrap();
        assert_eq!(aliases.get("canticle").map(String::as_str), Some("Song of Solomon"));
    }

    #[test]
    fn add_rejects_shadowing_alias() {
        let dir = tempfile::tempdir().unwrap();
        let err = cmd_add(dir.path(), "Genesis", "Exodus").unwrap_err();
        assert!(matches!(err, error::Error::InvalidAlias { .. }), "{err}");
        assert!(!dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn remove_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        cmd_add(dir.path(), "apoc", "Revelation").unwrap();
        cmd_remove(dir.path(), "apoc").unwrap();
        assert!(configured(dir.path()).unwrap().is_empty());

        let err = cmd_remove(dir.path(), "apoc").unwrap_err();
        assert!(matches!(err, error::Error::AliasNotFound { .. }));
    }

    #[test]
    fn remove_without_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(cmd_remove(dir.path(), "x"), Err(error::Error::AliasNotFound { .. })));
    }
}
