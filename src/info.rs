use std::path::Path;

use serde::Serialize;

use crate::config::{self, CONFIG_FILE};
use crate::service::BibleService;

/// Output the verseref reference document for the project at `root`.
/// `dataset` overrides the configured dataset path.
pub fn run(root: &Path, dataset: Option<&Path>, json: bool) {
    let state = gather_state(root, dataset);

    if json {
        print_json(&state);
    } else {
        print_markdown(&state);
    }
}

// ── State gathering ───────────────────────────────────────────────────

/// What `info` reports about the working directory.
struct CurrentState {
    /// Aliases from the config, sorted by spelling.
    aliases: Vec<(String, String)>,
    /// Whether `.verseref.toml` exists.
    config_found: bool,
    /// Dataset path after config and CLI overrides.
    dataset: String,
    /// Records set aside while loading, if the dataset loaded.
    quarantined: Option<usize>,
    /// Translation label from the dataset envelope.
    translation: Option<String>,
    /// Indexed verses, if the dataset loaded.
    verses: Option<usize>,
}

/// Inspect config and dataset without failing; anything unreadable is
/// reported as absent.
fn gather_state(root: &Path, dataset: Option<&Path>) -> CurrentState {
    let config_found = root.join(CONFIG_FILE).exists();
    let config = config::Config::load(root).ok();

    let aliases = config
        .as_ref()
        .map(|c| return c.aliases.iter().map(|(k, v)| return (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let dataset_path = dataset
        .map(Path::to_path_buf)
        .or_else(|| return config.as_ref().map(|c| return c.dataset.clone()))
        .unwrap_or_else(|| return root.join(config::DEFAULT_DATASET));

    let service = config.as_ref().and_then(|c| {
        let normalizer = c.normalizer().ok()?;
        return BibleService::open(&dataset_path, normalizer, c.related).ok();
    });

    return CurrentState {
        aliases,
        config_found,
        dataset: dataset_path.display().to_string(),
        quarantined: service.as_ref().map(|s| return s.quarantined().len()),
        translation: service.as_ref().and_then(|s| return s.translation().map(String::from)),
        verses: service.as_ref().map(|s| return s.index().len()),
    };
}

// ── Markdown output ───────────────────────────────────────────────────

/// Full reference card.
fn print_markdown(state: &CurrentState) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_state(state);
    println!();
    print_markdown_exit_codes();
}

/// Static part of the card.
fn print_markdown_header(version: &str) {
    print!(
        "\
# verseref {version}

Parse scripture references, look up verses, and proxy commentary requests.

## Reference Syntax

    Genesis 1:1                 single verse
    Matthew 5:3-5               verse range (also `5:3–5`)
    Psalm 23                    whole chapter
    Jude                        first chapter of a book
    1 John 4:8 / I John 4:8     ordinals as digits or roman numerals
    jn 3:16 - for Sunday        abbreviations; text after ` - ` is ignored

## Commands

    verseref verse <reference>              Verses a reference names
    verseref parse <reference>              Grammar rule and expanded verses
    verseref chapter <book> <n>             A chapter (--highlight, --select, --next, --prev)
    verseref search <text>                  Case-insensitive text search
    verseref related <reference>...         Verses sharing keywords with the references
    verseref books                          Books and chapter counts
    verseref check                          Report records set aside while loading
    verseref ask <kind> <reference>...      Commentary (--prompt for a note or question)
    verseref serve                          HTTP API (PORT overrides the port)
    verseref alias list|add|remove          Manage custom book spellings

Global options: --dataset <path>, --format text|json. Set RUST_LOG=verseref=debug
for logs on stderr.

## HTTP Endpoints

| Endpoint | Method |
|----------|--------|
| /api/verse?reference= | GET |
| /api/chapter/:book/:chapter?highlight=1,2 | GET |
| /api/search?q= | GET |
| /api/related?reference= | GET |
| /api/books | GET |
| /api/gpt/analyze, historical-context, theological-insights, question | POST |

## Configuration ({CONFIG_FILE})

    dataset = \"data/asv.json\"

    [aliases]
    canticle = \"Song of Solomon\"

    [related]
    limit = 5
    min_keyword_length = 5
    min_shared_keywords = 2

    [commentary]
    api_key_env = \"OPENAI_API_KEY\"
    model = \"gpt-3.5-turbo\"
    timeout_secs = 60

    [server]
    port = 3001

## Current State

"
    );
}

/// Lines describing the working directory.
fn print_markdown_state(state: &CurrentState) {
    if state.config_found {
        println!("Config:   {CONFIG_FILE} (found)");
    } else {
        println!("Config:   {CONFIG_FILE} (not found)");
    }

    match (state.verses, state.quarantined) {
        (Some(n), Some(0)) => println!("Dataset:  {} ({n} verses)", state.dataset),
        (Some(n), Some(q)) => println!("Dataset:  {} ({n} verses, {q} quarantined)", state.dataset),
        _ => println!("Dataset:  {} (not loaded)", state.dataset),
    }

    if let Some(t) = &state.translation {
        println!("Version:  {t}");
    }

    if state.aliases.is_empty() {
        println!("Aliases:  (none)");
    } else {
        let list = state
            .aliases
            .iter()
            .map(|(spelling, book)| return format!("{spelling} -> {book}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Aliases:  {list}");
    }
}

/// Exit code table.
fn print_markdown_exit_codes() {
    print!(
        "\
## Exit Codes

| Code | Meaning |
|------|---------|
| 0    | Success |
| 1    | `check` found quarantined records |
| 2    | Book, chapter, verse, or alias not found |
| 3    | Runtime error |
"
    );
}

// ── JSON output ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct InfoJson {
    version: String,
    commands: Vec<String>,
    endpoints: Vec<String>,
    exit_codes: Vec<ExitCodeInfo>,
    current_state: StateJson,
}

#[derive(Serialize)]
struct ExitCodeInfo {
    code: u8,
    meaning: String,
}

#[derive(Serialize)]
struct StateJson {
    aliases: Vec<AliasJson>,
    config_found: bool,
    dataset: String,
    quarantined: Option<usize>,
    translation: Option<String>,
    verses: Option<usize>,
}

#[derive(Serialize)]
struct AliasJson {
    book: String,
    spelling: String,
}

/// Card as JSON on stdout.
fn print_json(state: &CurrentState) {
    let names = |items: &[&str]| return items.iter().map(|s| return (*s).to_string()).collect::<Vec<_>>();
    let info = InfoJson {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commands: names(&["verse", "parse", "chapter", "search", "related", "books", "check", "ask", "serve", "alias", "info"]),
        endpoints: names(&[
            "GET /api/verse",
            "GET /api/chapter/:book/:chapter",
            "GET /api/search",
            "GET /api/related",
            "GET /api/books",
            "POST /api/gpt/:kind",
        ]),
        exit_codes: vec![
            ExitCodeInfo { code: 0, meaning: "Success".to_string() },
            ExitCodeInfo { code: 1, meaning: "Quarantined records found".to_string() },
            ExitCodeInfo { code: 2, meaning: "Not found".to_string() },
            ExitCodeInfo { code: 3, meaning: "Runtime error".to_string() },
        ],
        current_state: StateJson {
            aliases: state
                .aliases
                .iter()
                .map(|(spelling, book)| return AliasJson { book: book.clone(), spelling: spelling.clone() })
                .collect(),
            config_found: state.config_found,
            dataset: state.dataset.clone(),
            quarantined: state.quarantined,
            translation: state.translation.clone(),
            verses: state.verses,
        },
    };

    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info).unwrap_or_default();
    println!("{json}");
}
