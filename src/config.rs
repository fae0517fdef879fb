use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::books::BookNormalizer;
use crate::error::Error;
use crate::related::RelatedSettings;

/// Config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".verseref.toml";

/// Dataset path used when the config names none.
pub const DEFAULT_DATASET: &str = "data/asv.json";

/// Project configuration loaded from `.verseref.toml`.
/// Every table is optional; missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Extra book spellings: alias -> canonical book.
    pub aliases: BTreeMap<String, String>,
    /// Commentary backend settings.
    pub commentary: CommentarySettings,
    /// Dataset file, resolved against the config's directory.
    pub dataset: PathBuf,
    /// Related-verse ranking settings.
    pub related: RelatedSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

/// The `[commentary]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommentarySettings {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Chat-completion endpoint URL.
    pub endpoint: String,
    /// Model name sent with each request.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CommentarySettings {
    fn default() -> Self {
        return Self {
            api_key_env: "OPENAI_API_KEY".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            timeout_secs: 60,
        };
    }
}

impl CommentarySettings {
    /// Read the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingApiKey` if the variable is unset or empty.
    pub fn api_key(&self) -> Result<String, Error> {
        return std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| return !k.trim().is_empty())
            .ok_or_else(|| return Error::MissingApiKey { var: self.api_key_env.clone() });
    }

    /// Request timeout.
    pub const fn timeout(&self) -> Duration {
        return Duration::from_secs(self.timeout_secs);
    }
}

/// The `[server]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Listening port; `PORT` in the environment takes precedence.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        return Self { port: 3001 };
    }
}

/// Raw TOML structure for `.verseref.toml`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VerserefTomlConfig {
    /// Alias table.
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    /// Commentary table.
    #[serde(default)]
    commentary: CommentarySettings,
    /// Dataset path as written.
    dataset: Option<PathBuf>,
    /// Related table.
    #[serde(default)]
    related: RelatedSettings,
    /// Server table.
    #[serde(default)]
    server: ServerSettings,
}

impl Config {
    /// Load config from `.verseref.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. A file that exists but is
    /// malformed is an error, never a silent fallback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::defaults_in(root));
            },
            Err(e) => return Err(Error::Io(e)),
        };
        return Self::parse(root, &content);
    }

    /// Parse config text whose relative paths resolve against `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(root: &Path, content: &str) -> Result<Self, Error> {
        let raw: VerserefTomlConfig = toml::from_str(content)?;
        let dataset = raw.dataset.unwrap_or_else(|| return PathBuf::from(DEFAULT_DATASET));
        return Ok(Self {
            aliases: raw.aliases,
            commentary: raw.commentary,
            dataset: root.join(dataset),
            related: raw.related,
            server: raw.server,
        });
    }

    /// Defaults with the dataset resolved against `root`.
    fn defaults_in(root: &Path) -> Self {
        return Self {
            aliases: BTreeMap::new(),
            commentary: CommentarySettings::default(),
            dataset: root.join(DEFAULT_DATASET),
            related: RelatedSettings::default(),
            server: ServerSettings::default(),
        };
    }

    /// Book normalizer with the configured aliases applied.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAlias` if an alias would break normalization.
    pub fn normalizer(&self) -> Result<BookNormalizer, Error> {
        return BookNormalizer::new().with_aliases(&self.aliases);
    }

    /// Listening port: `PORT` from the environment, else `[server] port`.
    pub fn port(&self) -> u16 {
        return port_override(std::env::var("PORT").ok().as_deref()).unwrap_or(self.server.port);
    }
}

/// Parse a `PORT` value; unparseable values are ignored with a warning.
fn port_override(value: Option<&str>) -> Option<u16> {
    let raw = value?.trim();
    return match raw.parse::<u16>() {
        Ok(port) => Some(port),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "ignoring invalid PORT");
            None
        },
    };
}
