/// Crate-level error types for verseref diagnostics.
use std::path::PathBuf;

/// All errors in verseref carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the input, book, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An alias spelling is not present in the `[aliases]` table.
    #[error("alias not found: `{spelling}`")]
    AliasNotFound {
        /// Spelling that was looked up.
        spelling: String,
    },

    /// The commentary backend returned a non-success status or could not be reached.
    #[error("backend request failed{}: {reason}", status.map(|s| return format!(" ({s})")).unwrap_or_default())]
    Backend {
        /// Description of the failure.
        reason: String,
        /// HTTP status returned by the backend, if a response arrived.
        status: Option<u16>,
    },

    /// The normalized book name has no entries in the verse index.
    #[error("book not found: `{book}`")]
    BookNotFound {
        /// Canonical book name that was looked up.
        book: String,
        /// Known book names that resemble the requested one.
        suggestions: Vec<String>,
    },

    /// The book exists but has no such chapter.
    #[error("chapter not found: {book} {chapter}")]
    ChapterNotFound {
        /// Canonical book name.
        book: String,
        /// Chapter number that was requested.
        chapter: u32,
    },

    /// The dataset could not be read, parsed, or contained no usable verses.
    #[error("dataset load failed: {}: {reason}", path.display())]
    DatasetLoad {
        /// Path the dataset was loaded from.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An alias would map a spelling onto a name that normalizes elsewhere.
    #[error("invalid alias `{spelling}` -> `{book}`: {reason}")]
    InvalidAlias {
        /// Canonical book the alias points to.
        book: String,
        /// Description of the conflict.
        reason: String,
        /// Alias spelling.
        spelling: String,
    },

    /// The input matched no rule of the reference grammar.
    #[error("invalid reference format: `{input}` ({reason})")]
    InvalidReferenceFormat {
        /// Raw input as typed.
        input: String,
        /// What about the input was rejected.
        reason: String,
    },

    /// A commentary request is missing verses or a question.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What the request lacks.
        reason: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed outside dataset loading.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// The environment variable holding the completion API key is unset.
    #[error("missing API key: environment variable `{var}` is not set")]
    MissingApiKey {
        /// Name of the environment variable.
        var: String,
    },

    /// A newer commentary request on the same session replaced this one.
    #[error("request {sequence} superseded by {latest} in session `{session}`")]
    Superseded {
        /// Latest sequence number seen for the session.
        latest: u64,
        /// Sequence number of the superseded request.
        sequence: u64,
        /// Session identifier.
        session: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The config document could not be parsed for editing.
    #[error("toml edit: {0}")]
    TomlEdit(
        /// The wrapped `toml_edit` parse error.
        #[from]
        toml_edit::TomlError,
    ),

    /// The book and chapter exist but the verse does not.
    #[error("verse not found: {reference}")]
    VerseNotFound {
        /// Canonical reference that was looked up.
        reference: String,
    },
}

impl Error {
    /// Process exit code for this error: 2 for lookups that found nothing, 3 otherwise.
    pub const fn exit_code(&self) -> u8 {
        return match self {
            Self::AliasNotFound { .. }
            | Self::BookNotFound { .. }
            | Self::ChapterNotFound { .. }
            | Self::VerseNotFound { .. } => 2,
            _ => 3,
        };
    }
}
