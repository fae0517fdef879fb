use std::fmt::Write as _;

use crate::config::CONFIG_FILE;
use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where one exists,
/// how to fix it. Readable by humans and by agents driving the CLI.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::BookNotFound { book, suggestions } => render_book_not_found(book, suggestions),
        Error::ChapterNotFound { book, chapter } => render_chapter_not_found(book, *chapter),
        Error::DatasetLoad { path, reason } => render_dataset_load(&path.display().to_string(), reason),
        Error::InvalidAlias { book, reason, spelling } => render_invalid_alias(spelling, book, reason),
        Error::InvalidReferenceFormat { input, reason } => render_invalid_reference(input, reason),
        Error::MissingApiKey { var } => render_missing_api_key(var),
        _ => render_generic(e),
    };
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::AliasNotFound { spelling } => format!("\
# Error: Alias Not Found

`{spelling}` is not in the `[aliases]` table of `{CONFIG_FILE}`.

## Fix

List the configured aliases:

    verseref alias list
"),

        Error::Backend { reason, status } => {
            let status = status.map(|s| return format!(" (HTTP {s})")).unwrap_or_default();
            return format!("\
# Error: Commentary Backend Failed{status}

{reason}
");
        },

        Error::InvalidRequest { reason } => format!("\
# Error: Invalid Request

{reason}
"),

        Error::Superseded { latest, sequence, session } => format!("\
# Error: Request Superseded

Request {sequence} in session `{session}` was replaced by request {latest}.
"),

        Error::VerseNotFound { reference } => format!("\
# Error: Verse Not Found

`{reference}` is not in the dataset. The book and chapter exist, so the verse
number is past the end of the chapter.
"),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::Json(e) => format!("\
# Error: JSON

{e}
"),
        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),
        Error::TomlEdit(e) => format!("\
# Error: Invalid TOML

`{CONFIG_FILE}` could not be parsed for editing:

{e}
"),
        // Variants with their own renderer never reach here.
        _ => format!("\
# Error

{e}
"),
    };
}

fn render_book_not_found(book: &str, suggestions: &[String]) -> String {
    let mut out = format!("\
# Error: Book Not Found

No verses for `{book}` in the dataset.
");

    match suggestions {
        [] => out.push_str("\
\n## Fix

List the books the dataset has:

    verseref books
"),
        [only] => {
            let _ = write!(out, "\n## Did you mean `{only}`?\n");
        },
        many => {
            out.push_str("\n## Similar books\n\n");
            for s in many {
                let _ = writeln!(out, "- `{s}`");
            }
        },
    }

    let _ = write!(out, "\
\n## Custom spellings

Map another spelling onto a book in `{CONFIG_FILE}`:

    verseref alias add <spelling> <book>
");
    return out;
}

fn render_chapter_not_found(book: &str, chapter: u32) -> String {
    return format!("\
# Error: Chapter Not Found

`{book}` has no chapter {chapter} in the dataset.

## Fix

List the book's chapters, or start from the first one:

    verseref books
    verseref chapter \"{book}\" 1
");
}

fn render_dataset_load(path: &str, reason: &str) -> String {
    return format!("\
# Error: Dataset Load Failed

`{path}`: {reason}

## Fix

Point `dataset` in `{CONFIG_FILE}` at a verse JSON file, or pass it directly:

    verseref --dataset path/to/bible.json check
");
}

fn render_invalid_alias(spelling: &str, book: &str, reason: &str) -> String {
    return format!("\
# Error: Invalid Alias

`{spelling}` -> `{book}`: {reason}

## Fix

Alias spellings name a book without its ordinal (`jn`, not `1 jn`); the
ordinal is matched separately. Targets must be canonical names such as
`John` or `Song of Solomon`.
");
}

fn render_invalid_reference(input: &str, reason: &str) -> String {
    return format!("\
# Error: Invalid Reference

`{input}`: {reason}

## Accepted forms

    Genesis 1:1          single verse
    Matthew 5:3-5        verse range (hyphen or en dash, no spaces)
    Psalm 23             whole chapter
    Jude                 first chapter of a book
    John 3:16 - note     text after ` - ` is ignored
");
}

fn render_missing_api_key(var: &str) -> String {
    return format!("\
# Error: Missing API Key

Commentary requests need an API key in `${var}`.

## Fix

    export {var}=sk-...

Or name another variable in `{CONFIG_FILE}`:

    [commentary]
    api_key_env = \"MY_KEY_VAR\"
");
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn single_suggestion_asks_did_you_mean() {
        let md = render_error(&Error::BookNotFound {
            book: "Genisis".to_string(),
            suggestions: vec!["Genesis".to_string()],
        });
        assert!(md.starts_with("# Error: Book Not Found"));
        assert!(md.contains("## Did you mean `Genesis`?"));
    }

    #[test]
    fn no_suggestion_points_at_books_command() {
        let md = render_error(&Error::BookNotFound { book: "Zzz".to_string(), suggestions: Vec::new() });
        assert!(md.contains("verseref books"));
    }

    #[test]
    fn several_suggestions_are_listed() {
        let md = render_error(&Error::BookNotFound {
            book: "Jo".to_string(),
            suggestions: vec!["Job".to_string(), "Joel".to_string()],
        });
        assert!(md.contains("- `Job`\n- `Joel`"));
    }

    #[test]
    fn every_variant_has_a_heading() {
        let errors = [
            Error::AliasNotFound { spelling: "x".to_string() },
            Error::Backend { reason: "timeout".to_string(), status: Some(504) },
            Error::ChapterNotFound { book: "Jude".to_string(), chapter: 2 },
            Error::DatasetLoad { path: PathBuf::from("data/asv.json"), reason: "file not found".to_string() },
            Error::InvalidAlias { book: "John".to_string(), reason: "r".to_string(), spelling: "1jn".to_string() },
            Error::InvalidReferenceFormat { input: "3:16".to_string(), reason: "r".to_string() },
            Error::InvalidRequest { reason: "Invalid verses format".to_string() },
            Error::MissingApiKey { var: "OPENAI_API_KEY".to_string() },
            Error::Superseded { latest: 2, sequence: 1, session: "s".to_string() },
            Error::VerseNotFound { reference: "John 3:99".to_string() },
        ];
        for e in &errors {
            let md = render_error(e);
            assert!(md.starts_with("# Error"), "{md}");
        }
        assert!(render_error(&errors[1]).contains("(HTTP 504)"));
    }
}
