//! Dataset loading: envelope normalization and one schema-validation step.
//!
//! Accepted envelopes:
//! - a flat array of verse records;
//! - an object with a `verses` array (or an object keyed by reference) plus metadata;
//! - an object keyed by book name whose values are arrays of records;
//! - an array (or `books` array) of `{ name, chapters: [[text, ...], ...] }`.
//!
//! Every record passes through [`validate_record`]. Malformed records are
//! quarantined with a reason; they never abort the load.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::types::Verse;

/// `Book C:V` keys of reference-keyed envelopes.
#[allow(clippy::expect_used, reason = "hardcoded pattern")]
static REFERENCE_KEY: Lazy<Regex> = Lazy::new(|| return Regex::new(r"^(.+?)\s+(\d+):(\d+)$").expect("valid regex"));

/// Envelope keys that describe the dataset rather than hold verses.
const METADATA_KEYS: &[&str] = &["metadata", "translation", "version"];

/// A loaded dataset: valid verses in file order plus rejected records.
#[derive(Debug)]
pub struct Dataset {
    /// File the dataset came from.
    pub path: PathBuf,
    /// Records rejected during validation.
    pub quarantined: Vec<Quarantined>,
    /// Translation name from envelope metadata, if present.
    pub translation: Option<String>,
    /// Validated verses in file order.
    pub verses: Vec<Record>,
}

/// A validated verse and its position among all records of the file.
#[derive(Debug, Clone)]
pub struct Record {
    /// Zero-based position among all records (valid or not).
    pub position: usize,
    /// The verse.
    pub verse: Verse,
}

/// A record rejected at load or index time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quarantined {
    /// Zero-based position among all records.
    pub position: usize,
    /// Why the record was rejected.
    pub reason: String,
}

/// Shape of one verse record before validation. Every field is optional so
/// that missing fields produce a specific reason instead of a serde error.
#[derive(Deserialize)]
struct RawVerse {
    /// Book name.
    #[serde(default, alias = "book", alias = "bookName")]
    book_name: Option<String>,
    /// Chapter number.
    #[serde(default)]
    chapter: Option<NumberOrText>,
    /// Verse text.
    #[serde(default)]
    text: Option<String>,
    /// Verse number.
    #[serde(default)]
    verse: Option<NumberOrText>,
}

/// Chapter and verse numbers appear as numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    /// A JSON number.
    Number(u64),
    /// A JSON string expected to hold a number.
    Text(String),
}

/// A record waiting for validation, with whatever its container tells us.
struct Candidate {
    /// Context inherited from the envelope.
    hint: Hint,
    /// The raw record.
    value: Value,
}

/// Fallback values for fields a record leaves out.
enum Hint {
    /// Record sits under a book-name key.
    Book(String),
    /// Record has everything it needs, or nothing to fall back on.
    None,
    /// Record sits under a "Book C:V" key.
    Reference(String),
}

/// Read and validate a dataset file.
///
/// # Errors
///
/// Returns `Error::DatasetLoad` if the file can't be read, isn't JSON, has an
/// unrecognized envelope, or contains no valid verses.
pub fn load(path: &Path) -> Result<Dataset, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        let reason = if e.kind() == std::io::ErrorKind::NotFound {
            "file not found".to_string()
        } else {
            e.to_string()
        };
        return Error::DatasetLoad { path: path.to_path_buf(), reason };
    })?;
    return parse(path, &content);
}

/// Validate dataset JSON that has already been read.
///
/// # Errors
///
/// Returns `Error::DatasetLoad` for invalid JSON, an unrecognized envelope,
/// or a dataset with no valid verses.
pub fn parse(path: &Path, content: &str) -> Result<Dataset, Error> {
    let load_error = |reason: String| {
        return Error::DatasetLoad { path: path.to_path_buf(), reason };
    };

    let root: Value = serde_json::from_str(content).map_err(|e| return load_error(e.to_string()))?;
    let (candidates, translation) = collect_candidates(root).map_err(load_error)?;

    let mut verses = Vec::new();
    let mut quarantined = Vec::new();
    for (position, candidate) in candidates.into_iter().enumerate() {
        match validate_record(candidate) {
            Err(reason) => {
                tracing::debug!(position, %reason, "quarantined dataset record");
                quarantined.push(Quarantined { position, reason });
            },
            Ok(verse) => verses.push(Record { position, verse }),
        }
    }

    if verses.is_empty() {
        return Err(load_error("no valid verse records".to_string()));
    }
    if !quarantined.is_empty() {
        tracing::warn!(count = quarantined.len(), path = %path.display(), "dataset records quarantined");
    }
    tracing::info!(verses = verses.len(), path = %path.display(), "dataset loaded");

    return Ok(Dataset {
        path: path.to_path_buf(),
        quarantined,
        translation,
        verses,
    });
}

/// Flatten any accepted envelope into candidate records.
///
/// # Errors
///
/// Returns a reason string if the top-level shape is not recognized.
fn collect_candidates(root: Value) -> Result<(Vec<Candidate>, Option<String>), String> {
    return match root {
        Value::Array(items) => Ok((candidates_from_array(items), None)),
        Value::Object(mut map) => {
            let translation = translation_from_metadata(&map);
            if let Some(verses) = map.remove("verses") {
                let candidates = match verses {
                    Value::Array(items) => candidates_from_array(items),
                    Value::Object(keyed) => candidates_keyed_by_reference(keyed),
                    _ => return Err("`verses` must be an array or an object".to_string()),
                };
                return Ok((candidates, translation));
            }
            if map.get("books").is_some_and(Value::is_array)
                && let Some(Value::Array(books)) = map.remove("books")
            {
                return Ok((candidates_from_array(books), translation));
            }
            Ok((candidates_keyed_by_book(map), translation))
        },
        _ => Err("top-level JSON must be an array or an object".to_string()),
    };
}

/// Records from an array; book objects with `chapters` are expanded in place.
fn candidates_from_array(items: Vec<Value>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for item in items {
        if is_chapter_book(&item) {
            expand_chapter_book(&item, &mut out);
        } else {
            out.push(Candidate { hint: Hint::None, value: item });
        }
    }
    return out;
}

/// `{ "Genesis 1:1": { "text": ... }, ... }`
fn candidates_keyed_by_reference(keyed: Map<String, Value>) -> Vec<Candidate> {
    return keyed
        .into_iter()
        .map(|(key, value)| return Candidate { hint: Hint::Reference(key), value })
        .collect();
}

/// `{ "Genesis": [ { "chapter": 1, ... } ], ... }`; non-array values are kept
/// as single records so they get quarantined with a reason.
fn candidates_keyed_by_book(map: Map<String, Value>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (key, value) in map {
        if METADATA_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    out.push(Candidate { hint: Hint::Book(key.clone()), value: item });
                }
            },
            Value::Object(_) => out.push(Candidate { hint: Hint::Reference(key), value }),
            other => out.push(Candidate { hint: Hint::None, value: other }),
        }
    }
    return out;
}

/// Whether a value looks like `{ name, chapters: [...] }`.
fn is_chapter_book(value: &Value) -> bool {
    return value.get("chapters").is_some_and(Value::is_array) && value.get("name").is_some_and(Value::is_string);
}

/// Turn `{ name, chapters: [[text]] }` into one candidate per verse.
fn expand_chapter_book(book: &Value, out: &mut Vec<Candidate>) {
    let name = book.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    let Some(chapters) = book.get("chapters").and_then(Value::as_array) else {
        return;
    };

    for (chapter_idx, chapter) in chapters.iter().enumerate() {
        let Some(texts) = chapter.as_array() else {
            out.push(Candidate { hint: Hint::None, value: chapter.clone() });
            continue;
        };
        for (verse_idx, text) in texts.iter().enumerate() {
            let value = serde_json::json!({
                "book_name": name,
                "chapter": chapter_idx.saturating_add(1),
                "text": text,
                "verse": verse_idx.saturating_add(1),
            });
            out.push(Candidate { hint: Hint::None, value });
        }
    }
}

/// Translation name from `translation`, `version`, or `metadata.{translation,name}`.
fn translation_from_metadata(map: &Map<String, Value>) -> Option<String> {
    let direct = ["translation", "version"]
        .iter()
        .find_map(|k| return map.get(*k).and_then(Value::as_str));
    let nested = || {
        let metadata = map.get("metadata")?;
        return ["translation", "name"]
            .iter()
            .find_map(|k| return metadata.get(*k).and_then(Value::as_str));
    };
    return direct.or_else(nested).map(String::from);
}

/// The single schema-validation step every record goes through.
///
/// # Errors
///
/// Returns the reason the record was rejected.
fn validate_record(candidate: Candidate) -> Result<Verse, String> {
    let raw: RawVerse = serde_json::from_value(candidate.value).map_err(|e| return format!("malformed record: {e}"))?;

    let (hint_book, hint_chapter, hint_verse) = match &candidate.hint {
        Hint::Book(book) => (Some(book.clone()), None, None),
        Hint::None => (None, None, None),
        Hint::Reference(key) => match REFERENCE_KEY.captures(key.trim()) {
            Some(caps) => (
                caps.get(1).map(|m| return m.as_str().to_string()),
                caps.get(2).and_then(|m| return m.as_str().parse::<u32>().ok()),
                caps.get(3).and_then(|m| return m.as_str().parse::<u32>().ok()),
            ),
            None => (None, None, None),
        },
    };

    let book_name = raw
        .book_name
        .or(hint_book)
        .map(|b| return b.trim().to_string())
        .filter(|b| return !b.is_empty())
        .ok_or_else(|| return "missing book name".to_string())?;
    let chapter = positive_number(raw.chapter, "chapter")?
        .or(hint_chapter)
        .ok_or_else(|| return "missing chapter".to_string())?;
    let verse = positive_number(raw.verse, "verse")?
        .or(hint_verse)
        .ok_or_else(|| return "missing verse".to_string())?;
    let text = raw
        .text
        .map(|t| return t.trim().to_string())
        .filter(|t| return !t.is_empty())
        .ok_or_else(|| return "missing text".to_string())?;

    return Ok(Verse { book_name, chapter, text, verse });
}

/// Interpret an optional number field; present-but-invalid is an error.
///
/// # Errors
///
/// Returns a reason if the value is zero, negative text, or doesn't fit `u32`.
fn positive_number(value: Option<NumberOrText>, field: &str) -> Result<Option<u32>, String> {
    let parsed = match value {
        None => return Ok(None),
        Some(NumberOrText::Number(n)) => u32::try_from(n).ok(),
        Some(NumberOrText::Text(s)) => s.trim().parse::<u32>().ok(),
    };
    return match parsed {
        Some(n) if n > 0 => Ok(Some(n)),
        _ => Err(format!("invalid {field} number")),
    };
}
