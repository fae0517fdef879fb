/// Core domain types for verses, references, and lookups.
use std::fmt;

use serde::Serialize;

/// Index key: "CanonicalBook Chapter:Verse".
/// Newtype prevents mixing with raw, unnormalized reference strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CanonicalReference(
    /// The formatted reference string.
    String,
);

impl CanonicalReference {
    /// Build the key from an already-canonical book name.
    pub fn new(book: &str, chapter: u32, verse: u32) -> Self {
        return Self(format!("{book} {chapter}:{verse}"));
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        return &self.0;
    }
}

impl fmt::Display for CanonicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// One verse of the dataset. Immutable after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verse {
    /// Book name as spelled in the dataset.
    pub book_name: String,
    /// One-based chapter number.
    pub chapter: u32,
    /// Verse text.
    pub text: String,
    /// One-based verse number.
    pub verse: u32,
}

/// One verse resolved from a parsed reference, in canonical form.
/// `is_range` and `range_end` are set when the verse came from a range expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedReference {
    /// Canonical book name.
    pub book: String,
    /// One-based chapter number.
    pub chapter: u32,
    /// Whether this verse is part of a range.
    pub is_range: bool,
    /// Last verse of the range, when `is_range` is set.
    pub range_end: Option<u32>,
    /// One-based verse number.
    pub verse: u32,
}

impl ParsedReference {
    /// The index key for this verse.
    pub fn canonical(&self) -> CanonicalReference {
        return CanonicalReference::new(&self.book, self.chapter, self.verse);
    }
}

/// Output of the reference grammar, before resolution against the index.
/// The book is already canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceQuery {
    /// Whole book, e.g. "Jude". Resolves to its first chapter.
    Book {
        /// Canonical book name.
        book: String,
    },
    /// Whole chapter, e.g. "Psalm 23".
    Chapter {
        /// Canonical book name.
        book: String,
        /// Chapter number.
        chapter: u32,
    },
    /// Single verse, e.g. "John 3:16".
    Verse {
        /// Canonical book name.
        book: String,
        /// Chapter number.
        chapter: u32,
        /// Verse number.
        verse: u32,
    },
    /// Consecutive verses within one chapter, e.g. "Matthew 5:3-5".
    VerseRange {
        /// Canonical book name.
        book: String,
        /// Chapter number.
        chapter: u32,
        /// Last verse, inclusive.
        end: u32,
        /// First verse.
        start: u32,
    },
}

impl ReferenceQuery {
    /// The canonical book name this query targets.
    pub fn book(&self) -> &str {
        return match self {
            Self::Book { book }
            | Self::Chapter { book, .. }
            | Self::Verse { book, .. }
            | Self::VerseRange { book, .. } => book,
        };
    }

    /// Expand verse and range queries into one parsed reference per verse.
    /// Chapter and book queries have no verse numbers yet and expand to nothing.
    ///
    /// Lazy: a range is only as expensive as the verses actually pulled from it.
    pub fn expand(&self) -> impl Iterator<Item = ParsedReference> + '_ {
        let (chapter, start, end, is_range) = match *self {
            Self::Book { .. } => (0, 1, 0, false),
            Self::Chapter { chapter, .. } => (chapter, 1, 0, false),
            Self::Verse { chapter, verse, .. } => (chapter, verse, verse, false),
            Self::VerseRange { chapter, end, start, .. } => (chapter, start, end, true),
        };
        let book = self.book();
        return (start..=end).map(move |verse| {
            return ParsedReference {
                book: book.to_string(),
                chapter,
                is_range,
                range_end: is_range.then_some(end),
                verse,
            };
        });
    }

    /// Whether the query names specific verses (verse or range).
    pub const fn names_verses(&self) -> bool {
        return matches!(self, Self::Verse { .. } | Self::VerseRange { .. });
    }
}

/// A verse returned from a lookup, with its key and display flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerseMatch<'a> {
    /// Whether the presentation layer should visually highlight this verse.
    pub highlighted: bool,
    /// Canonical index key.
    pub reference: &'a CanonicalReference,
    /// The matched verse.
    pub verse: &'a Verse,
}

/// A verse ranked by keyword overlap with a source verse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedVerse<'a> {
    /// Canonical index key of the related verse.
    pub reference: &'a CanonicalReference,
    /// Number of distinct keywords shared with the source.
    pub relevance: usize,
    /// The related verse.
    pub verse: &'a Verse,
}
