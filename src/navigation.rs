//! Reader navigation: chapter locations, the chapter view payload, and the
//! reader's verse selection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::index::VerseIndex;
use crate::service::BibleService;
use crate::types::{CanonicalReference, RelatedVerse, Verse};

/// A chapter of a canonical book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterLocation {
    /// Canonical book name.
    pub book: String,
    /// Chapter number.
    pub chapter: u32,
}

impl fmt::Display for ChapterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{} {}", self.book, self.chapter);
    }
}

impl ChapterLocation {
    /// Location from a canonical book name.
    pub fn new(book: &str, chapter: u32) -> Self {
        return Self { book: book.to_string(), chapter };
    }

    /// The following chapter, crossing into the first chapter of the next
    /// book in dataset order. `None` past the last chapter of the last book.
    pub fn next(&self, index: &VerseIndex) -> Option<Self> {
        let position = index.book_position(&self.book)?;
        let book = index.books().get(position)?;
        if let Some(&chapter) = book.chapters.iter().find(|&&c| return c > self.chapter) {
            return Some(Self::new(&book.name, chapter));
        }
        let following = index.books().get(position.checked_add(1)?)?;
        return following.chapters.first().map(|&c| return Self::new(&following.name, c));
    }

    /// The preceding chapter, crossing into the last chapter of the previous
    /// book in dataset order. `None` before the first chapter of the first book.
    pub fn previous(&self, index: &VerseIndex) -> Option<Self> {
        let position = index.book_position(&self.book)?;
        let book = index.books().get(position)?;
        if let Some(&chapter) = book.chapters.iter().rev().find(|&&c| return c < self.chapter) {
            return Some(Self::new(&book.name, chapter));
        }
        let preceding = index.books().get(position.checked_sub(1)?)?;
        return preceding.chapters.last().map(|&c| return Self::new(&preceding.name, c));
    }
}

/// Request to show a chapter, optionally highlighting some verse numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisplayChapter {
    /// Book, in any accepted spelling.
    pub book: String,
    /// Chapter number.
    pub chapter: u32,
    /// Verse numbers to highlight.
    #[serde(default)]
    pub highlight_verses: Vec<u32>,
}

/// One verse of a chapter view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayVerse<'a> {
    /// Named by the request's highlight list.
    pub highlighted: bool,
    /// Canonical index key.
    pub reference: &'a CanonicalReference,
    /// Part of the reader's current selection.
    pub selected: bool,
    /// The verse.
    pub verse: &'a Verse,
}

/// Everything needed to render one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterView<'a> {
    /// The chapter shown.
    pub location: ChapterLocation,
    /// Chapter after this one, if any.
    pub next: Option<ChapterLocation>,
    /// Chapter before this one, if any.
    pub previous: Option<ChapterLocation>,
    /// Verses ordered by verse number.
    pub verses: Vec<DisplayVerse<'a>>,
}

/// Build the view for a display request.
///
/// # Errors
///
/// Returns `Error::BookNotFound` or `Error::ChapterNotFound`.
pub fn chapter_view<'a>(
    service: &'a BibleService,
    request: &DisplayChapter,
    selection: &Selection,
) -> Result<ChapterView<'a>, Error> {
    let matches = service.get_chapter(&request.book, request.chapter)?;
    let location = ChapterLocation::new(&service.normalizer().normalize(&request.book), request.chapter);

    let verses = matches
        .into_iter()
        .map(|m| {
            return DisplayVerse {
                highlighted: request.highlight_verses.contains(&m.verse.verse),
                reference: m.reference,
                selected: selection.contains(m.reference),
                verse: m.verse,
            };
        })
        .collect();

    return Ok(ChapterView {
        next: location.next(service.index()),
        previous: location.previous(service.index()),
        location,
        verses,
    });
}

/// Verses the reader picked, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected references, oldest first.
    references: Vec<CanonicalReference>,
}

impl Selection {
    /// Add the reference if absent, remove it if present. Returns whether it
    /// is selected afterwards.
    pub fn toggle(&mut self, reference: CanonicalReference) -> bool {
        if let Some(pos) = self.references.iter().position(|r| return *r == reference) {
            self.references.remove(pos);
            return false;
        }
        self.references.push(reference);
        return true;
    }

    /// Whether a reference is selected.
    pub fn contains(&self, reference: &CanonicalReference) -> bool {
        return self.references.contains(reference);
    }

    /// Drop every selected reference.
    pub fn clear(&mut self) {
        self.references.clear();
    }

    /// Selected references, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalReference> {
        return self.references.iter();
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        return self.references.is_empty();
    }

    /// Related verses for each selected reference, concatenated in selection
    /// order. Selected verses and repeats are dropped.
    pub fn related<'a>(&self, service: &'a BibleService) -> Vec<RelatedVerse<'a>> {
        let mut out: Vec<RelatedVerse<'a>> = Vec::new();
        for reference in &self.references {
            for related in service.related_to(std::slice::from_ref(reference)) {
                if self.contains(related.reference) || out.iter().any(|r| return r.reference == related.reference) {
                    continue;
                }
                out.push(related);
            }
        }
        return out;
    }
}

/// Which way to step through chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the end of the dataset.
    Next,
    /// Toward the start of the dataset.
    Previous,
}

/// The reader's position and selection. Moving to another chapter clears
/// the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reader {
    /// Chapter being read.
    location: ChapterLocation,
    /// Verses picked in the current chapter.
    selection: Selection,
}

impl Reader {
    /// Reader opened at the first chapter of the first book.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatasetLoad` if the index has no books.
    pub fn open(service: &BibleService) -> Result<Self, Error> {
        let first = service
            .index()
            .books()
            .first()
            .and_then(|b| return b.chapters.first().map(|&c| return ChapterLocation::new(&b.name, c)))
            .ok_or_else(|| {
                return Error::DatasetLoad {
                    path: service.source().to_path_buf(),
                    reason: "no chapters to open".to_string(),
                };
            })?;
        return Ok(Self { location: first, selection: Selection::default() });
    }

    /// Show a chapter; the selection is cleared.
    ///
    /// # Errors
    ///
    /// Returns `Error::BookNotFound` or `Error::ChapterNotFound`.
    pub fn display<'a>(&mut self, service: &'a BibleService, request: &DisplayChapter) -> Result<ChapterView<'a>, Error> {
        self.selection.clear();
        let view = chapter_view(service, request, &self.selection)?;
        self.location = view.location.clone();
        return Ok(view);
    }

    /// Step one chapter. At either end of the dataset the reader stays put
    /// and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns lookup errors from building the new chapter view.
    pub fn navigate<'a>(
        &mut self,
        service: &'a BibleService,
        direction: Direction,
    ) -> Result<Option<ChapterView<'a>>, Error> {
        let target = match direction {
            Direction::Next => self.location.next(service.index()),
            Direction::Previous => self.location.previous(service.index()),
        };
        let Some(target) = target else {
            return Ok(None);
        };
        let request = DisplayChapter { book: target.book, chapter: target.chapter, highlight_verses: Vec::new() };
        return self.display(service, &request).map(Some);
    }

    /// Toggle a verse of the current chapter. Returns whether it is selected.
    pub fn toggle_verse(&mut self, verse: u32) -> bool {
        let reference = CanonicalReference::new(&self.location.book, self.location.chapter, verse);
        return self.selection.toggle(reference);
    }

    /// Current chapter.
    pub const fn location(&self) -> &ChapterLocation {
        return &self.location;
    }

    /// Current selection.
    pub const fn selection(&self) -> &Selection {
        return &self.selection;
    }
}
