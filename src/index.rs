//! Verse index: canonical reference -> verse, built once from validated records.

use std::collections::HashMap;

use crate::books::BookNormalizer;
use crate::dataset::{Quarantined, Record};
use crate::types::{CanonicalReference, Verse};

/// One verse as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedVerse {
    /// Canonical book name.
    pub book: String,
    /// Canonical index key.
    pub reference: CanonicalReference,
    /// The verse as loaded.
    pub verse: Verse,
}

/// A book in dataset order with the chapters it has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    /// Chapter numbers present, ascending.
    pub chapters: Vec<u32>,
    /// Canonical book name.
    pub name: String,
}

/// Read-only lookup structure over every indexed verse.
#[derive(Debug, Default)]
pub struct VerseIndex {
    /// Position of each book in `books`.
    book_positions: HashMap<String, usize>,
    /// Books in first-appearance order.
    books: Vec<BookEntry>,
    /// Entry positions per (book, chapter), ordered by verse number.
    by_chapter: HashMap<(String, u32), Vec<usize>>,
    /// Entry position per canonical reference.
    by_reference: HashMap<CanonicalReference, usize>,
    /// Every verse in insertion order.
    entries: Vec<IndexedVerse>,
}

impl VerseIndex {
    /// Build the index. Duplicate canonical references are quarantined and
    /// the first occurrence wins.
    pub fn build(records: Vec<Record>, normalizer: &BookNormalizer) -> (Self, Vec<Quarantined>) {
        let mut index = Self::default();
        let mut quarantined = Vec::new();

        for record in records {
            let book = normalizer.normalize(&record.verse.book_name);
            let reference = CanonicalReference::new(&book, record.verse.chapter, record.verse.verse);
            if index.by_reference.contains_key(&reference) {
                tracing::debug!(position = record.position, %reference, "duplicate verse quarantined");
                quarantined.push(Quarantined {
                    position: record.position,
                    reason: format!("duplicate reference `{reference}`"),
                });
                continue;
            }
            index.insert(book, reference, record.verse);
        }

        for positions in index.by_chapter.values_mut() {
            positions.sort_by_key(|&pos| return index.entries.get(pos).map_or(0, |e| return e.verse.verse));
        }
        for book in &mut index.books {
            book.chapters.sort_unstable();
        }

        tracing::info!(verses = index.entries.len(), books = index.books.len(), "verse index built");
        return (index, quarantined);
    }

    /// Append one verse and update every lookup table.
    fn insert(&mut self, book: String, reference: CanonicalReference, verse: Verse) {
        let position = self.entries.len();
        let chapter = verse.chapter;

        let book_pos = match self.book_positions.get(&book) {
            Some(&pos) => pos,
            None => {
                self.books.push(BookEntry { chapters: Vec::new(), name: book.clone() });
                let pos = self.books.len().saturating_sub(1);
                self.book_positions.insert(book.clone(), pos);
                pos
            },
        };
        if let Some(entry) = self.books.get_mut(book_pos)
            && !entry.chapters.contains(&chapter)
        {
            entry.chapters.push(chapter);
        }

        self.by_chapter.entry((book.clone(), chapter)).or_default().push(position);
        self.by_reference.insert(reference.clone(), position);
        self.entries.push(IndexedVerse { book, reference, verse });
    }

    /// Look up one verse by canonical reference.
    pub fn get(&self, reference: &CanonicalReference) -> Option<&IndexedVerse> {
        return self.by_reference.get(reference).and_then(|&pos| return self.entries.get(pos));
    }

    /// Every verse of a chapter ordered by verse number, or `None` if the
    /// chapter is not indexed.
    pub fn chapter(&self, book: &str, chapter: u32) -> Option<Vec<&IndexedVerse>> {
        let positions = self.by_chapter.get(&(book.to_string(), chapter))?;
        return Some(positions.iter().filter_map(|&pos| return self.entries.get(pos)).collect());
    }

    /// The book entry for a canonical name.
    pub fn book(&self, name: &str) -> Option<&BookEntry> {
        return self.book_position(name).and_then(|pos| return self.books.get(pos));
    }

    /// Position of a book in dataset order.
    pub fn book_position(&self, name: &str) -> Option<usize> {
        return self.book_positions.get(name).copied();
    }

    /// Books in dataset order.
    pub fn books(&self) -> &[BookEntry] {
        return &self.books;
    }

    /// Every verse in insertion order.
    pub fn entries(&self) -> &[IndexedVerse] {
        return &self.entries;
    }

    /// Number of indexed verses.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }
}
