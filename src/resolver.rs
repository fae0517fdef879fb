use crate::books::BookNormalizer;
use crate::error::Error;
use crate::index::{BookEntry, IndexedVerse, VerseIndex};
use crate::types::{ReferenceQuery, VerseMatch};

/// Resolve a parsed query against the index.
///
/// Verse and range queries return the named verses highlighted; chapter
/// queries return the whole chapter unhighlighted; book queries return the
/// book's first chapter unhighlighted.
///
/// # Errors
///
/// Returns `Error::BookNotFound` (with suggestions) if the book isn't indexed,
/// `Error::ChapterNotFound` if the chapter isn't, or `Error::VerseNotFound`
/// for the first named verse that is missing.
pub fn resolve<'a>(
    index: &'a VerseIndex,
    normalizer: &BookNormalizer,
    query: &ReferenceQuery,
) -> Result<Vec<VerseMatch<'a>>, Error> {
    let book = find_book(index, normalizer, query.book())?;

    return match query {
        ReferenceQuery::Book { .. } => {
            let first = book.chapters.first().copied().unwrap_or(1);
            let verses = find_chapter(index, &book.name, first)?;
            Ok(verses.into_iter().map(|v| return as_match(v, false)).collect())
        },
        ReferenceQuery::Chapter { chapter, .. } => {
            let verses = find_chapter(index, &book.name, *chapter)?;
            Ok(verses.into_iter().map(|v| return as_match(v, false)).collect())
        },
        ReferenceQuery::Verse { chapter, .. } | ReferenceQuery::VerseRange { chapter, .. } => {
            find_chapter(index, &book.name, *chapter)?;
            // The first missing verse stops the expansion.
            query
                .expand()
                .map(|parsed| {
                    let reference = parsed.canonical();
                    return index
                        .get(&reference)
                        .map(|v| return as_match(v, true))
                        .ok_or_else(|| return Error::VerseNotFound { reference: reference.to_string() });
                })
                .collect()
        },
    };
}

/// Look up a canonical book, suggesting near misses when it is absent.
///
/// # Errors
///
/// Returns `Error::BookNotFound` if the index has no verses for `book`.
pub fn find_book<'a>(index: &'a VerseIndex, normalizer: &BookNormalizer, book: &str) -> Result<&'a BookEntry, Error> {
    return index.book(book).ok_or_else(|| {
        let known = index.books().iter().map(|b| return b.name.as_str());
        return Error::BookNotFound {
            book: book.to_string(),
            suggestions: normalizer.suggest(book, known),
        };
    });
}

/// Every verse of one chapter of an indexed book.
///
/// # Errors
///
/// Returns `Error::ChapterNotFound` if the chapter has no verses.
pub fn find_chapter<'a>(index: &'a VerseIndex, book: &str, chapter: u32) -> Result<Vec<&'a IndexedVerse>, Error> {
    return index.chapter(book, chapter).ok_or_else(|| {
        return Error::ChapterNotFound { book: book.to_string(), chapter };
    });
}

/// Wrap an indexed verse for output.
const fn as_match(indexed: &IndexedVerse, highlighted: bool) -> VerseMatch<'_> {
    return VerseMatch {
        highlighted,
        reference: &indexed.reference,
        verse: &indexed.verse,
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use crate::types::Verse;

    fn index() -> VerseIndex {
        let rows = [("Genesis", 1, 1), ("Genesis", 1, 2), ("Genesis", 2, 1), ("Jude", 1, 1), ("Jude", 1, 2)];
        let records = rows
            .iter()
            .enumerate()
            .map(|(position, (book, chapter, verse))| Record {
                position,
                verse: Verse {
                    book_name: (*book).to_string(),
                    chapter: *chapter,
                    text: format!("{book} {chapter}:{verse}"),
                    verse: *verse,
                },
            })
            .collect();
        return VerseIndex::build(records, &BookNormalizer::new()).0;
    }

    fn resolve_refs(query: &ReferenceQuery) -> Result<Vec<(String, bool)>, Error> {
        let index = index();
        let matches = resolve(&index, &BookNormalizer::new(), query)?;
        return Ok(matches.iter().map(|m| (m.reference.to_string(), m.highlighted)).collect());
    }

    #[test]
    fn verse_is_highlighted() {
        let query = ReferenceQuery::Verse { book: "Genesis".into(), chapter: 1, verse: 2 };
        assert_eq!(resolve_refs(&query).unwrap(), vec![("Genesis 1:2".to_string(), true)]);
    }

    #[test]
    fn chapter_is_not_highlighted() {
        let query = ReferenceQuery::Chapter { book: "Genesis".into(), chapter: 1 };
        let refs = resolve_refs(&query).unwrap();
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|(_, highlighted)| !highlighted));
    }

    #[test]
    fn book_resolves_to_first_chapter() {
        let query = ReferenceQuery::Book { book: "Jude".into() };
        let refs: Vec<String> = resolve_refs(&query).unwrap().into_iter().map(|(r, _)| r).collect();
        assert_eq!(refs, vec!["Jude 1:1", "Jude 1:2"]);
    }

    #[test]
    fn missing_book_suggests_near_names() {
        let query = ReferenceQuery::Verse { book: "Genisis".into(), chapter: 1, verse: 1 };
        match resolve_refs(&query) {
            Err(Error::BookNotFound { book, suggestions }) => {
                assert_eq!(book, "Genisis");
                assert_eq!(suggestions, vec!["Genesis".to_string()]);
            },
            other => panic!("expected BookNotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_chapter_and_verse() {
        let chapter = ReferenceQuery::Verse { book: "Genesis".into(), chapter: 9, verse: 1 };
        assert!(matches!(resolve_refs(&chapter), Err(Error::ChapterNotFound { chapter: 9, .. })));

        let range = ReferenceQuery::VerseRange { book: "Genesis".into(), chapter: 1, end: 3, start: 1 };
        match resolve_refs(&range) {
            Err(Error::VerseNotFound { reference }) => assert_eq!(reference, "Genesis 1:3"),
            other => panic!("expected VerseNotFound, got {other:?}"),
        }
    }

    #[test]
    fn range_past_the_chapter_stops_at_the_first_gap() {
        let range = ReferenceQuery::VerseRange { book: "Genesis".into(), chapter: 1, end: u32::MAX, start: 1 };
        match resolve_refs(&range) {
            Err(Error::VerseNotFound { reference }) => assert_eq!(reference, "Genesis 1:3"),
            other => panic!("expected VerseNotFound, got {other:?}"),
        }
    }
}
