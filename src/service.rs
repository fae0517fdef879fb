//! The Bible service: one explicit object owning the index, normalizer, and
//! grammar, plus a lazily loaded shared handle for long-running consumers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::books::BookNormalizer;
use crate::dataset::{self, Dataset, Quarantined};
use crate::error::Error;
use crate::grammar::ReferenceGrammar;
use crate::index::VerseIndex;
use crate::related::{self, RelatedSettings};
use crate::resolver;
use crate::types::{CanonicalReference, ParsedReference, ReferenceQuery, RelatedVerse, VerseMatch};

/// Query operations over one loaded dataset. Read-only after construction.
pub struct BibleService {
    /// Reference grammar.
    grammar: ReferenceGrammar,
    /// Verse lookup tables.
    index: VerseIndex,
    /// Book-name normalizer, including configured aliases.
    normalizer: BookNormalizer,
    /// Records rejected at load or index time, by position.
    quarantined: Vec<Quarantined>,
    /// Related-verse ranking settings.
    related: RelatedSettings,
    /// Dataset file.
    source: PathBuf,
    /// Translation name from dataset metadata.
    translation: Option<String>,
}

impl BibleService {
    /// Load a dataset file and build the service.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatasetLoad` if the file can't be loaded or has no valid verses.
    pub fn open(path: &Path, normalizer: BookNormalizer, related: RelatedSettings) -> Result<Self, Error> {
        let dataset = dataset::load(path)?;
        return Ok(Self::from_dataset(dataset, normalizer, related));
    }

    /// Build the service from an already-validated dataset.
    pub fn from_dataset(dataset: Dataset, normalizer: BookNormalizer, related: RelatedSettings) -> Self {
        let (index, duplicates) = VerseIndex::build(dataset.verses, &normalizer);
        let mut quarantined = dataset.quarantined;
        quarantined.extend(duplicates);
        quarantined.sort_by_key(|q| return q.position);

        return Self {
            grammar: ReferenceGrammar::new(),
            index,
            normalizer,
            quarantined,
            related,
            source: dataset.path,
            translation: dataset.translation,
        };
    }

    /// Parse a reference without touching the index.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReferenceFormat` if no grammar rule accepts the input.
    pub fn parse_reference(&self, input: &str) -> Result<ReferenceQuery, Error> {
        return self.grammar.parse(input, &self.normalizer);
    }

    /// Name of the grammar rule that accepts `input`, if any.
    pub fn reference_rule(&self, input: &str) -> Option<&'static str> {
        return self.grammar.matching_rule(input);
    }

    /// Parse a reference into one parsed reference per verse it names.
    /// Chapter and book references expand to every verse of the chapter.
    /// Every named verse must exist, so a range is never longer than its chapter.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReferenceFormat` for unparseable input, and the
    /// lookup errors of [`Self::get_verse`].
    pub fn parse_verses(&self, input: &str) -> Result<Vec<ParsedReference>, Error> {
        let query = self.parse_reference(input)?;
        let matches = resolver::resolve(&self.index, &self.normalizer, &query)?;
        if query.names_verses() {
            return Ok(query.expand().collect());
        }
        return Ok(matches
            .iter()
            .map(|m| {
                return ParsedReference {
                    book: query.book().to_string(),
                    chapter: m.verse.chapter,
                    is_range: false,
                    range_end: None,
                    verse: m.verse.verse,
                };
            })
            .collect());
    }

    /// Verses named by a reference, in order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReferenceFormat`, `Error::BookNotFound`,
    /// `Error::ChapterNotFound`, or `Error::VerseNotFound`.
    pub fn get_verse(&self, input: &str) -> Result<Vec<VerseMatch<'_>>, Error> {
        let query = self.parse_reference(input)?;
        let matches = resolver::resolve(&self.index, &self.normalizer, &query)?;
        tracing::debug!(input, verses = matches.len(), "verse lookup");
        return Ok(matches);
    }

    /// Every verse of a chapter, ordered by verse number. `book` may use any
    /// accepted spelling.
    ///
    /// # Errors
    ///
    /// Returns `Error::BookNotFound` or `Error::ChapterNotFound`.
    pub fn get_chapter(&self, book: &str, chapter: u32) -> Result<Vec<VerseMatch<'_>>, Error> {
        let query = ReferenceQuery::Chapter { book: self.normalizer.normalize(book), chapter };
        return resolver::resolve(&self.index, &self.normalizer, &query);
    }

    /// Verses whose text contains `query`, case-insensitively, in index order.
    /// A blank query matches nothing.
    pub fn search_verses(&self, query: &str) -> Vec<VerseMatch<'_>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let found: Vec<VerseMatch<'_>> = self
            .index
            .entries()
            .iter()
            .filter(|entry| return entry.verse.text.to_lowercase().contains(&needle))
            .map(|entry| {
                return VerseMatch {
                    highlighted: false,
                    reference: &entry.reference,
                    verse: &entry.verse,
                };
            })
            .collect();
        tracing::debug!(query, results = found.len(), "search");
        return found;
    }

    /// Verses sharing keywords with the verses a reference names. The source
    /// verses never appear in the result.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::get_verse`] for the source reference.
    pub fn find_related_verses(&self, input: &str) -> Result<Vec<RelatedVerse<'_>>, Error> {
        let sources: Vec<CanonicalReference> =
            self.get_verse(input)?.into_iter().map(|m| return m.reference.clone()).collect();
        return Ok(self.related_to(&sources));
    }

    /// Verses sharing keywords with a set of already-resolved references.
    pub fn related_to(&self, sources: &[CanonicalReference]) -> Vec<RelatedVerse<'_>> {
        return related::rank(&self.index, sources, &self.related);
    }

    /// Canonical book names in dataset order.
    pub fn books(&self) -> Vec<&str> {
        return self.index.books().iter().map(|b| return b.name.as_str()).collect();
    }

    /// Number of chapters the dataset has for a book (any accepted spelling).
    ///
    /// # Errors
    ///
    /// Returns `Error::BookNotFound` if the book isn't indexed.
    pub fn chapter_count(&self, book: &str) -> Result<usize, Error> {
        let canonical = self.normalizer.normalize(book);
        let entry = resolver::find_book(&self.index, &self.normalizer, &canonical)?;
        return Ok(entry.chapters.len());
    }

    /// The underlying index.
    pub const fn index(&self) -> &VerseIndex {
        return &self.index;
    }

    /// The normalizer in use.
    pub const fn normalizer(&self) -> &BookNormalizer {
        return &self.normalizer;
    }

    /// Records rejected during load or indexing.
    pub fn quarantined(&self) -> &[Quarantined] {
        return &self.quarantined;
    }

    /// Dataset file this service was built from.
    pub fn source(&self) -> &Path {
        return &self.source;
    }

    /// Translation name, if the dataset declared one.
    pub fn translation(&self) -> Option<&str> {
        return self.translation.as_deref();
    }
}

/// A load failure remembered by [`SharedBible`].
#[derive(Debug, Clone)]
struct LoadFailure {
    /// Dataset path.
    path: PathBuf,
    /// Failure description.
    reason: String,
}

/// Builds the service on first use.
type Loader = Box<dyn Fn() -> Result<BibleService, Error> + Send + Sync>;

/// Lazily loaded, shareable service handle. The first call runs the loader;
/// its outcome, success or failure, is cached for every later call.
pub struct SharedBible {
    /// Cached outcome of the one load attempt.
    cell: OnceCell<Result<Arc<BibleService>, LoadFailure>>,
    /// Dataset path, for failures that don't carry one.
    path: PathBuf,
    /// Loader run on first access.
    loader: Loader,
}

impl SharedBible {
    /// Handle that loads `path` with the given normalizer and settings on first use.
    pub fn from_path(path: PathBuf, normalizer: BookNormalizer, related: RelatedSettings) -> Self {
        let load_path = path.clone();
        let loader = move || return BibleService::open(&load_path, normalizer.clone(), related);
        return Self::with_loader(path, loader);
    }

    /// Handle around a custom loader.
    pub fn with_loader<F>(path: PathBuf, loader: F) -> Self
    where
        F: Fn() -> Result<BibleService, Error> + Send + Sync + 'static,
    {
        return Self { cell: OnceCell::new(), path, loader: Box::new(loader) };
    }

    /// Handle around a service that is already built.
    #[cfg(test)]
    pub fn ready(service: BibleService) -> Self {
        let path = service.source().to_path_buf();
        let cell = OnceCell::with_value(Ok(Arc::new(service)));
        return Self { cell, path, loader: Box::new(unreachable_load) };
    }

    /// The service, loading it on first call.
    ///
    /// # Errors
    ///
    /// Returns `Error::DatasetLoad` with the cached reason if the first load
    /// failed. The load is never retried.
    pub fn get(&self) -> Result<Arc<BibleService>, Error> {
        let outcome = self.cell.get_or_init(|| {
            return match (self.loader)() {
                Ok(service) => Ok(Arc::new(service)),
                Err(Error::DatasetLoad { path, reason }) => {
                    tracing::error!(path = %path.display(), %reason, "dataset load failed");
                    Err(LoadFailure { path, reason })
                },
                Err(other) => {
                    tracing::error!(error = %other, "dataset load failed");
                    Err(LoadFailure { path: self.path.clone(), reason: other.to_string() })
                },
            };
        });

        return match outcome {
            Ok(service) => Ok(Arc::clone(service)),
            Err(failure) => Err(Error::DatasetLoad {
                path: failure.path.clone(),
                reason: failure.reason.clone(),
            }),
        };
    }
}

/// Loader of a pre-built handle; the cell is already filled so it never runs.
///
/// # Errors
///
/// Always returns `Error::DatasetLoad`.
#[cfg(test)]
fn unreachable_load() -> Result<BibleService, Error> {
    return Err(Error::DatasetLoad {
        path: PathBuf::new(),
        reason: "service was provided pre-built".to_string(),
    });
}
