//! Related verses by keyword overlap.

use std::collections::HashSet;

use serde::Deserialize;

use crate::index::VerseIndex;
use crate::types::{CanonicalReference, RelatedVerse};

/// Ranking knobs, read from the `[related]` table of `.verseref.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelatedSettings {
    /// Maximum number of results.
    pub limit: usize,
    /// Shortest word (in characters) that counts as a keyword.
    pub min_keyword_length: usize,
    /// Fewest shared keywords a candidate needs to be listed.
    pub min_shared_keywords: usize,
}

impl Default for RelatedSettings {
    fn default() -> Self {
        return Self { limit: 5, min_keyword_length: 5, min_shared_keywords: 2 };
    }
}

/// Distinct keywords of a text in first-appearance order: lowercased,
/// punctuation stripped, at least `min_length` characters.
pub fn keywords(text: &str, min_length: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    return words(text)
        .filter(|w| return w.chars().count() >= min_length)
        .filter(|w| return seen.insert(w.clone()))
        .collect();
}

/// Lowercase words with punctuation removed.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    return text
        .split_whitespace()
        .map(|w| return w.chars().filter(|c| return c.is_alphanumeric()).collect::<String>().to_lowercase())
        .filter(|w| return !w.is_empty());
}

/// Rank every indexed verse by the number of keywords it shares with the
/// source verses. Sources never appear in the result. Ties keep index order.
pub fn rank<'a>(
    index: &'a VerseIndex,
    sources: &[CanonicalReference],
    settings: &RelatedSettings,
) -> Vec<RelatedVerse<'a>> {
    let mut source_keywords: Vec<String> = Vec::new();
    for reference in sources {
        if let Some(source) = index.get(reference) {
            for keyword in keywords(&source.verse.text, settings.min_keyword_length) {
                if !source_keywords.contains(&keyword) {
                    source_keywords.push(keyword);
                }
            }
        }
    }
    tracing::debug!(sources = sources.len(), keywords = source_keywords.len(), "ranking related verses");
    if source_keywords.is_empty() || settings.limit == 0 {
        return Vec::new();
    }

    let excluded: HashSet<&CanonicalReference> = sources.iter().collect();
    let mut ranked: Vec<RelatedVerse<'a>> = index
        .entries()
        .iter()
        .filter(|candidate| return !excluded.contains(&candidate.reference))
        .filter_map(|candidate| {
            let candidate_words: HashSet<String> = words(&candidate.verse.text).collect();
            let relevance = source_keywords.iter().filter(|k| return candidate_words.contains(*k)).count();
            if relevance < settings.min_shared_keywords.max(1) {
                return None;
            }
            return Some(RelatedVerse {
                reference: &candidate.reference,
                relevance,
                verse: &candidate.verse,
            });
        })
        .collect();

    ranked.sort_by(|a, b| return b.relevance.cmp(&a.relevance));
    ranked.truncate(settings.limit);
    return ranked;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use super::*;
    use crate::books::BookNormalizer;
    use crate::dataset::Record;
    use crate::types::Verse;

    fn index(texts: &[&str]) -> VerseIndex {
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Record {
                position: i,
                verse: Verse {
                    book_name: "Proverbs".to_string(),
                    chapter: 1,
                    text: (*text).to_string(),
                    verse: u32::try_from(i + 1).unwrap(),
                },
            })
            .collect();
        return VerseIndex::build(records, &BookNormalizer::new()).0;
    }

    fn reference(verse: u32) -> CanonicalReference {
        return CanonicalReference::new("Proverbs", 1, verse);
    }

    #[test]
    fn keywords_are_distinct_lowercase_and_long() {
        let words = keywords("Wisdom crieth; WISDOM uttereth her voice in the streets!", 5);
        assert_eq!(words, vec!["wisdom", "crieth", "uttereth", "voice", "streets"]);
    }

    #[test]
    fn ranks_by_shared_keywords_and_excludes_source() {
        let index = index(&[
            "wisdom crieth without; she uttereth her voice",
            "wisdom crieth aloud",
            "wisdom crieth, uttereth her voice",
            "wisdom alone",
            "nothing shared here",
        ]);
        let related = rank(&index, &[reference(1)], &RelatedSettings::default());
        let refs: Vec<String> = related.iter().map(|r| r.reference.to_string()).collect();
        assert_eq!(refs, vec!["Proverbs 1:3", "Proverbs 1:2"]);
        assert_eq!(related[0].relevance, 4);
        assert_eq!(related[1].relevance, 2);
    }

    #[test]
    fn ties_keep_index_order_and_limit_applies() {
        let texts = ["alpha bravo charlie", "alpha bravo", "bravo alpha", "alpha bravo!", "ALPHA, BRAVO"];
        let index = index(&texts);
        let settings = RelatedSettings { limit: 2, ..RelatedSettings::default() };
        let related = rank(&index, &[reference(1)], &settings);
        let refs: Vec<String> = related.iter().map(|r| r.reference.to_string()).collect();
        assert_eq!(refs, vec!["Proverbs 1:2", "Proverbs 1:3"]);
    }

    #[test]
    fn multiple_sources_are_all_excluded() {
        let index = index(&["grace peace mercy", "grace peace", "peace mercy grace"]);
        let related = rank(&index, &[reference(1), reference(3)], &RelatedSettings::default());
        let refs: Vec<String> = related.iter().map(|r| r.reference.to_string()).collect();
        assert_eq!(refs, vec!["Proverbs 1:2"]);
    }

    #[test]
    fn short_words_never_match() {
        let index = index(&["the and for was", "the and for was"]);
        assert!(rank(&index, &[reference(1)], &RelatedSettings::default()).is_empty());
    }
}
