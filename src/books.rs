//! Book name normalization: every accepted spelling maps to one canonical name.
//!
//! Matching is case- and whitespace-insensitive. Ordinal prefixes ("1", "1st",
//! "First", "I", or glued as in "1john") fold to a leading numeral, so
//! "First John" and "1john" both become "1 John". The rest of the name goes
//! through an explicit variant table ("Psalm" -> "Psalms"); names the table
//! doesn't know are title-cased so lookups still fail predictably.

use std::collections::HashMap;

use crate::error::Error;

/// Canonical book names (without ordinal) and the spellings that map to them.
/// Variants are written as lookup keys: lowercase, no whitespace.
const BOOK_VARIANTS: &[(&str, &[&str])] = &[
    ("Genesis", &["gen", "gn"]),
    ("Exodus", &["exod", "exo", "ex"]),
    ("Leviticus", &["lev", "lv"]),
    ("Numbers", &["num", "nm"]),
    ("Deuteronomy", &["deut", "dt"]),
    ("Joshua", &["josh"]),
    ("Judges", &["judg", "jdg"]),
    ("Ruth", &["rth"]),
    ("Samuel", &["sam", "sm"]),
    ("Kings", &["kgs", "king"]),
    ("Chronicles", &["chron", "chr"]),
    ("Ezra", &["ezr"]),
    ("Nehemiah", &["neh"]),
    ("Esther", &["esth", "est"]),
    ("Job", &[]),
    ("Psalms", &["psalm", "ps", "psa", "pss"]),
    ("Proverbs", &["proverb", "prov", "prv"]),
    ("Ecclesiastes", &["eccl", "eccles", "qoheleth"]),
    ("Song of Solomon", &["songofsongs", "song", "canticles", "canticleofcanticles", "sos"]),
    ("Isaiah", &["isa"]),
    ("Jeremiah", &["jer"]),
    ("Lamentations", &["lam"]),
    ("Ezekiel", &["ezek", "eze"]),
    ("Daniel", &["dan", "dn"]),
    ("Hosea", &["hos"]),
    ("Joel", &[]),
    ("Amos", &[]),
    ("Obadiah", &["obad", "ob"]),
    ("Jonah", &["jon"]),
    ("Micah", &["mic"]),
    ("Nahum", &["nah"]),
    ("Habakkuk", &["hab"]),
    ("Zephaniah", &["zeph"]),
    ("Haggai", &["hag"]),
    ("Zechariah", &["zech"]),
    ("Malachi", &["mal"]),
    ("Matthew", &["matt", "mt"]),
    ("Mark", &["mk", "mrk"]),
    ("Luke", &["lk", "luk"]),
    ("John", &["jn", "jhn"]),
    ("Acts", &["act", "actsoftheapostles"]),
    ("Romans", &["rom", "rm"]),
    ("Corinthians", &["cor"]),
    ("Galatians", &["gal"]),
    ("Ephesians", &["eph"]),
    ("Philippians", &["phil", "php"]),
    ("Colossians", &["col"]),
    ("Thessalonians", &["thess", "thes"]),
    ("Timothy", &["tim"]),
    ("Titus", &["tit"]),
    ("Philemon", &["philem", "phlm"]),
    ("Hebrews", &["heb"]),
    ("James", &["jas", "jm"]),
    ("Peter", &["pet", "pt"]),
    ("Jude", &["jud"]),
    ("Revelation", &["revelations", "rev", "apocalypse", "revelationofjohn"]),
];

/// Words kept lowercase when title-casing an unknown name (unless first).
const MINOR_WORDS: &[&str] = &["and", "of", "the"];

/// Maps any accepted spelling of a book name to its canonical spelling.
/// Built once and shared; normalization never mutates it.
#[derive(Debug, Clone)]
pub struct BookNormalizer {
    /// Canonical names keyed by their own lookup key. Aliases may not shadow these.
    canonical: HashMap<String, String>,
    /// Lookup key (lowercase, no whitespace, no ordinal) -> canonical name.
    variants: HashMap<String, String>,
}

/// A raw name split into its ordinal and the words that follow.
struct SplitName {
    /// Ordinal prefix as a number, if any.
    ordinal: Option<u32>,
    /// Lowercase words of the name proper.
    words: Vec<String>,
}

impl Default for BookNormalizer {
    fn default() -> Self {
        return Self::new();
    }
}

impl BookNormalizer {
    /// Build the normalizer from the built-in variant table.
    pub fn new() -> Self {
        let mut canonical = HashMap::new();
        let mut variants = HashMap::new();
        for (name, spellings) in BOOK_VARIANTS {
            let key = lookup_key_for_words(&split_words(name));
            canonical.insert(key.clone(), (*name).to_string());
            variants.insert(key, (*name).to_string());
            for spelling in *spellings {
                variants.insert((*spelling).to_string(), (*name).to_string());
            }
        }
        return Self { canonical, variants };
    }

    /// Extend the built-in table with user aliases (`[aliases]` in `.verseref.toml`).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAlias` if a spelling or target carries an ordinal,
    /// if a spelling shadows a canonical book, or if the target itself
    /// normalizes to a different name (which would break idempotency).
    pub fn with_aliases<'a, I>(mut self, aliases: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut added: Vec<(String, String)> = Vec::new();
        for (spelling, book) in aliases {
            let (key, target) = self.validate_alias(spelling, book)?;
            self.variants.insert(key, target.clone());
            added.push((spelling.clone(), target));
        }

        // Targets must be fixed points once every alias is in place.
        for (spelling, target) in &added {
            let renormalized = self.normalize(target);
            if &renormalized != target {
                return Err(Error::InvalidAlias {
                    book: target.clone(),
                    reason: format!("target itself normalizes to `{renormalized}`"),
                    spelling: spelling.clone(),
                });
            }
        }
        return Ok(self);
    }

    /// Check one alias and return its lookup key and canonical target.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAlias` when the alias cannot be added safely.
    fn validate_alias(&self, spelling: &str, book: &str) -> Result<(String, String), Error> {
        let invalid = |reason: &str| {
            return Error::InvalidAlias {
                book: book.to_string(),
                reason: reason.to_string(),
                spelling: spelling.to_string(),
            };
        };

        let split = split_ordinal(split_words(spelling));
        if split.ordinal.is_some() {
            return Err(invalid("spelling must not carry an ordinal prefix"));
        }
        if split.words.is_empty() {
            return Err(invalid("spelling is empty"));
        }
        let key = lookup_key_for_words(&split.words);

        let target = self.normalize(book);
        if target.is_empty() || split_ordinal(split_words(&target)).ordinal.is_some() {
            return Err(invalid("target must name the book without its ordinal"));
        }
        if let Some(existing) = self.canonical.get(&key)
            && existing != &target
        {
            return Err(invalid(&format!("spelling shadows canonical book `{existing}`")));
        }
        return Ok((key, target));
    }

    /// Normalize a raw book name to its canonical spelling.
    ///
    /// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(&self, raw: &str) -> String {
        let split = split_ordinal(split_words(raw));
        if split.words.is_empty() {
            return String::new();
        }

        let key = lookup_key_for_words(&split.words);
        let name = match self.variants.get(&key) {
            Some(canonical) => canonical.clone(),
            None => title_case(&split.words),
        };

        return match split.ordinal {
            Some(n) => format!("{n} {name}"),
            None => name,
        };
    }

    /// Known books that resemble `book`, for "did you mean" diagnostics.
    pub fn suggest<'a>(&self, book: &str, known: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let wanted = lookup_key_for_words(&split_words(&self.normalize(book)));
        let Some(prefix) = wanted.get(..wanted.len().min(3)) else {
            return Vec::new();
        };

        return known
            .into_iter()
            .filter(|candidate| {
                let key = lookup_key_for_words(&split_words(candidate));
                return (!prefix.is_empty() && key.starts_with(prefix)) || edit_distance(&key, &wanted) <= 2;
            })
            .map(String::from)
            .collect();
    }
}

/// Lowercase alphanumeric words; every other character separates words.
fn split_words(raw: &str) -> Vec<String> {
    return raw
        .split(|c: char| return !c.is_alphanumeric())
        .filter(|w| return !w.is_empty())
        .map(str::to_lowercase)
        .collect();
}

/// Separate a leading ordinal from the rest of the name.
/// An ordinal only counts when more of the name follows it.
fn split_ordinal(mut words: Vec<String>) -> SplitName {
    let Some(first) = words.first() else {
        return SplitName { ordinal: None, words };
    };

    if words.len() > 1
        && let Some(n) = ordinal_value(first)
    {
        words.remove(0);
        return SplitName { ordinal: Some(n), words };
    }

    // Glued form: "1john" -> 1, "john".
    let digits: String = first.chars().take_while(char::is_ascii_digit).collect();
    let rest: String = first.chars().skip_while(char::is_ascii_digit).collect();
    if !digits.is_empty()
        && rest.chars().next().is_some_and(char::is_alphabetic)
        && let Some(n) = ordinal_value(&digits)
    {
        if let Some(slot) = words.first_mut() {
            *slot = rest;
        }
        return SplitName { ordinal: Some(n), words };
    }

    return SplitName { ordinal: None, words };
}

/// Numeric value of an ordinal word, numeral, or roman numeral (1 through 3).
fn ordinal_value(word: &str) -> Option<u32> {
    return match word {
        "first" | "1st" | "i" => Some(1),
        "second" | "2nd" | "ii" => Some(2),
        "third" | "3rd" | "iii" => Some(3),
        digits if digits.chars().all(|c| return c.is_ascii_digit()) => {
            digits.parse::<u32>().ok().filter(|n| return *n > 0)
        },
        _ => None,
    };
}

/// Join words into the variant-table key.
fn lookup_key_for_words(words: &[String]) -> String {
    return words.concat();
}

/// Capitalize each word, keeping minor words lowercase after the first.
fn title_case(words: &[String]) -> String {
    return words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && MINOR_WORDS.contains(&word.as_str()) {
                return word.clone();
            }
            let mut chars = word.chars();
            return match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
        })
        .collect::<Vec<_>>()
        .join(" ");
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i.saturating_add(1)];
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = previous.get(j).copied().unwrap_or(usize::MAX).saturating_add(usize::from(ca != *cb));
            let insertion = current.get(j).copied().unwrap_or(usize::MAX).saturating_add(1);
            let deletion = previous.get(j.saturating_add(1)).copied().unwrap_or(usize::MAX).saturating_add(1);
            current.push(substitution.min(insertion).min(deletion));
        }
        previous = current;
    }

    return previous.last().copied().unwrap_or(0);
}
