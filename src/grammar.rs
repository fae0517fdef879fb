/// Reference grammar: named pattern/handler rules tried most specific first.
use regex::{Captures, Regex};

use crate::books::BookNormalizer;
use crate::error::Error;
use crate::types::ReferenceQuery;

/// Book portion shared by every rule: optional leading numeral, then a name
/// made of letters, spaces, periods, and apostrophes.
const BOOK: &str = r"(?P<book>(?:\d+\s*)?\p{L}[\p{L} .']*?)";

/// Converts the captures of a matched rule into a query.
type RuleHandler = fn(&Captures<'_>, &str, &BookNormalizer) -> Result<ReferenceQuery, Error>;

/// One grammar rule. The first rule whose pattern matches wins.
struct Rule {
    /// Handler that builds the query from the captures.
    handler: RuleHandler,
    /// Stable rule name, used in logs and tests.
    name: &'static str,
    /// Anchored pattern over the whole (annotation-stripped) input.
    pattern: Regex,
}

/// Parses free-text scripture references into queries.
///
/// A hyphen-minus with whitespace on both sides (`" - "`) starts an annotation,
/// and everything from it on is ignored. A hyphen or en dash between two
/// numbers without surrounding whitespace is a verse range.
pub struct ReferenceGrammar {
    /// Finds the start of a trailing annotation.
    annotation: Regex,
    /// Rules in precedence order.
    rules: Vec<Rule>,
}

impl Default for ReferenceGrammar {
    fn default() -> Self {
        return Self::new();
    }
}

impl ReferenceGrammar {
    /// Compile the built-in rules.
    ///
    /// # Panics
    ///
    /// Panics if a hardcoded rule pattern is invalid (compile-time invariant).
    #[allow(clippy::expect_used, reason = "hardcoded patterns")]
    pub fn new() -> Self {
        let rule = |name: &'static str, tail: &str, handler: RuleHandler| {
            let pattern = Regex::new(&format!(r"^{BOOK}{tail}$")).expect("valid rule pattern");
            return Rule { handler, name, pattern };
        };

        let rules = vec![
            rule(
                "verse-range",
                r"\s*(?P<chapter>\d+)\s*[:.]\s*(?P<start>\d+)\s*[-–]\s*(?P<end>\d+)",
                build_verse_range,
            ),
            rule("verse", r"\s*(?P<chapter>\d+)\s*[:.]\s*(?P<verse>\d+)", build_verse),
            rule("chapter", r"\s*(?P<chapter>\d+)", build_chapter),
            rule("book", "", build_book),
        ];

        return Self {
            annotation: Regex::new(r"\s-\s").expect("valid annotation pattern"),
            rules,
        };
    }

    /// Name of the rule that would handle `input`, if any.
    pub fn matching_rule(&self, input: &str) -> Option<&'static str> {
        let cleaned = self.clean(input);
        return self
            .rules
            .iter()
            .find(|r| return r.pattern.is_match(&cleaned))
            .map(|r| return r.name);
    }

    /// Parse a reference. The book in the result is canonical.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReferenceFormat` if no rule matches, a number is
    /// zero or out of range, or a range ends before it starts.
    pub fn parse(&self, input: &str, normalizer: &BookNormalizer) -> Result<ReferenceQuery, Error> {
        let cleaned = self.clean(input);
        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(&cleaned) else {
                continue;
            };
            tracing::debug!(input, rule = rule.name, "reference rule matched");
            return (rule.handler)(&caps, input, normalizer);
        }

        return Err(Error::InvalidReferenceFormat {
            input: input.to_string(),
            reason: "expected `Book`, `Book C`, `Book C:V`, or `Book C:V-E`".to_string(),
        });
    }

    /// Drop any trailing annotation and collapse whitespace.
    fn clean(&self, input: &str) -> String {
        let without_annotation = match self.annotation.find(input) {
            Some(m) => input.get(..m.start()).unwrap_or(input),
            None => input,
        };
        return without_annotation.split_whitespace().collect::<Vec<_>>().join(" ");
    }
}

/// Canonical book from the `book` capture.
fn capture_book(caps: &Captures<'_>, normalizer: &BookNormalizer) -> String {
    let raw = caps.name("book").map_or("", |m| return m.as_str());
    return normalizer.normalize(raw);
}

/// Parse a positive number from a named capture.
///
/// # Errors
///
/// Returns `Error::InvalidReferenceFormat` if the capture is missing, zero, or overflows.
fn capture_number(caps: &Captures<'_>, group: &str, input: &str) -> Result<u32, Error> {
    let invalid = |reason: String| {
        return Error::InvalidReferenceFormat { input: input.to_string(), reason };
    };
    let text = caps
        .name(group)
        .map(|m| return m.as_str())
        .ok_or_else(|| return invalid(format!("missing {group}")))?;
    let value: u32 = text.parse().map_err(|_err| return invalid(format!("{group} `{text}` is out of range")))?;
    if value == 0 {
        return Err(invalid(format!("{group} numbers start at 1")));
    }
    return Ok(value);
}

/// Handler for `Book C:V-E`.
///
/// # Errors
///
/// Returns `Error::InvalidReferenceFormat` for bad numbers or a reversed range.
fn build_verse_range(caps: &Captures<'_>, input: &str, normalizer: &BookNormalizer) -> Result<ReferenceQuery, Error> {
    let chapter = capture_number(caps, "chapter", input)?;
    let start = capture_number(caps, "start", input)?;
    let end = capture_number(caps, "end", input)?;
    if end < start {
        return Err(Error::InvalidReferenceFormat {
            input: input.to_string(),
            reason: format!("range ends at {end} before it starts at {start}"),
        });
    }
    return Ok(ReferenceQuery::VerseRange {
        book: capture_book(caps, normalizer),
        chapter,
        end,
        start,
    });
}

/// Handler for `Book C:V`.
///
/// # Errors
///
/// Returns `Error::InvalidReferenceFormat` for bad numbers.
fn build_verse(caps: &Captures<'_>, input: &str, normalizer: &BookNormalizer) -> Result<ReferenceQuery, Error> {
    return Ok(ReferenceQuery::Verse {
        book: capture_book(caps, normalizer),
        chapter: capture_number(caps, "chapter", input)?,
        verse: capture_number(caps, "verse", input)?,
    });
}

/// Handler for `Book C`.
///
/// # Errors
///
/// Returns `Error::InvalidReferenceFormat` for a bad chapter number.
fn build_chapter(caps: &Captures<'_>, input: &str, normalizer: &BookNormalizer) -> Result<ReferenceQuery, Error> {
    return Ok(ReferenceQuery::Chapter {
        book: capture_book(caps, normalizer),
        chapter: capture_number(caps, "chapter", input)?,
    });
}

/// Handler for a bare book name.
///
/// # Errors
///
/// Never fails; the signature matches the other handlers.
fn build_book(caps: &Captures<'_>, _input: &str, normalizer: &BookNormalizer) -> Result<ReferenceQuery, Error> {
    return Ok(ReferenceQuery::Book { book: capture_book(caps, normalizer) });
}
