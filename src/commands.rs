//! Core CLI commands for verseref: verse, parse, chapter, search, related,
//! books, check, ask, serve, info.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use serde::Serialize;

use crate::commentary::{self, CommentaryKind, CommentaryRequest, Commentator, OpenAiClient};
use crate::config;
use crate::error;
use crate::navigation::{self, ChapterView, Direction, DisplayChapter, Reader};
use crate::server::{self, AppState};
use crate::service::{BibleService, SharedBible};
use crate::types::{CanonicalReference, VerseMatch};

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// One line per verse.
    #[default]
    Text,
}

/// Config for the working directory with the global CLI overrides applied.
#[derive(Debug)]
pub struct Context {
    /// Loaded configuration; `dataset` already overridden.
    config: config::Config,
    /// Output format for query commands.
    format: OutputFormat,
}

impl Context {
    /// Load `.verseref.toml` from `root` and apply `--dataset`.
    ///
    /// # Errors
    ///
    /// Returns errors from config loading.
    pub fn load(root: &Path, dataset: Option<PathBuf>, format: OutputFormat) -> Result<Self, error::Error> {
        let mut config = config::Config::load(root)?;
        if let Some(path) = dataset {
            config.dataset = path;
        }
        return Ok(Self { config, format });
    }

    /// Load the dataset and build the service.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAlias` or `Error::DatasetLoad`.
    fn open(&self) -> Result<BibleService, error::Error> {
        let normalizer = self.config.normalizer()?;
        return BibleService::open(&self.config.dataset, normalizer, self.config.related);
    }

    /// Write a value as pretty JSON on stdout.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails.
    fn print_json<T: Serialize>(value: &T) -> Result<(), error::Error> {
        println!("{}", serde_json::to_string_pretty(value)?);
        return Ok(());
    }
}

/// Ask the commentary backend about a passage or a question.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` for a request missing verses or a question,
/// `Error::MissingApiKey`, `Error::Backend`, or lookup errors.
pub fn ask(ctx: &Context, kind: CommentaryKind, verses: &[String], prompt: Option<&str>) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let request = CommentaryRequest { kind, note: prompt.map(String::from), verses: verses.to_vec() };
    let text = commentary::build_prompt(&service, &request)?;

    let client = OpenAiClient::new(&ctx.config.commentary)?;
    let commentator = Commentator::new(Arc::new(client));
    let reply = runtime()?.block_on(commentator.respond(&text, None, None))?;

    match ctx.format {
        OutputFormat::Json => Context::print_json(&reply)?,
        OutputFormat::Text => println!("{}", reply.html),
    }
    return Ok(());
}

/// List books in dataset order with their chapter counts.
///
/// # Errors
///
/// Returns errors from dataset loading.
pub fn books(ctx: &Context) -> Result<(), error::Error> {
    let service = ctx.open()?;

    if ctx.format == OutputFormat::Json {
        let books: Vec<serde_json::Value> = service
            .index()
            .books()
            .iter()
            .map(|b| return serde_json::json!({ "name": b.name, "chapters": b.chapters }))
            .collect();
        return Context::print_json(&serde_json::json!({ "books": books, "translation": service.translation() }));
    }

    for name in service.books() {
        let count = service.chapter_count(name)?;
        let noun = if count == 1 { "chapter" } else { "chapters" };
        println!("{name:<20} {count} {noun}");
    }
    return Ok(());
}

/// Show a chapter, optionally stepping to its neighbour first. Verses in
/// `select` are toggled into the reader's selection and their related
/// verses are listed after the chapter.
///
/// # Errors
///
/// Returns `Error::BookNotFound`, `Error::ChapterNotFound`, `Error::VerseNotFound`
/// for a selected verse outside the chapter, or dataset loading errors.
pub fn chapter(ctx: &Context, request: &DisplayChapter, select: &[u32], step: Option<Direction>) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let mut reader = Reader::open(&service)?;
    let mut view = reader.display(&service, request)?;

    if let Some(direction) = step {
        match reader.navigate(&service, direction)? {
            Some(moved) => view = moved,
            None => {
                let end = if direction == Direction::Next { "last" } else { "first" };
                eprintln!("{} is the {end} chapter in the dataset.", view.location);
            },
        }
    }

    for &number in select {
        if !view.verses.iter().any(|v| return v.verse.verse == number) {
            let location = reader.location();
            let reference = CanonicalReference::new(&location.book, location.chapter, number);
            return Err(error::Error::VerseNotFound { reference: reference.to_string() });
        }
        reader.toggle_verse(number);
    }

    let mut related = Vec::new();
    if !reader.selection().is_empty() {
        let highlighted = view.verses.iter().filter(|v| return v.highlighted).map(|v| return v.verse.verse).collect();
        let location = reader.location();
        let marked = DisplayChapter { book: location.book.clone(), chapter: location.chapter, highlight_verses: highlighted };
        view = navigation::chapter_view(&service, &marked, reader.selection())?;
        related = reader.selection().related(&service);
    }

    if ctx.format == OutputFormat::Json {
        let selected: Vec<String> = reader.selection().iter().map(ToString::to_string).collect();
        return Context::print_json(&serde_json::json!({ "chapter": view, "related": related, "selected": selected }));
    }

    print!("{}", chapter_text(&view, service.translation()));
    if !related.is_empty() {
        println!("\n## Related\n");
        for r in &related {
            println!("{}  [{}]  {}", r.reference, r.relevance, r.verse.text);
        }
    }
    return Ok(());
}

/// Plain-text rendering of a chapter view. Selected verses are marked `*`,
/// highlighted ones `>`.
fn chapter_text(view: &ChapterView<'_>, translation: Option<&str>) -> String {
    let mut out = match translation {
        Some(t) => format!("# {} ({t})\n\n", view.location),
        None => format!("# {}\n\n", view.location),
    };
    for v in &view.verses {
        let marker = match (v.highlighted, v.selected) {
            (_, true) => '*',
            (true, false) => '>',
            (false, false) => ' ',
        };
        let _ = writeln!(out, "{marker} {:>3}  {}", v.verse.verse, v.verse.text);
    }

    let previous = view.previous.as_ref().map_or_else(|| return "-".to_string(), ToString::to_string);
    let next = view.next.as_ref().map_or_else(|| return "-".to_string(), ToString::to_string);
    let _ = writeln!(out, "\nprevious: {previous}  next: {next}");
    return out;
}

/// Report records set aside while loading the dataset. Exits 1 if any were.
///
/// # Errors
///
/// Returns `Error::DatasetLoad` if the dataset can't be loaded at all.
pub fn check(ctx: &Context) -> Result<ExitCode, error::Error> {
    let service = ctx.open()?;
    let quarantined = service.quarantined();
    let total = service.index().len();

    if ctx.format == OutputFormat::Json {
        Context::print_json(&serde_json::json!({
            "dataset": service.source().display().to_string(),
            "quarantined": quarantined,
            "verses": total,
        }))?;
    } else {
        for q in quarantined {
            println!("QUARANTINED  record {}  ({})", q.position, q.reason);
        }
        if !quarantined.is_empty() {
            println!();
        }
        println!("{total} verses indexed, {} quarantined", quarantined.len());
    }

    if quarantined.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    eprintln!("hint: fix or remove the listed records in {}", service.source().display());
    return Ok(ExitCode::from(1));
}

/// Output a comprehensive reference document for verseref.
pub fn info(root: &Path, dataset: Option<&Path>, json: bool) {
    return crate::info::run(root, dataset, json);
}

/// Show how a reference parses: the grammar rule that accepts it and the
/// verses it expands to.
///
/// # Errors
///
/// Returns `Error::InvalidReferenceFormat`, or lookup errors for chapter and
/// book references.
pub fn parse(ctx: &Context, reference: &str) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let parsed = service.parse_verses(reference)?;
    let rule = service.reference_rule(reference);

    if ctx.format == OutputFormat::Json {
        return Context::print_json(&serde_json::json!({ "reference": reference, "rule": rule, "parsed": parsed }));
    }

    println!("rule: {}", rule.unwrap_or("-"));
    for p in &parsed {
        match p.range_end {
            Some(end) if p.is_range => println!("{}  (range to {end})", p.canonical()),
            _ => println!("{}", p.canonical()),
        }
    }
    return Ok(());
}

/// Print verse matches in the chosen format.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
fn print_matches(ctx: &Context, label: (&str, &str), matches: &[VerseMatch<'_>]) -> Result<(), error::Error> {
    if ctx.format == OutputFormat::Json {
        let (key, value) = label;
        let mut body = serde_json::Map::new();
        body.insert(key.to_string(), serde_json::Value::from(value));
        body.insert("verses".to_string(), serde_json::to_value(matches)?);
        return Context::print_json(&body);
    }

    for m in matches {
        println!("{}  {}", m.reference, m.verse.text);
    }
    return Ok(());
}

/// Verses related to one or more references. The verses every reference
/// names are pooled into one source set, ranked together, and excluded.
///
/// # Errors
///
/// Returns parse and lookup errors for any of the references.
pub fn related(ctx: &Context, references: &[String]) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let mut sources: Vec<CanonicalReference> = Vec::new();
    for input in references {
        for found in service.get_verse(input)? {
            if !sources.contains(found.reference) {
                sources.push(found.reference.clone());
            }
        }
    }

    let related = service.related_to(&sources);
    if ctx.format == OutputFormat::Json {
        let names: Vec<String> = sources.iter().map(ToString::to_string).collect();
        return Context::print_json(&serde_json::json!({ "references": names, "related": related }));
    }

    if related.is_empty() {
        eprintln!("No verses related to the {} given.", sources.len());
    }
    for r in &related {
        println!("{}  [{}]  {}", r.reference, r.relevance, r.verse.text);
    }
    return Ok(());
}

/// Runtime for the async commands.
///
/// # Errors
///
/// Returns `Error::Io` if the runtime can't start.
fn runtime() -> Result<tokio::runtime::Runtime, error::Error> {
    return Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?);
}

/// Case-insensitive text search.
///
/// # Errors
///
/// Returns errors from dataset loading.
pub fn search(ctx: &Context, query: &str) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let matches = service.search_verses(query);
    print_matches(ctx, ("query", query), &matches)?;
    if ctx.format == OutputFormat::Text {
        eprintln!("{} verses match", matches.len());
    }
    return Ok(());
}

/// Run the HTTP API until the process is stopped. The dataset is loaded
/// before listening; a load failure is logged and answered with 503s.
///
/// # Errors
///
/// Returns `Error::InvalidAlias`, or `Error::Io` if the port can't be bound.
pub fn serve(ctx: &Context, port: Option<u16>) -> Result<(), error::Error> {
    let normalizer = ctx.config.normalizer()?;
    let bible = Arc::new(SharedBible::from_path(ctx.config.dataset.clone(), normalizer, ctx.config.related));
    match bible.get() {
        Ok(service) => tracing::info!(verses = service.index().len(), "dataset loaded"),
        Err(e) => tracing::error!(error = %e, "dataset failed to load; verse endpoints will answer 503"),
    }

    let client = commentary::client_for(&ctx.config.commentary)?;
    let state = AppState { bible, commentator: Arc::new(Commentator::new(client)) };
    let port = port.unwrap_or_else(|| return ctx.config.port());

    eprintln!("Listening on http://0.0.0.0:{port}");
    return runtime()?.block_on(server::serve(state, port));
}

/// Verses a reference names.
///
/// # Errors
///
/// Returns parse and lookup errors.
pub fn verse(ctx: &Context, reference: &str) -> Result<(), error::Error> {
    let service = ctx.open()?;
    let matches = service.get_verse(reference)?;
    return print_matches(ctx, ("reference", reference), &matches);
}
