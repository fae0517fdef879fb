mod alias;
mod books;
mod commands;
mod commentary;
mod config;
mod dataset;
mod diagnostics;
mod error;
mod grammar;
mod index;
mod info;
mod navigation;
mod related;
mod resolver;
mod sequencer;
mod server;
mod service;
mod types;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{Context, OutputFormat};
use crate::commentary::CommentaryKind;
use crate::navigation::{Direction, DisplayChapter};

#[derive(Parser)]
#[command(name = "verseref", version, about = "Scripture references, verse lookup, and commentary")]
struct Cli {
    /// Dataset file, overriding `dataset` in .verseref.toml
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    /// Output format for query commands
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the verses a reference names (e.g. `verse John 3:16`)
    Verse {
        /// Reference; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        reference: Vec<String>,
    },
    /// Show the grammar rule and verses a reference parses to
    Parse {
        /// Reference; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        reference: Vec<String>,
    },
    /// Print a chapter
    Chapter {
        /// Book in any accepted spelling (quote names with spaces)
        book: String,
        /// Chapter number
        chapter: u32,
        /// Verses to mark, comma-separated
        #[arg(long, value_delimiter = ',')]
        highlight: Vec<u32>,
        /// Verses to select, comma-separated; their related verses are listed
        #[arg(long, value_delimiter = ',')]
        select: Vec<u32>,
        /// Show the following chapter instead
        #[arg(long, conflicts_with = "prev")]
        next: bool,
        /// Show the preceding chapter instead
        #[arg(long)]
        prev: bool,
    },
    /// Case-insensitive search of verse text
    Search {
        /// Text to find; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Verses sharing keywords with the given references
    Related {
        /// One or more references, each quoted
        #[arg(required = true, num_args = 1..)]
        references: Vec<String>,
    },
    /// List books with their chapter counts
    Books,
    /// Load the dataset and report quarantined records (exit 1 if any)
    Check,
    /// Ask for commentary on a passage, or a free-form question
    Ask {
        /// Kind of commentary
        #[arg(value_enum)]
        kind: CommentaryKind,
        /// References of the passage, each quoted
        verses: Vec<String>,
        /// Question (required for `question`) or a note on the passage
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (default: PORT, then [server] port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Manage custom book spellings in .verseref.toml
    Alias {
        #[command(subcommand)]
        command: AliasCommand,
    },
    /// Show syntax, commands, configuration, and current state
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AliasCommand {
    /// List configured aliases
    List,
    /// Map a spelling onto a canonical book
    Add {
        /// Spelling, without any ordinal
        spelling: String,
        /// Book it means
        book: String,
    },
    /// Remove an alias
    Remove {
        /// Spelling to remove
        spelling: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));

    let root = PathBuf::from(".");
    return match run(&root, cli) {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(e.exit_code())
        },
    };
}

/// Log to stderr, filtered by `RUST_LOG`. The server logs requests by default;
/// other commands only warn.
fn init_tracing(serving: bool) {
    let fallback = if serving { "verseref=info,tower_http=info" } else { "verseref=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Dispatch a parsed command.
///
/// # Errors
///
/// Returns whatever the command returns; `main` renders it.
fn run(root: &Path, cli: Cli) -> Result<ExitCode, error::Error> {
    let Cli { dataset, format, command } = cli;

    match command {
        Commands::Alias { command } => match command {
            AliasCommand::Add { spelling, book } => alias::cmd_add(root, &spelling, &book)?,
            AliasCommand::List => alias::cmd_list(root)?,
            AliasCommand::Remove { spelling } => alias::cmd_remove(root, &spelling)?,
        },
        Commands::Info { json } => commands::info(root, dataset.as_deref(), json),
        Commands::Ask { kind, verses, prompt } => {
            let ctx = Context::load(root, dataset, format)?;
            commands::ask(&ctx, kind, &verses, prompt.as_deref())?;
        },
        Commands::Books => commands::books(&Context::load(root, dataset, format)?)?,
        Commands::Chapter { book, chapter, highlight, select, next, prev } => {
            let step = if next {
                Some(Direction::Next)
            } else if prev {
                Some(Direction::Previous)
            } else {
                None
            };
            let request = DisplayChapter { book, chapter, highlight_verses: highlight };
            commands::chapter(&Context::load(root, dataset, format)?, &request, &select, step)?;
        },
        Commands::Check => return commands::check(&Context::load(root, dataset, format)?),
        Commands::Parse { reference } => commands::parse(&Context::load(root, dataset, format)?, &reference.join(" "))?,
        Commands::Related { references } => commands::related(&Context::load(root, dataset, format)?, &references)?,
        Commands::Search { query } => commands::search(&Context::load(root, dataset, format)?, &query.join(" "))?,
        Commands::Serve { port } => commands::serve(&Context::load(root, dataset, format)?, port)?,
        Commands::Verse { reference } => commands::verse(&Context::load(root, dataset, format)?, &reference.join(" "))?,
    }
    return Ok(ExitCode::SUCCESS);
}
