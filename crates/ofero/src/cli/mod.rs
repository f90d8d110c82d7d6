//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ofero",
    version,
    about = "Locate criterion answers in tender proposal PDFs, with cached vision OCR for scanned pages"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn print_help() {
        let mut cmd = Self::command();
        let _ = cmd.print_help();
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Locate the answer paragraph for one evaluation question.
    Extract(ExtractArgs),
    /// Report per-page text statistics and native/scanned classification.
    Pages(PagesArgs),
    /// Dump hybrid text (native or OCR) for a page range.
    Text(TextArgs),
    /// Inspect or reset the OCR transcription cache.
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Proposal PDF to search.
    #[arg(value_name = "PDF")]
    pub input: PathBuf,

    /// Header label configured for the question, e.g. "Criterion".
    #[arg(long)]
    pub label: String,

    /// Question number matched together with the label.
    #[arg(long, default_value = "")]
    pub number: String,

    /// Match "<label> <number>" and "<number>. <label>" instead of the
    /// bare label.
    #[arg(long)]
    pub auto_increment: bool,

    /// First page to scan (1-based; defaults to the first page).
    #[arg(long)]
    pub from_page: Option<usize>,

    /// Last page to scan (1-based, inclusive; defaults to the last page).
    #[arg(long)]
    pub to_page: Option<usize>,

    /// Emit the result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct PagesArgs {
    /// PDF to inspect.
    #[arg(value_name = "PDF")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct TextArgs {
    /// PDF to extract from.
    #[arg(value_name = "PDF")]
    pub input: PathBuf,

    /// First page (1-based; defaults to the first page).
    #[arg(long)]
    pub from_page: Option<usize>,

    /// Last page (1-based, inclusive; defaults to the last page).
    #[arg(long)]
    pub to_page: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Print the number of cached transcriptions.
    Stats,
    /// Delete every cached transcription.
    Clear(ClearArgs),
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Confirm the wipe; without this flag nothing is deleted.
    #[arg(long)]
    pub yes: bool,
}
