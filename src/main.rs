//! Genomic score lookup and multi-stage variant annotation main executable

pub mod annotate;
pub mod common;
pub mod err;
pub mod scores;

use std::process::{ExitCode, Termination};

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Genomic score lookup and variant annotation",
    long_about = "This tool annotates tab-separated variant files with scores from bgzip/tabix indexed score files"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an annotation pipeline over a variant file.
    Annotate(annotate::cli::Args),
    /// Score file related commands.
    Scores(Scores),
}

/// Parsing of "scores *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Scores {
    /// The sub command to run
    #[command(subcommand)]
    command: ScoresCommands,
}

/// Enum supporting the parsing of "scores *" sub commands.
#[derive(Debug, Subcommand)]
enum ScoresCommands {
    Fetch(scores::fetch::Args),
    Index(scores::index::Args),
}

fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Annotate(args) => annotate::cli::run(&cli.common, args)?,
            Commands::Scores(scores) => match &scores.command {
                ScoresCommands::Fetch(args) => scores::fetch::run(&cli.common, args)?,
                ScoresCommands::Index(args) => scores::index::run(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let term = Term::stderr();

    match run(&cli) {
        Ok(()) => {
            let _ = term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let err = err::AppError::from(err);
            let _ = term.write_line(&format!("Error: {}", &err));
            err.report()
        }
    }
}
