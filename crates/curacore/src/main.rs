//! CuraCore - safety-gated clinical triage assistant
//!
//! Main entry point for the CuraCore CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod services;

use commands::{ask, chat, config, ingest, search, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// CuraCore - safety-gated clinical triage assistant
#[derive(Parser)]
#[command(name = "curacore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (logs and command results)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file applied on top of the discovered ones
    #[arg(long, global = true, env = "CURACORE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve(serve::ServeArgs),

    /// Add reference documents to the corpus
    Ingest(ingest::IngestArgs),

    /// Show the corpus chunks closest to a query
    Search(search::SearchArgs),

    /// Answer a question from the reference corpus
    Ask(ask::AskArgs),

    /// Run a triage conversation in the terminal
    Chat(chat::ChatArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = curacore_config::load_config_with_options(None, None, cli.config.as_deref())
        .context("Failed to load configuration")?;

    let _log_guard = logging::init(cli.verbose, cli.json, &loaded.config.logging())?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Ingest(args) => ingest::run(args, &ctx).await,
        Commands::Search(args) => search::run(args, &ctx).await,
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
