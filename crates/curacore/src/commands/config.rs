//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use curacore_config::CuracoreConfig;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./curacore.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = ctx.config();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("# CuraCore Configuration\n");

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let llm = config.llm();
    let key = if llm.resolve_api_key().is_some() {
        "(key set)"
    } else {
        "(no key)"
    };
    println!("LLM:");
    println!("  {} / {}  {}", llm.backend.display_name(), llm.model, key);
    if let Some(ref url) = llm.base_url {
        println!("  base_url: {}", url);
    }
    println!();

    let embedding = config.embedding();
    println!("Embedding:");
    println!(
        "  {:?} ({} dims)",
        embedding.provider,
        embedding.effective_dimensions()
    );
    println!();

    let corpus = config.corpus();
    println!("Corpus:");
    println!("  database:   {}", corpus.database_path().display());
    println!("  collection: {}", corpus.collection);
    println!("  documents:  {}", corpus.documents.display());
    println!();

    let server = config.server();
    println!("Server:");
    println!("  bind: {}:{}", server.bind, server.port);
    println!();

    if !ctx.loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &ctx.loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'curacore config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("curacore.toml")
    } else {
        user_config_path()?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    curacore_config::save_config(&CuracoreConfig::with_defaults(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_path() -> Result<()> {
    println!("{}", user_config_path()?.display());
    Ok(())
}

fn user_config_path() -> Result<PathBuf> {
    curacore_config::xdg_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}
