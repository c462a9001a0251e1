//! Search command - inspect what retrieval would feed the model.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;
use crate::services::Corpus;

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to search for
    #[arg(required = true)]
    pub query: String,

    /// Number of chunks to return (defaults to `[retrieval] k`)
    #[arg(short, long)]
    pub k: Option<usize>,
}

/// Run the search command.
pub async fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let corpus = Corpus::open(config)?;
    let retriever = corpus.retriever(config)?;
    let k = args.k.unwrap_or_else(|| retriever.k());
    if k == 0 {
        anyhow::bail!("-k must be at least 1");
    }

    let results = retriever.search(&args.query, k).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if results.is_empty() {
        println!("{}", dim.apply_to("No matching chunks. Run 'curacore ingest' first?"));
        return Ok(());
    }

    for (i, chunk) in results.iter().enumerate() {
        println!(
            "{}. {} {}",
            i + 1,
            Style::new().bold().apply_to(&chunk.source),
            dim.apply_to(format!("(distance: {:.3})", chunk.distance))
        );
        for line in chunk.text.lines() {
            println!("   {}", line);
        }
        println!();
    }
    Ok(())
}
