//! Ask command - one-shot question answered from the reference corpus.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;
use crate::services::Services;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to answer
    #[arg(required = true)]
    pub question: String,

    /// List the chunks the answer was grounded on
    #[arg(long)]
    pub sources: bool,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let services = Services::build(ctx.config())?;
    let answer = services.answerer().answer(&args.question).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.reply);

    if (args.sources || ctx.verbose) && !answer.sources.is_empty() {
        let dim = Style::new().dim();
        println!();
        println!("{}", dim.apply_to("Sources:"));
        for chunk in &answer.sources {
            println!(
                "  {}",
                dim.apply_to(format!("{} (distance: {:.3})", chunk.source, chunk.distance))
            );
        }
    }
    Ok(())
}
