//! Ingest command - load reference documents into the corpus.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use curacore_corpus::CorpusStats;
use curacore_triage::{CorpusIngestor, DirectoryReport, IngestReport};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

use super::Context;
use crate::services::Corpus;

/// Arguments for the ingest command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Files or directories to ingest (defaults to `[corpus] documents`)
    pub paths: Vec<PathBuf>,

    /// Remove every chunk in the collection first
    #[arg(long)]
    pub clear: bool,

    /// Only print what the corpus holds
    #[arg(long, conflicts_with_all = ["paths", "clear"])]
    pub stats: bool,
}

/// Run the ingest command.
pub async fn run(args: IngestArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let corpus = Corpus::open(config)?;

    if args.stats {
        let stats = corpus.index.stats()?;
        print_stats(&stats, ctx.json_output);
        return Ok(());
    }

    if args.clear {
        let removed = corpus.index.clear()?;
        if !ctx.json_output {
            println!("Removed {} chunk(s)", removed);
        }
    }

    let ingestor = corpus.ingestor(config)?;
    let paths = if args.paths.is_empty() {
        vec![config.corpus().documents]
    } else {
        args.paths
    };

    let mut report = DirectoryReport::default();
    for path in &paths {
        if path.is_dir() {
            let dir_report = ingest_dir(&ingestor, path, ctx.json_output).await?;
            report.documents.extend(dir_report.documents);
            report.failures.extend(dir_report.failures);
        } else {
            match ingest_file(&ingestor, path, ctx.json_output).await {
                Ok(doc) => report.documents.push(doc),
                Err(e) => report.failures.push((path.clone(), e)),
            }
        }
    }

    print_report(&report, ctx.json_output);
    if !report.failures.is_empty() && report.documents.is_empty() {
        anyhow::bail!("No documents were ingested");
    }
    Ok(())
}

async fn ingest_file(
    ingestor: &CorpusIngestor,
    path: &Path,
    quiet: bool,
) -> curacore_triage::Result<IngestReport> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        create_progress_bar(&path.display().to_string())
    };
    let result = ingestor
        .ingest_with_progress(path, |progress| {
            bar.set_length(progress.total as u64);
            bar.set_position(progress.done as u64);
        })
        .await;
    bar.finish_and_clear();
    result
}

async fn ingest_dir(ingestor: &CorpusIngestor, dir: &Path, quiet: bool) -> Result<DirectoryReport> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        create_spinner(&format!("Ingesting {}", dir.display()))
    };
    let result = ingestor
        .ingest_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()));
    spinner.finish_and_clear();
    result
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} chunks {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_report(report: &DirectoryReport, json_output: bool) {
    if json_output {
        let failures: Vec<_> = report
            .failures
            .iter()
            .map(|(path, e)| json!({ "path": path.display().to_string(), "error": e.to_string() }))
            .collect();
        let value = json!({
            "documents": report.documents,
            "total_chunks": report.total_chunks(),
            "failures": failures,
        });
        println!("{}", value);
        return;
    }

    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    for doc in &report.documents {
        let skipped = if doc.skipped_sections > 0 {
            format!(" ({} empty section(s) skipped)", doc.skipped_sections)
        } else {
            String::new()
        };
        println!(
            "{} {} {}",
            green.apply_to("✓"),
            doc.source,
            dim.apply_to(format!("{} chunk(s){}", doc.chunks, skipped))
        );
    }
    for (path, e) in &report.failures {
        println!("{} {}: {}", red.apply_to("✗"), path.display(), e);
    }
    println!();
    println!(
        "{} document(s), {} chunk(s), {} failure(s)",
        report.documents.len(),
        report.total_chunks(),
        report.failures.len()
    );
}

fn print_stats(stats: &CorpusStats, json_output: bool) {
    if json_output {
        let value = json!({
            "collection": stats.collection,
            "chunks": stats.chunks,
            "dimensions": stats.dimensions,
            "embedder": stats.embedder,
            "sources": stats.sources.iter().map(|(s, n)| json!({ "source": s, "chunks": n })).collect::<Vec<_>>(),
        });
        println!("{}", value);
        return;
    }

    println!("Collection: {}", stats.collection);
    println!("Embedder:   {} ({} dims)", stats.embedder, stats.dimensions);
    println!("Chunks:     {}", stats.chunks);
    if !stats.sources.is_empty() {
        println!();
        for (source, chunks) in &stats.sources {
            println!("  {:<40} {}", source, chunks);
        }
    }
}
