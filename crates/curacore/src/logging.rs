//! Tracing setup: console output plus an optional rolling JSON file.

use anyhow::Result;
use curacore_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const CRATES: &[&str] = &[
    "curacore",
    "curacore_config",
    "curacore_llm",
    "curacore_corpus",
    "curacore_session",
    "curacore_triage",
    "curacore_server",
];

/// Filter directives for our crates at `level`, everything else at `warn`.
fn directives(level: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, level)).collect();
    parts.push("tower_http=info".to_string());
    parts.push("warn".to_string());
    parts.join(",")
}

fn console_filter(verbose: bool, config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::new(directives(level))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so the file writer flushes.
pub fn init(verbose: bool, json: bool, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter(verbose, config))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(verbose)
            .with_writer(std::io::stderr)
            .with_filter(console_filter(verbose, config))
            .boxed()
    };

    let (file, guard) = match config.json_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "curacore.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(directives("debug")));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).try_init()?;
    Ok(guard)
}
