//! CLI command handlers.

pub mod ask;
pub mod chat;
pub mod config;
pub mod ingest;
pub mod search;
pub mod serve;

use curacore_config::LoadedConfig;

/// Shared context for all commands.
#[derive(Debug)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn config(&self) -> &curacore_config::CuracoreConfig {
        &self.loaded.config
    }
}
