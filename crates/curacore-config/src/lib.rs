//! Configuration system for CuraCore.
//!
//! Provides TOML-based configuration with:
//! - One section per subsystem (`[llm]`, `[embedding]`, `[corpus]`, `[retrieval]`,
//!   `[triage]`, `[session]`, `[server]`, `[logging]`)
//! - Config file layering (user config + project-local overrides)
//! - Validation of cross-field constraints such as chunk overlap vs. chunk size

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
