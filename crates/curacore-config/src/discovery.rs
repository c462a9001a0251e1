//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/curacore/config.toml` (XDG user config)
//! 2. `./curacore.toml` (project-local)
//! 3. An explicit `--config` file (handled by [`load_config_with_options`])

use std::path::{Path, PathBuf};

use crate::types::APP_NAME;
use crate::{ConfigError, CuracoreConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "curacore.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Environment variable to override the user config directory.
const CONFIG_DIR_ENV: &str = "CURACORE_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: CuracoreConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g. plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None, None)
}

/// Load configuration with explicit control over each layer.
///
/// `config_dir` overrides both `CURACORE_CONFIG_DIR` and the platform default.
/// `explicit` is applied last; unlike discovered layers it must exist and
/// parse, since the user asked for it by name.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = CuracoreConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    check_plaintext_keys(&config, &mut warnings);
    config.validate()?;

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CuracoreConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CuracoreConfig::from_toml(&contents)
}

/// Save configuration to a file, creating parent directories.
pub fn save_config(config: &CuracoreConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the user config file.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory: `CURACORE_CONFIG_DIR`, else the platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a discovered config file and merge it into `config`.
///
/// A broken discovered file is reported as a warning and skipped.
fn load_layer(config: &mut CuracoreConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

fn check_plaintext_keys(config: &CuracoreConfig, warnings: &mut Vec<String>) {
    if config.llm.as_ref().is_some_and(|llm| llm.has_plaintext_api_key()) {
        warnings.push(format!(
            "[llm] contains a plaintext API key. Consider setting {} instead.",
            crate::API_KEY_ENV
        ));
    }
    if config
        .embedding
        .as_ref()
        .is_some_and(|e| e.api_key.is_some())
    {
        warnings.push(
            "[embedding] contains a plaintext API key. Consider an environment variable instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::Backend;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
backend = "mock"
model = "test-model"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.llm().backend, Backend::Mock);
        assert_eq!(config.llm().model, "test-model");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_project_overrides_user() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[llm]
model = "user-model"

[server]
port = 9100
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("curacore.toml"),
            r#"
[llm]
model = "project-model"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path()), None).unwrap();
        assert_eq!(loaded.config.llm().model, "project-model");
        assert_eq!(loaded.config.server().port, 9100);
        assert_eq!(loaded.loaded_from().len(), 2);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_explicit_file_applied_last() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        let explicit = project_dir.path().join("custom.toml");
        fs::write(
            project_dir.path().join("curacore.toml"),
            "[retrieval]\nk = 4\n",
        )
        .unwrap();
        fs::write(&explicit, "[retrieval]\nk = 7\n").unwrap();

        let loaded = load_config_with_options(
            Some(project_dir.path()),
            Some(user_dir.path()),
            Some(&explicit),
        )
        .unwrap();
        assert_eq!(loaded.config.retrieval().k, 7);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        let result = load_config_with_options(
            Some(project_dir.path()),
            Some(user_dir.path()),
            Some(Path::new("/nonexistent/custom.toml")),
        );
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_broken_discovered_file_becomes_warning() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(user_dir.path().join("config.toml"), "[[[").unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_plaintext_key_warning() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("curacore.toml"),
            "[llm]\nbackend = \"openai\"\napi_key = \"sk-secret\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path()), None).unwrap();
        assert!(loaded.warnings.iter().any(|w| w.contains("plaintext")));
    }

    #[test]
    fn test_invalid_values_rejected_after_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("curacore.toml"),
            "[corpus]\nchunk_size = 100\nchunk_overlap = 150\n",
        )
        .unwrap();

        let result =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path()), None);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CuracoreConfig::with_defaults();
        if let Some(server) = config.server.as_mut() {
            server.port = 8123;
        }

        save_config(&config, &path).unwrap();
        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(reloaded.server().port, 8123);
    }

    #[test]
    #[serial_test::serial]
    fn test_config_dir_env_override() {
        let dir = TempDir::new().unwrap();
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        let path = xdg_config_path();
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
        assert_eq!(path, Some(dir.path().join("config.toml")));
    }
}
