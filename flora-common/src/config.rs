//! Configuration file resolution, TOML loading and secret resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/flora/<file>`)
//! 4. System config directory (`/etc/flora/<file>`, Linux only)
//!
//! When no file is found, callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (e.g. "info", "flora_id=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the configuration file path
///
/// Returns `None` when no candidate exists; this is not an error.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("flora").join(file_name)) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System config directory
    if cfg!(target_os = "linux") {
        let system = PathBuf::from("/etc/flora").join(file_name);
        if system.exists() {
            return Some(system);
        }
    }

    None
}

/// Load a TOML configuration file, or defaults when `path` is `None`
///
/// An explicitly given path that cannot be read or parsed is an error:
/// a misconfigured deployment must fail before serving requests.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Validate a secret value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a secret from ENV → TOML
///
/// **Priority:** Environment → TOML. Warns when both carry a value.
pub fn resolve_secret(env_var_name: &str, toml_value: Option<&str>, label: &str) -> Option<String> {
    let env_value = std::env::var(env_var_name).ok().filter(|k| is_valid_key(k));
    let toml_value = toml_value.filter(|k| is_valid_key(k));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment ({}) and TOML. Using environment (highest priority).",
            label, env_var_name
        );
    }

    if let Some(key) = env_value {
        info!("{} loaded from environment variable", label);
        return Some(key.trim().to_string());
    }

    if let Some(key) = toml_value {
        info!("{} loaded from TOML config", label);
        return Some(key.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        logging: LoggingConfig,
        name: Option<String>,
    }

    #[test]
    fn test_load_defaults_without_path() {
        let config: Sample = load_toml_config(None).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.name.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flora-id.toml");
        std::fs::write(&path, "name = \"flora\"\n[logging]\nlevel = \"debug\"\n").unwrap();

        let config: Sample = load_toml_config(Some(&path)).unwrap();
        assert_eq!(config.name.as_deref(), Some("flora"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let result: Result<Sample> = load_toml_config(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "name = [unterminated").unwrap();
        let result: Result<Sample> = load_toml_config(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_cli_path_beats_env() {
        std::env::set_var("FLORA_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(
            Some(Path::new("/from/cli.toml")),
            "FLORA_TEST_CONFIG",
            "flora-test.toml",
        );
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));
        std::env::remove_var("FLORA_TEST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_env_path_used_without_cli() {
        std::env::set_var("FLORA_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(None, "FLORA_TEST_CONFIG", "flora-test.toml");
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var("FLORA_TEST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_secret_env_overrides_toml() {
        std::env::set_var("FLORA_TEST_SECRET", "env-key");
        let key = resolve_secret("FLORA_TEST_SECRET", Some("toml-key"), "Test key");
        assert_eq!(key.as_deref(), Some("env-key"));
        std::env::remove_var("FLORA_TEST_SECRET");
    }

    #[test]
    #[serial]
    fn test_secret_falls_back_to_toml_and_ignores_blank() {
        std::env::set_var("FLORA_TEST_SECRET", "   ");
        let key = resolve_secret("FLORA_TEST_SECRET", Some(" toml-key "), "Test key");
        assert_eq!(key.as_deref(), Some("toml-key"));

        let none = resolve_secret("FLORA_TEST_SECRET", Some(""), "Test key");
        assert!(none.is_none());
        std::env::remove_var("FLORA_TEST_SECRET");
    }
}
