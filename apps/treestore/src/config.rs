//! # Configuration
//!
//! Settings come from four layers, highest precedence first:
//!
//! 1. Command line flags
//! 2. Environment variables (`TREESTORE_RATE_LIMIT`, `TREESTORE_CORS_ORIGINS`)
//! 3. A TOML file (`--config <path>`, or `treestore.toml` in the working
//!    directory when present)
//! 4. Built-in defaults
//!
//! ```toml
//! database = "data/treestore.redb"
//! backend = "redb"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! rate_limit = 200
//! cors_origins = ["http://localhost:5173"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use treestore_core::TreeStoreError;

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "treestore.toml";

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

// =============================================================================
// BACKEND
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Persistent redb database file.
    #[default]
    Redb,
    /// Volatile in-memory tables (lost on exit).
    Memory,
}

impl Backend {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second, 0 disables rate limiting.
    pub rate_limit: u32,
    /// Allowed CORS origins. `None` allows localhost only, `["*"]` allows
    /// every origin.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: PathBuf,
    pub backend: Backend,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("treestore.redb"),
            backend: Backend::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Parse a TOML document. Unknown keys are rejected.
    pub fn from_toml(content: &str) -> Result<Self, TreeStoreError> {
        toml::from_str(content).map_err(|e| TreeStoreError::ConfigError(e.to_string()))
    }

    /// Load the file layer.
    ///
    /// An explicit `path` must exist. Without one, `treestore.toml` in the
    /// working directory is used if present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, TreeStoreError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            TreeStoreError::ConfigError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply the `TREESTORE_*` environment variables.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Unparsable values are ignored with a warning.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("TREESTORE_RATE_LIMIT") {
            match raw.trim().parse() {
                Ok(limit) => self.server.rate_limit = limit,
                Err(e) => tracing::warn!("Ignoring TREESTORE_RATE_LIMIT='{}': {}", raw, e),
            }
        }

        if let Some(raw) = lookup("TREESTORE_CORS_ORIGINS") {
            let origins: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !origins.is_empty() {
                self.server.cors_origins = Some(origins);
            }
        }

        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = Config::from_toml("backend = \"memory\"").expect("parse");
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.database, PathBuf::from("treestore.redb"));
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn full_document_parses() {
        let config = Config::from_toml(
            r#"
            database = "data/store.redb"
            backend = "redb"

            [server]
            host = "0.0.0.0"
            port = 9000
            rate_limit = 0
            cors_origins = ["http://localhost:5173"]
            "#,
        )
        .expect("parse");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.rate_limit, 0);
        assert_eq!(
            config.server.cors_origins,
            Some(vec!["http://localhost:5173".to_string()])
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::from_toml("[server]\nthreads = 4");
        assert!(matches!(result, Err(TreeStoreError::ConfigError(_))));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let result = Config::load(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(TreeStoreError::ConfigError(_))));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("treestore.toml");
        std::fs::write(&path, "[server]\nport = 7070\n").expect("write");

        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.server.port, 7070);
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = Config::from_toml("[server]\nrate_limit = 5").expect("parse");
        let config = config.with_overrides_from(|key| match key {
            "TREESTORE_RATE_LIMIT" => Some("250".to_string()),
            "TREESTORE_CORS_ORIGINS" => Some("http://a.test, http://b.test".to_string()),
            _ => None,
        });

        assert_eq!(config.server.rate_limit, 250);
        assert_eq!(
            config.server.cors_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
    }

    #[test]
    fn unparsable_override_is_ignored() {
        let config = Config::default().with_overrides_from(|key| {
            (key == "TREESTORE_RATE_LIMIT").then(|| "fast".to_string())
        });
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
    }
}
