//! Tool configuration.
//!
//! Defaults come from the environment. A TOML file can override any field:
//!
//! ```toml
//! cache-dir = "/var/cache/suiteforge"
//! fetch-timeout-secs = 120
//! fetch-retries = 3
//! conflict-resolution = "latest"
//!
//! [handlers]
//! "custom:FastRNativeProject" = "make -C {dir}"
//! ```

use crate::manifest::ConflictPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "SUITEFORGE_CONFIG";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "SUITEFORGE_CACHE_DIR";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Resolver and transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Directory for downloaded libraries and fetched suite snapshots.
    pub cache_dir: PathBuf,
    /// Per-request timeout for downloads.
    pub fetch_timeout_secs: u64,
    /// Retries after a transient transport failure.
    pub fetch_retries: u32,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Replaces every suite's declared conflict policy when set.
    pub conflict_resolution: Option<ConflictPolicy>,
    /// Command templates for build handler tokens, used for dry runs.
    pub handlers: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = std::env::var_os(CACHE_DIR_ENV).map_or_else(
            || {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from(".cache"))
                    .join("suiteforge")
            },
            PathBuf::from,
        );
        Self {
            cache_dir,
            fetch_timeout_secs: 60,
            fetch_retries: 2,
            user_agent: format!("suiteforge/{}", env!("CARGO_PKG_VERSION")),
            conflict_resolution: None,
            handlers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, filling unset fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the explicitly given file, else the file named by
    /// `SUITEFORGE_CONFIG`, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named file cannot be read or parsed.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// The download timeout as a duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Directory holding downloaded libraries.
    #[must_use]
    pub fn library_cache(&self) -> PathBuf {
        self.cache_dir.join("libraries")
    }

    /// Directory holding fetched suite snapshots.
    #[must_use]
    pub fn suite_cache(&self) -> PathBuf {
        self.cache_dir.join("suites")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
cache-dir = "/tmp/sf-cache"
fetch-retries = 5
conflict-resolution = "latest"

[handlers]
"custom:Native" = "make -C {dir}"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/sf-cache"));
        assert_eq!(config.fetch_retries, 5);
        assert_eq!(config.fetch_timeout_secs, 60);
        assert_eq!(config.conflict_resolution, Some(ConflictPolicy::Latest));
        assert_eq!(config.handlers["custom:Native"], "make -C {dir}");
        assert_eq!(config.library_cache(), PathBuf::from("/tmp/sf-cache/libraries"));
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cache = \"/tmp\"\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/suiteforge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
