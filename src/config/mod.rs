//! Configuration management for chanwatch.
//!
//! Configuration is read from `~/.config/chanwatch/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub watcher: WatcherConfig,
    pub pages: PagesConfig,
    pub parser: ParserConfig,
    pub sites: SitesConfig,
    pub http: HttpConfig,
}

/// Foreground bookmark watcher settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Whether bookmarks are watched at all (default: true)
    pub enabled: bool,

    /// Base delay between two update cycles (default: 30000)
    pub foreground_interval_ms: u64,

    /// Extra delay added per `bookmarks_per_step` active bookmarks (default: 5000)
    pub additional_interval_ms: u64,

    pub bookmarks_per_step: usize,

    /// Log every cycle and parse batch
    pub verbose_logs: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            foreground_interval_ms: 30_000,
            additional_interval_ms: 5_000,
            bookmarks_per_step: 10,
            verbose_logs: false,
        }
    }
}

impl WatcherConfig {
    /// Delay before the next cycle given the number of active bookmarks.
    pub fn interval_for(&self, active_bookmarks: usize) -> Duration {
        let steps = (active_bookmarks / self.bookmarks_per_step.max(1)) as u64;
        Duration::from_millis(
            self.foreground_interval_ms
                .saturating_add(steps.saturating_mul(self.additional_interval_ms)),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Board pages older than this are refetched (default: 300)
    pub update_interval_secs: u64,

    /// Minimum time between two last-page alerts for one thread (default: 300)
    pub last_page_notify_interval_secs: u64,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 300,
            last_page_notify_interval_secs: 300,
        }
    }
}

impl PagesConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn last_page_notify_interval(&self) -> Duration {
        Duration::from_secs(self.last_page_notify_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Posts parsed concurrently before moving to the next batch (default: 16)
    pub posts_per_batch: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { posts_per_batch: 16 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SitesConfig {
    /// Quiet window before site order and settings changes are written (default: 500)
    pub persist_debounce_ms: u64,
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            persist_debounce_ms: 500,
        }
    }
}

impl SitesConfig {
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent string to use
    pub user_agent: String,

    /// Maximum concurrent thread requests while updating bookmarks (default: 10)
    pub max_concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("chanwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrency: 10,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/chanwatch/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("chanwatch").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# chanwatch configuration
#
# Every key is optional; missing keys fall back to the values shown here.

[watcher]
# Watch bookmarked threads while `chanwatch watch` runs
enabled = true

# The delay between two update cycles is
#   foreground_interval_ms + (active bookmarks / bookmarks_per_step) * additional_interval_ms
foreground_interval_ms = 30000
additional_interval_ms = 5000
bookmarks_per_step = 10

# Log every update cycle and parse batch
verbose_logs = false

[pages]
# Board page indexes older than this are refetched on access
update_interval_secs = 300

# Minimum time between two "thread is on the last page" alerts
last_page_notify_interval_secs = 300

[parser]
# Posts parsed concurrently before moving to the next batch
posts_per_batch = 16

[sites]
# Quiet window before site order and settings changes are written to disk
persist_debounce_ms = 500

[http]
timeout_secs = 30
max_concurrency = 10
# user_agent = "chanwatch/0.1"
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let config: Config = toml::from_str(Config::default_config_content())
            .expect("Default config should be valid TOML");

        assert!(config.watcher.enabled);
        assert_eq!(config.watcher.foreground_interval_ms, 30_000);
        assert_eq!(config.parser.posts_per_batch, 16);
        assert_eq!(config.sites.persist_debounce_ms, 500);
        assert!(config.http.user_agent.starts_with("chanwatch/"));
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[watcher]
foreground_interval_ms = 1000
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.watcher.foreground_interval_ms, 1000);
        assert_eq!(config.watcher.additional_interval_ms, 5000);
        assert_eq!(config.pages.update_interval_secs, 300);
    }

    #[test]
    fn test_interval_grows_with_bookmarks() {
        let watcher = WatcherConfig::default();

        assert_eq!(watcher.interval_for(0), Duration::from_millis(30_000));
        assert_eq!(watcher.interval_for(9), Duration::from_millis(30_000));
        assert_eq!(watcher.interval_for(25), Duration::from_millis(40_000));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pages.last_page_notify_interval_secs, 300);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.watcher.bookmarks_per_step, 10);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[watcher]\nenabled = \"maybe\"").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }
}
