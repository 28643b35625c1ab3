//! Configuration management for browsedex
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Web fetching configuration
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Scrape/index batch configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Keep temporary copies made of locked browser databases
    #[serde(default = "default_keep_tmp_files")]
    pub keep_tmp_files: bool,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Web fetching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Concurrent requests per target domain
    #[serde(default = "default_crawl_concurrency_per_domain")]
    pub concurrency_per_domain: usize,

    /// Minimum delay between requests to the same domain (milliseconds)
    #[serde(default = "default_crawl_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added on top of the delay (milliseconds)
    #[serde(default = "default_crawl_jitter_ms")]
    pub jitter_ms: u64,

    /// Request timeout in seconds
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Redirect hops before a URL is given up on
    #[serde(default = "default_crawl_max_redirects")]
    pub max_redirects: usize,

    /// User agent string
    #[serde(default = "default_crawl_user_agent")]
    pub user_agent: String,
}

impl CrawlConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

/// Scrape and index pass configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// URLs fetched per scrape batch
    #[serde(default = "default_scrape_batch_size")]
    pub scrape_batch_size: usize,

    /// Entities written per index batch
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,

    /// Retries when the database is locked while recording index watermarks
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Fixed backoff between those retries (milliseconds)
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum results per query
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for browsedex data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the SQLite content store
    pub db_file: PathBuf,

    /// Path to the full-text index file
    pub index_file: PathBuf,

    /// Where locked browser databases are copied before reading
    pub tmp_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            pipeline: PipelineConfig::default(),
            search: SearchConfig::default(),
            keep_tmp_files: default_keep_tmp_files(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency_per_domain: default_crawl_concurrency_per_domain(),
            delay_ms: default_crawl_delay_ms(),
            jitter_ms: default_crawl_jitter_ms(),
            timeout_secs: default_crawl_timeout(),
            max_redirects: default_crawl_max_redirects(),
            user_agent: default_crawl_user_agent(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scrape_batch_size: default_scrape_batch_size(),
            index_batch_size: default_index_batch_size(),
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

impl Config {
    /// Get the default base directory
    pub fn default_base_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("browsedex")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("db.sqlite"),
            index_file: base.join("searchindex.db"),
            tmp_dir: std::env::temp_dir(),
            base_dir: base,
        };
    }

    /// Load configuration from a specific base directory.
    /// A missing config file is not an error; defaults are used.
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit config file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Data files live next to the config file
        let base = config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.init_paths(Some(base));
        config.paths.config_file = config_path.to_path_buf();

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.crawl.concurrency_per_domain == 0 {
            return Err(Error::Config(
                "crawl.concurrency_per_domain must be at least 1".to_string(),
            ));
        }

        if self.pipeline.scrape_batch_size == 0 || self.pipeline.index_batch_size == 0 {
            return Err(Error::Config(
                "pipeline batch sizes must be at least 1".to_string(),
            ));
        }

        if self.crawl.timeout_secs == 0 {
            return Err(Error::Config(
                "crawl.timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.scrape_batch_size, 100);
        assert_eq!(config.crawl.max_redirects, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.crawl.delay_ms = 250;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.crawl.delay_ms, 250);
        assert_eq!(loaded.paths.db_file, tmp.path().join("db.sqlite"));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let loaded = Config::load_from(Some(tmp.path().join("nowhere"))).unwrap();
        assert_eq!(loaded.search.limit, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.crawl.concurrency_per_domain = 0;
        assert!(config.validate().is_err());

        config.crawl.concurrency_per_domain = 2;
        config.pipeline.index_batch_size = 0;
        assert!(config.validate().is_err());

        config.pipeline.index_batch_size = 10;
        assert!(config.validate().is_ok());
    }
}
