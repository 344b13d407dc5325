//! Crawler configuration, loaded from TOML.
//!
//! ```toml
//! database_path = "/var/lib/catcrawl/metadata.sqlite3"
//! rerun_secs = 5
//! checksum = "blake3"
//! extractor = "fits"
//! on_query_error = "abort_cycle"
//!
//! [catalog]
//! url = "http://lsst-db2.slac.stanford.edu:8180/rest-datacat-v1/r"
//!
//! [watch]
//! folder = "/LSST"
//! site = "SLAC"
//! ```

use crate::checksum::ChecksumAlgorithm;
use crate::extractor::ExtractorKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CATALOG_URL: &str = "http://lsst-db2.slac.stanford.edu:8180/rest-datacat-v1/r";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What the scheduler does when the unscanned-dataset query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorPolicy {
    /// Log, count, and try again next interval
    #[default]
    AbortCycle,
    /// Stop the scheduler with the error
    Exit,
}

/// Catalog service connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// Per-request timeout
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
}

/// The folder and storage site this crawler is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_folder")]
    pub folder: String,

    #[serde(default = "default_watch_site")]
    pub site: String,
}

/// Main crawler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    /// Path to the SQLite metadata store
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Delay between the end of one cycle and the start of the next
    #[serde(default = "default_rerun_secs")]
    pub rerun_secs: u64,

    /// Maximum datasets fetched per cycle
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Bound on each metadata-store insert
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    #[serde(default)]
    pub checksum: ChecksumAlgorithm,

    #[serde(default)]
    pub extractor: ExtractorKind,

    #[serde(default)]
    pub on_query_error: QueryErrorPolicy,
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_catalog_timeout() -> u64 {
    30
}

fn default_watch_folder() -> String {
    "/LSST".to_string()
}

fn default_watch_site() -> String {
    "SLAC".to_string()
}

fn default_database_path() -> PathBuf {
    catcrawl_logging::catcrawl_home().join("metadata.sqlite3")
}

fn default_rerun_secs() -> u64 {
    5
}

fn default_page_size() -> usize {
    1000
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout_secs: default_catalog_timeout(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            folder: default_watch_folder(),
            site: default_watch_site(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            watch: WatchConfig::default(),
            database_path: default_database_path(),
            rerun_secs: default_rerun_secs(),
            page_size: default_page_size(),
            store_timeout_secs: default_store_timeout(),
            checksum: ChecksumAlgorithm::default(),
            extractor: ExtractorKind::default(),
            on_query_error: QueryErrorPolicy::default(),
        }
    }
}

/// Default config file location: `$CATCRAWL_HOME/catcrawl.toml`.
pub fn default_config_path() -> PathBuf {
    catcrawl_logging::catcrawl_home().join("catcrawl.toml")
}

impl CrawlerConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CrawlerConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.folder.trim().is_empty() {
            return Err(ConfigError::Invalid("watch.folder must not be empty".into()));
        }
        if !self.watch.folder.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "watch.folder must be an absolute catalog path, got '{}'",
                self.watch.folder
            )));
        }
        if self.watch.site.trim().is_empty() {
            return Err(ConfigError::Invalid("watch.site must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be greater than 0".into()));
        }
        if self.rerun_secs == 0 {
            return Err(ConfigError::Invalid("rerun_secs must be greater than 0".into()));
        }
        if self.catalog.timeout_secs == 0 || self.store_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than 0".into()));
        }
        url::Url::parse(&self.catalog.url).map_err(|e| {
            ConfigError::Invalid(format!(
                "catalog.url '{}' is not a valid URL: {}",
                self.catalog.url, e
            ))
        })?;
        Ok(())
    }

    pub fn rerun_interval(&self) -> Duration {
        Duration::from_secs(self.rerun_secs)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog.timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CrawlerConfig::default();
        assert_eq!(config.watch.folder, "/LSST");
        assert_eq!(config.watch.site, "SLAC");
        assert_eq!(config.catalog.url, DEFAULT_CATALOG_URL);
        assert_eq!(config.rerun_interval(), Duration::from_secs(5));
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.checksum, ChecksumAlgorithm::Blake3);
        assert_eq!(config.extractor, ExtractorKind::None);
        assert_eq!(config.on_query_error, QueryErrorPolicy::AbortCycle);
        assert!(config.database_path.ends_with("metadata.sqlite3"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: CrawlerConfig = toml::from_str(
            r#"
            rerun_secs = 30
            checksum = "sha256"
            extractor = "fits"
            on_query_error = "exit"

            [watch]
            site = "IN2P3"
            "#,
        )
        .unwrap();

        assert_eq!(config.rerun_secs, 30);
        assert_eq!(config.checksum, ChecksumAlgorithm::Sha256);
        assert_eq!(config.extractor, ExtractorKind::Fits);
        assert_eq!(config.on_query_error, QueryErrorPolicy::Exit);
        assert_eq!(config.watch.site, "IN2P3");
        assert_eq!(config.watch.folder, "/LSST");
        assert_eq!(config.catalog.timeout_secs, 30);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = CrawlerConfig::default();
        config.watch.folder = "LSST".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CrawlerConfig::default();
        config.watch.site = " ".into();
        assert!(config.validate().is_err());

        let mut config = CrawlerConfig::default();
        config.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = CrawlerConfig::default();
        config.rerun_secs = 0;
        assert!(config.validate().is_err());

        let mut config = CrawlerConfig::default();
        config.catalog.url = "::not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = 50\n[catalog]\nurl = \"http://localhost:8180/r\"").unwrap();

        let config = CrawlerConfig::load(file.path()).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.catalog.url, "http://localhost:8180/r");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = \"many\"").unwrap();
        assert!(matches!(
            CrawlerConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CrawlerConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.watch.folder, "/LSST");

        let err = CrawlerConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
