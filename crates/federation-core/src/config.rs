//! Configuration for the federation engine.

use crate::error::{CoreError, CoreResult};
use crate::paths::Paths;
use crate::types::Protocol;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default repository-protocol service URL (can be overridden at compile
/// time via FEDERATION_REPO_SERVICE_URL).
pub const DEFAULT_REPO_SERVICE_URL: &str = match option_env!("FEDERATION_REPO_SERVICE_URL") {
    Some(url) => url,
    None => "https://pds.loopwell.app",
};

/// Default activity-protocol base URL (can be overridden at compile time
/// via FEDERATION_ACTIVITY_BASE_URL).
pub const DEFAULT_ACTIVITY_BASE_URL: &str = match option_env!("FEDERATION_ACTIVITY_BASE_URL") {
    Some(url) => url,
    None => "https://social.loopwell.app",
};

/// Default record collection for repository-protocol posts.
pub const DEFAULT_REPO_COLLECTION: &str = "app.bsky.feed.post";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Attempts allowed before a mapping is marked failed.
pub const DEFAULT_RETRY_CEILING: u32 = 5;

const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RESWEEP_INTERVAL_SECS: u64 = 900;

/// Repository-protocol connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoProtocolConfig {
    /// Service URL of the record host.
    #[serde(default = "default_repo_service_url")]
    pub service_url: String,
    /// DID of the repository records are written into.
    #[serde(default)]
    pub repo_did: String,
    /// Record collection (NSID) posts are created under.
    #[serde(default = "default_repo_collection")]
    pub collection: String,
    /// Bearer token for the service session.
    #[serde(default)]
    pub access_token: String,
}

impl Default for RepoProtocolConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_REPO_SERVICE_URL.to_string(),
            repo_did: String::new(),
            collection: DEFAULT_REPO_COLLECTION.to_string(),
            access_token: String::new(),
        }
    }
}

/// Activity-protocol connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityProtocolConfig {
    /// Base URL of the home instance.
    #[serde(default = "default_activity_base_url")]
    pub base_url: String,
    /// Bearer token for the instance API.
    #[serde(default)]
    pub access_token: String,
}

impl Default for ActivityProtocolConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ACTIVITY_BASE_URL.to_string(),
            access_token: String::new(),
        }
    }
}

/// Main federation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Protocols content is federated to.
    #[serde(default = "default_enabled_protocols")]
    pub enabled_protocols: Vec<Protocol>,
    /// Size of the dispatcher worker pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Attempts allowed before a mapping is marked failed.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
    /// First retry delay in seconds; doubles per attempt.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Upper bound on the retry delay in seconds.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Per-request timeout for adapter network calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Interval between scheduled failed-mapping resweeps, in seconds.
    /// Zero disables the schedule.
    #[serde(default = "default_resweep_interval_secs")]
    pub resweep_interval_secs: u64,
    #[serde(default)]
    pub repo_protocol: RepoProtocolConfig,
    #[serde(default)]
    pub activity_protocol: ActivityProtocolConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_enabled_protocols() -> Vec<Protocol> {
    Protocol::ALL.to_vec()
}

fn default_worker_count() -> usize {
    2 * Protocol::ALL.len()
}

fn default_retry_ceiling() -> u32 {
    DEFAULT_RETRY_CEILING
}

fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}

fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_resweep_interval_secs() -> u64 {
    DEFAULT_RESWEEP_INTERVAL_SECS
}

fn default_repo_service_url() -> String {
    DEFAULT_REPO_SERVICE_URL.to_string()
}

fn default_repo_collection() -> String {
    DEFAULT_REPO_COLLECTION.to_string()
}

fn default_activity_base_url() -> String {
    DEFAULT_ACTIVITY_BASE_URL.to_string()
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            enabled_protocols: default_enabled_protocols(),
            worker_count: default_worker_count(),
            retry_ceiling: default_retry_ceiling(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            resweep_interval_secs: default_resweep_interval_secs(),
            repo_protocol: RepoProtocolConfig::default(),
            activity_protocol: ActivityProtocolConfig::default(),
        }
    }
}

impl FederationConfig {
    /// Create a new config with default values, then override from
    /// environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults
    /// when the file does not exist.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FederationConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables. Only the log
    /// level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("FEDERATION_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Repository-protocol service URL as a parsed URL.
    pub fn repo_service_url(&self) -> CoreResult<Url> {
        Url::parse(&self.repo_protocol.service_url).map_err(CoreError::from)
    }

    /// Activity-protocol base URL as a parsed URL.
    pub fn activity_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.activity_protocol.base_url).map_err(CoreError::from)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Scheduled resweep interval, or `None` when disabled.
    pub fn resweep_interval(&self) -> Option<Duration> {
        if self.resweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.resweep_interval_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = FederationConfig::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.enabled_protocols, Protocol::ALL.to_vec());
        assert_eq!(config.retry_ceiling, DEFAULT_RETRY_CEILING);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.repo_protocol.service_url, DEFAULT_REPO_SERVICE_URL);
        assert_eq!(
            config.activity_protocol.base_url,
            DEFAULT_ACTIVITY_BASE_URL
        );
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("federation.json");

        let config_json = r#"{
            "log_level": "debug",
            "retry_ceiling": 3,
            "enabled_protocols": ["repo-protocol"]
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = FederationConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.retry_ceiling, 3);
        assert_eq!(config.enabled_protocols, vec![Protocol::RepoProtocol]);
        // Unspecified fields fall back to defaults
        assert_eq!(config.backoff_base_secs, 2);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = FederationConfig::default();
        config.log_level = "trace".to_string();
        config.repo_protocol.repo_did = "did:plc:xyz".to_string();

        config.save(&paths).unwrap();

        let loaded = FederationConfig::load(&paths).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.repo_protocol.repo_did, "did:plc:xyz");
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = FederationConfig::load(&paths).unwrap();
        assert_eq!(config.repo_protocol.service_url, DEFAULT_REPO_SERVICE_URL);
    }

    #[test]
    fn test_config_url_parse() {
        let config = FederationConfig::default();
        let url = config.repo_service_url().unwrap();
        assert_eq!(url.scheme(), "https");
        let url = config.activity_base_url().unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = FederationConfig::default();
        config.repo_protocol.service_url = "not a valid url".to_string();

        let result = config.repo_service_url();
        assert!(result.is_err());
    }

    #[test]
    fn test_durations() {
        let config = FederationConfig::default();
        assert_eq!(config.backoff_base(), Duration::from_secs(2));
        assert_eq!(config.backoff_max(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.resweep_interval().is_some());
    }

    #[test]
    fn test_resweep_interval_zero_disables() {
        let mut config = FederationConfig::default();
        config.resweep_interval_secs = 0;
        assert_eq!(config.resweep_interval(), None);
    }
}
