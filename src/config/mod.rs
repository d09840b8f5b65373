//! Harvester configuration.
//!
//! Every field has a default so a config file only needs the values that
//! differ (usually `base_url` and the paths).

mod loader;

pub use loader::{apply_env_overrides, load_config, LoadOptions};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::{ExtractorSettings, JsonPageExtractor, PageExtractor};
use crate::http_client::{FetchError, HttpClient, PaginationParams, DEFAULT_USER_AGENTS};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::RetryConfig;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}

/// Retry budget and backoff bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub retry_delay_base_ms: u64,
    pub retry_delay_max_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_base_ms: 1000,
            retry_delay_max_ms: 30_000,
            jitter: true,
        }
    }
}

/// Outbound request rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst: 5,
        }
    }
}

/// Top-level harvester configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Upstream base URL; paths below are resolved against it.
    pub base_url: String,
    /// Paginated collection endpoint.
    pub collection_path: String,
    /// Single-item endpoint; `{id}` is replaced by the item id.
    pub item_path: String,
    pub request_timeout_ms: u64,
    pub user_agents: Vec<String>,
    /// Stop after this many pages. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u64>,
    pub cache_ttl_seconds: u64,
    /// Where `harvest crawl` keeps its checkpoint (`.json` or `.db`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<PathBuf>,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
    pub pagination: PaginationParams,
    pub extractor: ExtractorSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            collection_path: "products".to_string(),
            item_path: "products/{id}".to_string(),
            request_timeout_ms: 30_000,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            max_pages: None,
            cache_ttl_seconds: 86_400,
            checkpoint_path: None,
            retry: RetrySettings::default(),
            rate_limit: RateLimitSettings::default(),
            pagination: PaginationParams::default(),
            extractor: ExtractorSettings::default(),
            source_path: None,
        }
    }
}

impl HarvestConfig {
    /// Check invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.base_url.trim().is_empty() {
            return invalid("base_url is required");
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "base_url '{}' is not a valid URL",
                self.base_url
            )));
        }
        if !self.item_path.contains("{id}") {
            return invalid("item_path must contain {id}");
        }
        if self.request_timeout_ms == 0 {
            return invalid("request_timeout_ms must be greater than 0");
        }
        if self.user_agents.is_empty() || self.user_agents.iter().any(|ua| ua.trim().is_empty())
        {
            return invalid("user_agents must list at least one non-empty user agent");
        }
        if self.retry.retry_delay_base_ms > self.retry.retry_delay_max_ms {
            return invalid("retry_delay_base_ms must not exceed retry_delay_max_ms");
        }
        if !(self.rate_limit.requests_per_second > 0.0
            && self.rate_limit.requests_per_second.is_finite())
        {
            return invalid("rate_limit.requests_per_second must be positive");
        }
        if self.rate_limit.burst == 0 {
            return invalid("rate_limit.burst must be at least 1");
        }
        if self.pagination.page_size == 0 {
            return invalid("pagination.page_size must be at least 1");
        }
        if self.max_pages == Some(0) {
            return invalid("max_pages must be at least 1 when set");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.retry_delay_base_ms),
            max_delay: Duration::from_millis(self.retry.retry_delay_max_ms),
            jitter: self.retry.jitter,
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.rate_limit.requests_per_second, self.rate_limit.burst)
    }

    /// HTTP client with its own rate limiter.
    pub fn build_client(&self) -> Result<HttpClient, ConfigError> {
        self.build_client_with(RateLimiter::with_config(self.rate_limit_config()))
    }

    /// HTTP client sharing `limiter` with other sessions.
    pub fn build_client_with(&self, limiter: RateLimiter) -> Result<HttpClient, ConfigError> {
        Ok(HttpClient::builder(&self.base_url, self.request_timeout())
            .rate_limiter(limiter)
            .retry(self.retry_config())
            .user_agents(self.user_agents.clone())
            .pagination(self.pagination.clone())
            .build()?)
    }

    pub fn build_extractor(&self) -> Arc<dyn PageExtractor> {
        Arc::new(JsonPageExtractor::new(self.extractor.clone()))
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Checkpoint path, relative paths resolved against the config file's
    /// directory.
    pub fn resolved_checkpoint_path(&self) -> Option<PathBuf> {
        let path = self.checkpoint_path.as_ref()?;
        if path.is_absolute() {
            return Some(path.clone());
        }
        Some(match self.base_dir() {
            Some(dir) => dir.join(path),
            None => path.clone(),
        })
    }

    /// Load from a TOML or JSON file (chosen by extension).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut config: HarvestConfig = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
            _ => serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?,
        };
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> HarvestConfig {
        HarvestConfig {
            base_url: "https://shop.example/api/".into(),
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.rate_limit_config(), RateLimitConfig::default());
        assert!(!config.user_agents.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(HarvestConfig::default().validate().is_err());

        let mut config = valid();
        config.rate_limit.burst = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.rate_limit.requests_per_second = 0.0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retry.retry_delay_base_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.user_agents = vec![];
        assert!(config.validate().is_err());

        let mut config = valid();
        config.item_path = "products".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HarvestConfig = toml::from_str(
            r#"
            base_url = "https://shop.example/"
            max_pages = 10

            [rate_limit]
            requests_per_second = 0.5

            [pagination]
            style = "offset"
            page_size = 50

            [extractor]
            results_path = "data.results"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_pages, Some(10));
        assert_eq!(config.rate_limit.requests_per_second, 0.5);
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.pagination.page_size, 50);
        assert_eq!(config.pagination.page_param, "page");
        assert_eq!(config.extractor.results_path, "data.results");
        assert_eq!(config.extractor.id_field, "id");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_path_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("harvester.json");
        std::fs::write(
            &json_path,
            r#"{"base_url": "https://shop.example/", "checkpoint_path": "state/cp.json"}"#,
        )
        .unwrap();

        let config = HarvestConfig::load_from_path(&json_path).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(json_path.as_path()));
        assert_eq!(
            config.resolved_checkpoint_path(),
            Some(dir.path().join("state/cp.json"))
        );

        let bad = dir.path().join("broken.toml");
        std::fs::write(&bad, "base_url = ").unwrap();
        assert!(matches!(
            HarvestConfig::load_from_path(&bad).await,
            Err(ConfigError::Parse { .. })
        ));
    }
}
