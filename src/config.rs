use serde::{Deserialize, Serialize};

use crate::error::SqlActionError;

/// Registry name of the shared default datasource.
pub const DEFAULT_DATASOURCE_NAME: &str = "DEFAULT_DS";

/// Provider used when a configuration names none.
pub const DEFAULT_PROVIDER: &str = "sqlite";

fn default_acquisition_threads() -> usize {
    1
}

/// Options for a datasource.
///
/// Deserializes from the JSON object form:
/// ```rust
/// use sql_action_middleware::prelude::*;
///
/// let cfg = DataSourceConfig::from_json(serde_json::json!({
///     "url": "file::memory:?cache=shared",
///     "max_pool_size": 4
/// }))?;
/// assert_eq!(cfg.provider(), "sqlite");
/// # Ok::<(), SqlActionError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub url: String,
    #[serde(default)]
    pub provider_class: Option<String>,
    #[serde(default)]
    pub driver_class: Option<String>,
    #[serde(default)]
    pub max_pool_size: Option<u32>,
    #[serde(default = "default_acquisition_threads")]
    pub acquisition_threads: usize,
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
}

impl DataSourceConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provider_class: None,
            driver_class: None,
            max_pool_size: None,
            acquisition_threads: default_acquisition_threads(),
            connection_timeout_ms: None,
        }
    }

    #[must_use]
    pub fn builder(url: impl Into<String>) -> DataSourceConfigBuilder {
        DataSourceConfigBuilder::new(url)
    }

    /// Parse a JSON configuration object.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` when the value is not a valid configuration.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SqlActionError> {
        let cfg: Self = serde_json::from_value(value)
            .map_err(|e| SqlActionError::ConfigError(format!("invalid datasource config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Provider name, falling back to [`DEFAULT_PROVIDER`].
    #[must_use]
    pub fn provider(&self) -> &str {
        self.provider_class.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Acquisition pool size, never below one.
    #[must_use]
    pub fn acquisition_threads(&self) -> usize {
        self.acquisition_threads.max(1)
    }

    pub(crate) fn validate(&self) -> Result<(), SqlActionError> {
        if self.url.trim().is_empty() {
            return Err(SqlActionError::ConfigError(
                "datasource url must not be empty".into(),
            ));
        }
        if self.max_pool_size == Some(0) {
            return Err(SqlActionError::ConfigError(
                "max_pool_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`DataSourceConfig`].
#[derive(Debug, Clone)]
pub struct DataSourceConfigBuilder {
    cfg: DataSourceConfig,
}

impl DataSourceConfigBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            cfg: DataSourceConfig::new(url),
        }
    }

    #[must_use]
    pub fn provider_class(mut self, provider: impl Into<String>) -> Self {
        self.cfg.provider_class = Some(provider.into());
        self
    }

    #[must_use]
    pub fn driver_class(mut self, driver: impl Into<String>) -> Self {
        self.cfg.driver_class = Some(driver.into());
        self
    }

    #[must_use]
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.cfg.max_pool_size = Some(size);
        self
    }

    #[must_use]
    pub fn acquisition_threads(mut self, threads: usize) -> Self {
        self.cfg.acquisition_threads = threads;
        self
    }

    #[must_use]
    pub fn connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.cfg.connection_timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub fn finish(self) -> DataSourceConfig {
        self.cfg
    }
}
