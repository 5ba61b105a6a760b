//! Boundary to the blocking driver layer.
//!
//! Everything here is synchronous and may block. The core only calls these methods from its
//! own dedicated threads: checkout from the acquisition pool, statement work from a session's
//! action queue, and datasource teardown from a blocking task.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::DataSourceConfig;
use crate::error::SqlActionError;
use crate::results::ResultPage;
use crate::types::RowValues;

/// Builds datasources from configuration.
pub trait DataSourceProvider: Send + Sync {
    /// Create the physical datasource. Called lazily on first acquisition.
    ///
    /// # Errors
    /// Returns an error if the datasource cannot be created from `config`.
    fn data_source(&self, config: &DataSourceConfig)
    -> Result<Arc<dyn DataSource>, SqlActionError>;

    /// Advisory pool size, reported to metrics.
    fn maximum_pool_size(&self, config: &DataSourceConfig) -> Option<u32> {
        config.max_pool_size
    }
}

/// A source of physical connections, typically a blocking pool.
pub trait DataSource: Send + Sync {
    /// Check out a connection. May block until one is free.
    ///
    /// # Errors
    /// Returns an error if no connection can be obtained.
    fn checkout_connection(&self) -> Result<Box<dyn Connection>, SqlActionError>;

    /// Provider-specific teardown.
    ///
    /// # Errors
    /// Returns an error if teardown fails.
    fn close(&self) -> Result<(), SqlActionError> {
        Ok(())
    }
}

/// Whether the statement should report generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRequest {
    Return,
    NoReturn,
}

/// A physical connection. Owned by exactly one session at a time.
pub trait Connection: Send {
    /// Prepare `sql` with `?` placeholders.
    ///
    /// # Errors
    /// Returns an error if the driver rejects the statement.
    fn prepare<'c>(
        &'c mut self,
        sql: &str,
        keys: KeyRequest,
    ) -> Result<Box<dyn Statement + 'c>, SqlActionError>;

    /// # Errors
    /// Returns an error if the driver cannot change the commit mode.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlActionError>;

    /// # Errors
    /// Returns an error if the commit fails.
    fn commit(&mut self) -> Result<(), SqlActionError>;

    /// # Errors
    /// Returns an error if the rollback fails.
    fn rollback(&mut self) -> Result<(), SqlActionError>;

    /// Return the connection to its datasource (or close it).
    ///
    /// # Errors
    /// Returns an error if the connection could not be released cleanly.
    fn release(self: Box<Self>) -> Result<(), SqlActionError>;
}

/// A prepared statement, modelled on the JDBC cursor protocol: `execute` reports whether a
/// result page is current, `result_page` materializes it and `more_results` advances.
pub trait Statement {
    /// Bind a value to the 1-based placeholder `index`.
    ///
    /// # Errors
    /// Returns an error if the value cannot be bound.
    fn bind_positional(&mut self, index: usize, value: &RowValues) -> Result<(), SqlActionError>;

    /// Run the statement; `true` when a result page is available.
    ///
    /// # Errors
    /// Returns an error if execution fails.
    fn execute(&mut self) -> Result<bool, SqlActionError>;

    /// Rows changed by the mutating parts of the statement.
    fn update_count(&self) -> usize;

    /// Materialize the current result page.
    ///
    /// # Errors
    /// Returns an error if no page is current or row data cannot be read.
    fn result_page(&mut self) -> Result<ResultPage, SqlActionError>;

    /// Advance to the next result page; `true` when there is one.
    ///
    /// # Errors
    /// Returns an error if the driver fails while advancing.
    fn more_results(&mut self) -> Result<bool, SqlActionError>;

    /// Keys generated by the last execution.
    ///
    /// # Errors
    /// Drivers report `SqlActionError::GeneratedKeyReadError` (or any other error) when keys
    /// cannot be read; callers treat that as "no keys".
    fn generated_keys(&mut self) -> Result<Vec<RowValues>, SqlActionError>;
}

/// Named providers available to a registry.
#[derive(Clone)]
pub struct ProviderCatalog {
    providers: HashMap<String, Arc<dyn DataSourceProvider>>,
}

impl ProviderCatalog {
    /// A catalog with no providers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn DataSourceProvider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn DataSourceProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Look up the provider a configuration asks for.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` when no provider is registered under that name.
    pub fn lookup(
        &self,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSourceProvider>, SqlActionError> {
        let name = config.provider();
        self.providers.get(name).cloned().ok_or_else(|| {
            SqlActionError::ConfigError(format!("no datasource provider registered as '{name}'"))
        })
    }
}

impl Default for ProviderCatalog {
    /// Every provider compiled in: `"sqlite"` with the `sqlite` feature.
    #[cfg(feature = "sqlite")]
    fn default() -> Self {
        Self::empty().with(
            crate::config::DEFAULT_PROVIDER,
            Arc::new(crate::sqlite::SqliteProvider) as Arc<dyn DataSourceProvider>,
        )
    }

    #[cfg(not(feature = "sqlite"))]
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderCatalog")
            .field("providers", &names)
            .finish()
    }
}
