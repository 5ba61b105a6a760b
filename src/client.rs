//! Client facade: datasource selection, connection checkout and one-shot execution.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::actions::SqlAction;
use crate::config::{DEFAULT_DATASOURCE_NAME, DataSourceConfig};
use crate::driver::DataSource;
use crate::error::SqlActionError;
use crate::registry::{DataSourceHandle, DataSourceRegistry};
use crate::results::{ActionOutcome, ResultPage, UpdateOutcome};
use crate::session::ConnectionSession;
use crate::types::RowValues;

/// Both signals of a one-shot execution, kept apart.
#[derive(Debug)]
pub struct DirectOutcome {
    /// What the action itself produced
    pub result: Result<ActionOutcome, SqlActionError>,
    /// Whether closing the session afterwards succeeded
    pub close: Result<(), SqlActionError>,
}

impl DirectOutcome {
    /// Collapse to one result: an action failure wins, otherwise a close failure replaces the
    /// action's success.
    ///
    /// # Errors
    /// The action's error, or the close error when the action succeeded.
    pub fn into_result(self) -> Result<ActionOutcome, SqlActionError> {
        let outcome = self.result?;
        self.close?;
        Ok(outcome)
    }
}

/// Entry point for running SQL actions against one datasource.
///
/// Clients created with the same name share one datasource handle; the handle closes when the
/// last of them is closed or dropped.
pub struct SqlClient {
    registry: DataSourceRegistry,
    handle: Arc<DataSourceHandle>,
    closed: AtomicBool,
}

impl SqlClient {
    /// Client on the shared datasource `name`, created from `config` if it does not exist.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` when the datasource has to be created and
    /// `config` is invalid or names an unknown provider.
    pub fn create_shared(
        registry: &DataSourceRegistry,
        config: &DataSourceConfig,
        name: &str,
    ) -> Result<Self, SqlActionError> {
        let handle = registry.resolve(name, Some(config))?;
        Ok(Self::from_handle(registry, handle))
    }

    /// Client on the shared default datasource, [`DEFAULT_DATASOURCE_NAME`].
    ///
    /// # Errors
    /// See [`Self::create_shared`].
    pub fn create_shared_default(
        registry: &DataSourceRegistry,
        config: &DataSourceConfig,
    ) -> Result<Self, SqlActionError> {
        Self::create_shared(registry, config, DEFAULT_DATASOURCE_NAME)
    }

    /// Client on a private datasource nobody else can resolve.
    ///
    /// # Errors
    /// See [`Self::create_shared`].
    pub fn create_non_shared(
        registry: &DataSourceRegistry,
        config: &DataSourceConfig,
    ) -> Result<Self, SqlActionError> {
        let handle = registry.resolve_anonymous(config)?;
        Ok(Self::from_handle(registry, handle))
    }

    /// Client on a caller-built datasource, registered privately.
    #[must_use]
    pub fn with_data_source(registry: &DataSourceRegistry, data_source: Arc<dyn DataSource>) -> Self {
        let handle = registry.register_data_source(data_source);
        Self::from_handle(registry, handle)
    }

    fn from_handle(registry: &DataSourceRegistry, handle: Arc<DataSourceHandle>) -> Self {
        debug!(datasource = %handle.name(), shared = handle.is_shared(), "client created");
        Self {
            registry: registry.clone(),
            handle,
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the datasource this client uses.
    #[must_use]
    pub fn datasource_name(&self) -> &str {
        self.handle.name()
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<DataSourceHandle> {
        &self.handle
    }

    /// Check out a connection. Checkout runs on the datasource's acquisition threads.
    ///
    /// # Errors
    /// Returns the checkout error, or `SqlActionError::AcquisitionError` after [`Self::close`].
    pub async fn get_connection(&self) -> Result<ConnectionSession, SqlActionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SqlActionError::AcquisitionError(format!(
                "client for '{}' is closed",
                self.handle.name()
            )));
        }
        self.handle.acquire().await
    }

    /// Check out, run one action, close.
    ///
    /// A failure closing the session replaces the action's success.
    ///
    /// # Errors
    /// Acquisition, synthesis or execution errors, or the close error.
    pub async fn run_direct(&self, action: SqlAction) -> Result<ActionOutcome, SqlActionError> {
        self.run_direct_detailed(action).await?.into_result()
    }

    /// Like [`Self::run_direct`] but reports the action and the close separately.
    ///
    /// # Errors
    /// Only acquisition errors; everything after checkout is in the [`DirectOutcome`].
    pub async fn run_direct_detailed(
        &self,
        action: SqlAction,
    ) -> Result<DirectOutcome, SqlActionError> {
        let session = self.get_connection().await?;
        let pending = session.run(action);
        let closing = session.close();
        let result = pending.await;
        let close = closing.await;
        if let (Ok(_), Err(err)) = (&result, &close) {
            warn!(session = session.id(), error = %err, "action succeeded but session close failed");
        }
        Ok(DirectOutcome { result, close })
    }

    /// One-shot positional query.
    ///
    /// # Errors
    /// See [`Self::run_direct`].
    pub async fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Result<Option<ResultPage>, SqlActionError> {
        let outcome = self
            .run_direct(SqlAction::Query {
                sql: sql.into(),
                params,
            })
            .await?;
        Ok(outcome.into_rows())
    }

    /// One-shot positional update.
    ///
    /// # Errors
    /// See [`Self::run_direct`].
    pub async fn update(
        &self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Result<UpdateOutcome, SqlActionError> {
        let outcome = self
            .run_direct(SqlAction::Update {
                sql: sql.into(),
                params,
            })
            .await?;
        outcome.into_update().ok_or_else(|| {
            SqlActionError::ExecutionError("update produced a row result".into())
        })
    }

    /// Release this client's reference to the datasource. Idempotent.
    ///
    /// # Errors
    /// Returns the datasource teardown error when this was the last reference.
    pub async fn close(&self) -> Result<(), SqlActionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.registry.release(&self.handle).await
    }
}

impl Drop for SqlClient {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.release_detached(&self.handle);
        }
    }
}

impl fmt::Debug for SqlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlClient")
            .field("datasource", &self.handle.name())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
