use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::debug;

use crate::config::DataSourceConfig;
use crate::driver::{Connection, DataSource, DataSourceProvider};
use crate::error::SqlActionError;

use super::connection::SqliteConnection;

const DEFAULT_MAX_POOL_SIZE: u32 = 10;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider registered as `"sqlite"`: an r2d2 pool of rusqlite connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl DataSourceProvider for SqliteProvider {
    fn data_source(
        &self,
        config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSource>, SqlActionError> {
        Ok(Arc::new(SqliteDataSource::open(config)?))
    }

    fn maximum_pool_size(&self, config: &DataSourceConfig) -> Option<u32> {
        Some(config.max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE))
    }
}

/// Blocking `SQLite` connection pool.
pub struct SqliteDataSource {
    pool: Pool<SqliteConnectionManager>,
    db_path: String,
}

impl SqliteDataSource {
    /// Build the pool. No connection is opened until the first checkout.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` if the pool cannot be built.
    pub fn open(config: &DataSourceConfig) -> Result<Self, SqlActionError> {
        config.validate()?;
        let db_path = normalize_url(&config.url).to_owned();
        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));

        let pool = Pool::builder()
            .max_size(config.max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE))
            .min_idle(Some(0))
            .connection_timeout(Duration::from_millis(
                config
                    .connection_timeout_ms
                    .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_MS),
            ))
            .build(manager)
            .map_err(|e| {
                SqlActionError::ConfigError(format!("Failed to create SQLite pool: {e}"))
            })?;

        debug!(db_path = %db_path, "sqlite datasource created");
        Ok(Self { pool, db_path })
    }

    #[must_use]
    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

impl DataSource for SqliteDataSource {
    fn checkout_connection(&self) -> Result<Box<dyn Connection>, SqlActionError> {
        let conn = self.pool.get().map_err(|e| {
            SqlActionError::AcquisitionError(format!("sqlite checkout error: {e}"))
        })?;
        Ok(Box::new(SqliteConnection::new(conn)))
    }

    fn close(&self) -> Result<(), SqlActionError> {
        // r2d2 closes idle connections when the last pool handle drops; checked-out ones
        // close as their sessions release them.
        let state = self.pool.state();
        debug!(
            db_path = %self.db_path,
            connections = state.connections,
            idle = state.idle_connections,
            "sqlite datasource closed"
        );
        Ok(())
    }
}

impl fmt::Debug for SqliteDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDataSource")
            .field("db_path", &self.db_path)
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

/// Strip driver prefixes so the remainder is a path or a `file:` URI.
fn normalize_url(url: &str) -> &str {
    let url = url.trim();
    ["jdbc:sqlite:", "sqlite://", "sqlite:"]
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .unwrap_or(url)
}
