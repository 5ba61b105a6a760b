//! Asynchronous SQL actions over a blocking driver.
//!
//! Connection checkout runs on a small dedicated thread pool per datasource, and every checked
//! out connection gets its own worker thread that runs submitted actions strictly in order.
//! Callers only ever await futures.
//!
//! ```rust,no_run
//! use sql_action_middleware::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlActionError> {
//! let registry = DataSourceRegistry::new();
//! let config = DataSourceConfig::builder("sqlite:app.db").max_pool_size(4).finish();
//! let client = SqlClient::create_shared_default(&registry, &config)?;
//!
//! let session = client.get_connection().await?;
//! session
//!     .execute("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, name TEXT)")
//!     .await?;
//! let inserted = session.insert("t", ParamMap::from([("name", "a")])).await?;
//! let rows = session
//!     .named_query("SELECT * FROM t WHERE name LIKE :n", ParamMap::from([("n", "%a%")]))
//!     .await?;
//! session.close().await?;
//! client.close().await?;
//! # let _ = (inserted, rows);
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod actions;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod translation;
pub mod types;

pub use acquisition::AcquisitionExecutor;
pub use actions::{SqlAction, SqlBuilder, StatementMode, SynthesizedStatement};
pub use client::{DirectOutcome, SqlClient};
pub use config::{
    DEFAULT_DATASOURCE_NAME, DEFAULT_PROVIDER, DataSourceConfig, DataSourceConfigBuilder,
};
pub use error::{ErrorKind, SqlActionError};
pub use registry::{DataSourceHandle, DataSourceRegistry};
pub use results::{ActionOutcome, ResultPage, Row, UpdateOutcome};
pub use session::{ActionHandle, ConnectionSession, SessionState};
pub use translation::{RewrittenSql, rewrite_named_parameters};
pub use types::{ParamMap, RowValues};
