//! Convenient imports for common functionality.

pub use crate::actions::{SqlAction, SqlBuilder};
pub use crate::client::{DirectOutcome, SqlClient};
pub use crate::config::{DEFAULT_DATASOURCE_NAME, DataSourceConfig, DataSourceConfigBuilder};
pub use crate::driver::{
    Connection, DataSource, DataSourceProvider, KeyRequest, ProviderCatalog, Statement,
};
pub use crate::error::{ErrorKind, SqlActionError};
pub use crate::metrics::{MetricToken, MetricsFactory, PoolMetrics};
pub use crate::registry::{DataSourceHandle, DataSourceRegistry};
pub use crate::results::{ActionOutcome, ResultPage, Row, UpdateOutcome};
pub use crate::session::{ActionHandle, ConnectionSession, SessionState};
pub use crate::translation::{RewrittenSql, rewrite_named_parameters};
pub use crate::types::{ParamMap, RowValues};
