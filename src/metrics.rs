//! Opaque pool metrics sink.
//!
//! The core only emits events; aggregation and export belong to the implementor.
//! Event order for one connection: `submitted` when acquisition is queued, then either
//! `rejected` (checkout failed) or `begin` (checkout succeeded) followed by `end` once the
//! session releases its connection. `close` fires when the owning datasource is torn down.

use std::sync::Arc;

/// Correlates the events of a single acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricToken(pub u64);

pub trait PoolMetrics: Send + Sync {
    fn submitted(&self) -> MetricToken;
    fn begin(&self, queued: MetricToken) -> MetricToken;
    fn rejected(&self, queued: MetricToken);
    fn end(&self, token: MetricToken, succeeded: bool);
    fn close(&self);

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Creates one metrics sink per datasource handle.
pub trait MetricsFactory: Send + Sync {
    fn create(&self, datasource_name: &str, max_pool_size: Option<u32>) -> Arc<dyn PoolMetrics>;
}

/// Metrics handle carried by a session: sink plus the token from `begin`.
#[derive(Clone)]
pub(crate) struct SessionMetric {
    pub(crate) sink: Arc<dyn PoolMetrics>,
    pub(crate) token: MetricToken,
}

impl SessionMetric {
    pub(crate) fn end(&self, succeeded: bool) {
        self.sink.end(self.token, succeeded);
    }
}

/// Returns the sink only when it is enabled.
pub(crate) fn enabled(metrics: Option<&Arc<dyn PoolMetrics>>) -> Option<Arc<dyn PoolMetrics>> {
    metrics.filter(|m| m.is_enabled()).cloned()
}
