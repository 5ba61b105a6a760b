//! Process-wide, reference-counted datasource handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::acquisition::AcquisitionExecutor;
use crate::config::DataSourceConfig;
use crate::driver::{DataSource, DataSourceProvider, ProviderCatalog};
use crate::error::SqlActionError;
use crate::metrics::{self, MetricsFactory, PoolMetrics, SessionMetric};
use crate::session::ConnectionSession;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a handle's datasource comes from.
enum Origin {
    /// Built lazily by a provider on first acquisition
    Provider {
        config: DataSourceConfig,
        provider: Arc<dyn DataSourceProvider>,
    },
    /// Supplied ready-made by the caller
    Supplied,
}

/// Shared state for one named datasource.
///
/// Holds the lazily created datasource and acquisition executor, the metrics sink and the
/// number of clients referencing it.
pub struct DataSourceHandle {
    name: String,
    shared: bool,
    origin: Origin,
    threads: usize,
    data_source: Mutex<Option<Arc<dyn DataSource>>>,
    executor: Mutex<Option<Arc<AcquisitionExecutor>>>,
    metrics: Option<Arc<dyn PoolMetrics>>,
    ref_count: AtomicUsize,
    closed: AtomicBool,
}

impl DataSourceHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `false` for anonymous, private handles.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check out a connection on the acquisition executor and wrap it in a session.
    ///
    /// # Errors
    /// Returns the driver's checkout error unchanged, `SqlActionError::AcquisitionError` once
    /// the handle is closed, or the provider's error if the datasource cannot be created.
    pub async fn acquire(self: &Arc<Self>) -> Result<ConnectionSession, SqlActionError> {
        self.ensure_open()?;
        let executor = self.executor()?;
        let sink = metrics::enabled(self.metrics.as_ref());
        let queued = sink.as_ref().map(|m| m.submitted());
        debug!(datasource = %self.name, "connection acquisition submitted");

        let handle = Arc::clone(self);
        executor
            .submit(move || {
                let checked_out = handle
                    .data_source()
                    .and_then(|ds| ds.checkout_connection());
                match checked_out {
                    // The last release can land while this checkout blocks.
                    Ok(conn) if handle.is_closed() => {
                        if let Err(err) = conn.release() {
                            warn!(datasource = %handle.name, error = %err, "connection release after close failed");
                        }
                        debug!(datasource = %handle.name, "checkout finished after close; connection returned");
                        Err(handle.closed_error())
                    }
                    Ok(conn) => {
                        let metric = sink.zip(queued).map(|(sink, queued)| SessionMetric {
                            token: sink.begin(queued),
                            sink,
                        });
                        debug!(datasource = %handle.name, "connection checked out");
                        ConnectionSession::open(&handle.name, conn, metric)
                    }
                    Err(err) => {
                        if let Some((sink, queued)) = sink.zip(queued).filter(|_| !handle.is_closed()) {
                            sink.rejected(queued);
                        }
                        debug!(datasource = %handle.name, error = %err, "connection checkout failed");
                        Err(err)
                    }
                }
            })
            .await
    }

    fn ensure_open(&self) -> Result<(), SqlActionError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> SqlActionError {
        SqlActionError::AcquisitionError(format!("datasource '{}' is closed", self.name))
    }

    /// The datasource, created on first use. Never recreated once the handle is closed.
    fn data_source(&self) -> Result<Arc<dyn DataSource>, SqlActionError> {
        let mut slot = lock(&self.data_source);
        // Checked under the slot lock: `detach` takes the slot after `closed` is set.
        self.ensure_open()?;
        if let Some(ds) = slot.as_ref() {
            return Ok(Arc::clone(ds));
        }
        match &self.origin {
            Origin::Provider { config, provider } => {
                let ds = provider.data_source(config)?;
                debug!(datasource = %self.name, "datasource created");
                *slot = Some(Arc::clone(&ds));
                Ok(ds)
            }
            Origin::Supplied => Err(self.closed_error()),
        }
    }

    fn executor(&self) -> Result<Arc<AcquisitionExecutor>, SqlActionError> {
        let mut slot = lock(&self.executor);
        if let Some(executor) = slot.as_ref() {
            return Ok(Arc::clone(executor));
        }
        let executor = Arc::new(AcquisitionExecutor::new(&self.name, self.threads)?);
        *slot = Some(Arc::clone(&executor));
        Ok(executor)
    }

    /// Stop the executor and end metrics; returns the datasource still to be closed.
    fn detach(&self) -> Option<Arc<dyn DataSource>> {
        if let Some(executor) = lock(&self.executor).take() {
            executor.shutdown();
        }
        if let Some(sink) = &self.metrics {
            sink.close();
        }
        let ds = lock(&self.data_source).take();
        if ds.is_none() {
            debug!(datasource = %self.name, "handle closed before any datasource was created");
        }
        ds
    }

    /// Detach and close the datasource on a blocking thread.
    ///
    /// Detaching waits on the datasource slot, which an acquisition thread may hold while a
    /// provider builds the datasource.
    async fn teardown(self: &Arc<Self>) -> Result<(), SqlActionError> {
        let handle = Arc::clone(self);
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || handle.detach().map_or(Ok(()), |ds| ds.close()))
            .await
            .map_err(|err| {
                SqlActionError::ExecutionError(format!(
                    "datasource '{name}' teardown task failed: {err}"
                ))
            })?
    }
}

impl fmt::Debug for DataSourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceHandle")
            .field("name", &self.name)
            .field("shared", &self.shared)
            .field("ref_count", &self.ref_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Name -> handle map shared by every client built from it.
///
/// Cloning is cheap; clones see the same handles. All resolve and release bookkeeping runs
/// under one lock, so an increment can never race the decrement that would close a handle.
#[derive(Clone)]
pub struct DataSourceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    handles: Mutex<HashMap<String, Arc<DataSourceHandle>>>,
    providers: ProviderCatalog,
    metrics: Option<Arc<dyn MetricsFactory>>,
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceRegistry {
    /// Registry with the default provider catalog and no metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::with_providers(ProviderCatalog::default())
    }

    #[must_use]
    pub fn with_providers(providers: ProviderCatalog) -> Self {
        Self::build(providers, None)
    }

    /// Default providers; every handle gets a sink from `factory`.
    #[must_use]
    pub fn with_metrics(factory: Arc<dyn MetricsFactory>) -> Self {
        Self::build(ProviderCatalog::default(), Some(factory))
    }

    #[must_use]
    pub fn with_providers_and_metrics(
        providers: ProviderCatalog,
        factory: Arc<dyn MetricsFactory>,
    ) -> Self {
        Self::build(providers, Some(factory))
    }

    fn build(providers: ProviderCatalog, metrics: Option<Arc<dyn MetricsFactory>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                handles: Mutex::new(HashMap::new()),
                providers,
                metrics,
            }),
        }
    }

    /// Get or create the shared handle `name` and take a reference to it.
    ///
    /// `config` is required only when the handle does not exist yet; later calls ignore it.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` if the handle is new and `config` is missing,
    /// invalid or names an unknown provider, or if `name` belongs to a private handle. No
    /// entry is left behind on failure.
    pub fn resolve(
        &self,
        name: &str,
        config: Option<&DataSourceConfig>,
    ) -> Result<Arc<DataSourceHandle>, SqlActionError> {
        let mut handles = lock(&self.inner.handles);
        if let Some(handle) = handles.get(name) {
            if !handle.shared {
                return Err(SqlActionError::ConfigError(format!(
                    "datasource '{name}' is private and cannot be resolved by name"
                )));
            }
            let count = handle.ref_count.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(datasource = name, ref_count = count, "datasource reference added");
            return Ok(Arc::clone(handle));
        }
        let config = config.ok_or_else(|| {
            SqlActionError::ConfigError(format!(
                "datasource '{name}' is not registered and no configuration was given"
            ))
        })?;
        let handle = Arc::new(self.build_handle(name, true, config)?);
        handles.insert(name.to_owned(), Arc::clone(&handle));
        debug!(datasource = name, "datasource handle created");
        Ok(handle)
    }

    /// Create a private handle under a fresh UUID name.
    ///
    /// # Errors
    /// Returns `SqlActionError::ConfigError` if `config` is invalid or names an unknown provider.
    pub fn resolve_anonymous(
        &self,
        config: &DataSourceConfig,
    ) -> Result<Arc<DataSourceHandle>, SqlActionError> {
        let name = Uuid::new_v4().to_string();
        let handle = Arc::new(self.build_handle(&name, false, config)?);
        lock(&self.inner.handles).insert(name.clone(), Arc::clone(&handle));
        debug!(datasource = %name, "anonymous datasource handle created");
        Ok(handle)
    }

    /// Register a caller-built datasource as a private handle under a fresh UUID name.
    #[must_use]
    pub fn register_data_source(&self, data_source: Arc<dyn DataSource>) -> Arc<DataSourceHandle> {
        let name = Uuid::new_v4().to_string();
        let handle = Arc::new(DataSourceHandle {
            metrics: self.create_metrics(&name, None),
            name: name.clone(),
            shared: false,
            origin: Origin::Supplied,
            threads: 1,
            data_source: Mutex::new(Some(data_source)),
            executor: Mutex::new(None),
            ref_count: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
        });
        lock(&self.inner.handles).insert(name, Arc::clone(&handle));
        handle
    }

    /// Drop one reference; the last one closes the datasource.
    ///
    /// Releasing a handle that is already closed logs a warning and succeeds.
    ///
    /// # Errors
    /// Returns the datasource's teardown error when this release closed it.
    pub async fn release(&self, handle: &Arc<DataSourceHandle>) -> Result<(), SqlActionError> {
        if !self.decrement(handle) {
            return Ok(());
        }
        handle.teardown().await
    }

    /// [`Self::release`] for contexts that cannot await, such as `Drop`.
    ///
    /// Teardown runs on the current tokio runtime if there is one, otherwise on a new thread.
    pub fn release_detached(&self, handle: &Arc<DataSourceHandle>) {
        if !self.decrement(handle) {
            return;
        }
        let handle = Arc::clone(handle);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = handle.teardown().await {
                        error!(datasource = %handle.name, error = %err, "datasource teardown failed");
                    }
                });
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name(format!("sql-teardown-{}", handle.name))
                    .spawn(move || {
                        let result = handle.detach().map_or(Ok(()), |ds| ds.close());
                        if let Err(err) = result {
                            error!(datasource = %handle.name, error = %err, "datasource teardown failed");
                        }
                    });
                if let Err(err) = spawned {
                    error!(error = %err, "failed to spawn datasource teardown thread");
                }
            }
        }
    }

    /// Whether a live handle named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner.handles).contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.handles).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.handles).is_empty()
    }

    /// Close every remaining handle regardless of its reference count.
    ///
    /// # Errors
    /// Returns the first teardown error; every handle is still closed.
    pub async fn shutdown(&self) -> Result<(), SqlActionError> {
        let drained: Vec<_> = {
            let mut handles = lock(&self.inner.handles);
            handles.drain().map(|(_, handle)| handle).collect()
        };
        let mut first_error = None;
        for handle in drained {
            handle.closed.store(true, Ordering::Release);
            handle.ref_count.store(0, Ordering::Release);
            if let Err(err) = handle.teardown().await {
                error!(datasource = %handle.name, error = %err, "datasource teardown failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns `true` when this call dropped the last reference and the handle must be torn down.
    fn decrement(&self, handle: &Arc<DataSourceHandle>) -> bool {
        let mut handles = lock(&self.inner.handles);
        if handle.is_closed() {
            warn!(datasource = %handle.name, "release of an already closed datasource");
            return false;
        }
        let remaining = handle.ref_count.load(Ordering::Acquire).saturating_sub(1);
        handle.ref_count.store(remaining, Ordering::Release);
        if remaining > 0 {
            debug!(datasource = %handle.name, ref_count = remaining, "datasource reference dropped");
            return false;
        }
        if handles
            .get(&handle.name)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            handles.remove(&handle.name);
        }
        handle.closed.store(true, Ordering::Release);
        debug!(datasource = %handle.name, "last datasource reference dropped; closing");
        true
    }

    fn build_handle(
        &self,
        name: &str,
        shared: bool,
        config: &DataSourceConfig,
    ) -> Result<DataSourceHandle, SqlActionError> {
        config.validate()?;
        let provider = self.inner.providers.lookup(config)?;
        let metrics = self.create_metrics(name, provider.maximum_pool_size(config));
        Ok(DataSourceHandle {
            name: name.to_owned(),
            shared,
            threads: config.acquisition_threads(),
            origin: Origin::Provider {
                config: config.clone(),
                provider,
            },
            data_source: Mutex::new(None),
            executor: Mutex::new(None),
            metrics,
            ref_count: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn create_metrics(&self, name: &str, max_pool_size: Option<u32>) -> Option<Arc<dyn PoolMetrics>> {
        self.inner
            .metrics
            .as_ref()
            .map(|factory| factory.create(name, max_pool_size))
    }
}

impl fmt::Debug for DataSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handles = lock(&self.inner.handles);
        let mut names: Vec<_> = handles.keys().collect();
        names.sort();
        f.debug_struct("DataSourceRegistry")
            .field("handles", &names)
            .field("providers", &self.inner.providers)
            .field("metrics", &self.inner.metrics.is_some())
            .finish()
    }
}
