#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_action_middleware::prelude::*;
use tempfile::tempdir;

pub const FAKE_PROVIDER: &str = "fake";

/// Shared knobs and observations for the scripted driver.
#[derive(Default)]
pub struct FakeState {
    timeline: Mutex<Vec<String>>,
    pub fail_key_read: AtomicBool,
    pub fail_release: AtomicBool,
    pub fail_checkout: AtomicBool,
    pub execute_delay_ms: AtomicU64,
    pub checkout_delay_ms: AtomicU64,
    pub data_sources_created: AtomicUsize,
    pub data_sources_closed: AtomicUsize,
    pub releases: AtomicUsize,
}

impl FakeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        self.timeline.lock().unwrap().push(event.into());
    }

    pub fn timeline(&self) -> Vec<String> {
        self.timeline.lock().unwrap().clone()
    }

    /// Only the `page:` events, in order.
    pub fn pages(&self) -> Vec<String> {
        self.timeline()
            .into_iter()
            .filter(|e| e.starts_with("page:"))
            .collect()
    }
}

pub struct FakeProvider(pub Arc<FakeState>);

impl DataSourceProvider for FakeProvider {
    fn data_source(
        &self,
        _config: &DataSourceConfig,
    ) -> Result<Arc<dyn DataSource>, SqlActionError> {
        self.0.data_sources_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeDataSource(Arc::clone(&self.0))))
    }
}

pub struct FakeDataSource(pub Arc<FakeState>);

impl DataSource for FakeDataSource {
    fn checkout_connection(&self) -> Result<Box<dyn Connection>, SqlActionError> {
        if self.0.fail_checkout.load(Ordering::SeqCst) {
            return Err(SqlActionError::AcquisitionError("pool exhausted".into()));
        }
        let delay = self.0.checkout_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.0),
        }))
    }

    fn close(&self) -> Result<(), SqlActionError> {
        self.0.data_sources_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnection {
    state: Arc<FakeState>,
}

impl Connection for FakeConnection {
    fn prepare<'c>(
        &'c mut self,
        sql: &str,
        _keys: KeyRequest,
    ) -> Result<Box<dyn Statement + 'c>, SqlActionError> {
        if sql.contains("syntax error") {
            return Err(SqlActionError::ExecutionError(format!("near \"{sql}\"")));
        }
        self.state.record(format!("prepare:{sql}"));
        Ok(Box::new(FakeStatement {
            state: Arc::clone(&self.state),
            sql: sql.to_owned(),
            bound: Vec::new(),
            current: None,
            pending: VecDeque::new(),
            update_count: 0,
        }))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlActionError> {
        self.state.record(format!("auto_commit:{auto_commit}"));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlActionError> {
        self.state.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlActionError> {
        self.state.record("rollback");
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), SqlActionError> {
        self.state.record("release");
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_release.load(Ordering::SeqCst) {
            return Err(SqlActionError::SessionCloseError("socket reset".into()));
        }
        Ok(())
    }
}

/// `select ...; select ...` yields one single-row page per segment with columns
/// `seq` and `sql`; anything else updates one row per segment.
struct FakeStatement {
    state: Arc<FakeState>,
    sql: String,
    bound: Vec<RowValues>,
    current: Option<(usize, ResultPage)>,
    pending: VecDeque<(usize, ResultPage)>,
    update_count: usize,
}

impl Statement for FakeStatement {
    fn bind_positional(&mut self, index: usize, value: &RowValues) -> Result<(), SqlActionError> {
        if self.bound.len() < index {
            self.bound.resize(index, RowValues::Null);
        }
        self.bound[index - 1] = value.clone();
        Ok(())
    }

    fn execute(&mut self) -> Result<bool, SqlActionError> {
        let delay = self.state.execute_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.state
            .record(format!("execute:{}:{}", self.sql, self.bound.len()));

        let segments: Vec<&str> = self
            .sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if self.sql.trim_start().to_ascii_lowercase().starts_with("select") {
            for (seq, segment) in segments.iter().enumerate() {
                let mut page = ResultPage::with_columns(vec!["seq".into(), "sql".into()], 1);
                page.add_row_values(vec![
                    RowValues::Int(seq as i64),
                    RowValues::Text((*segment).to_owned()),
                ]);
                self.pending.push_back((seq, page));
            }
        } else {
            self.update_count = segments.len();
        }
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn update_count(&self) -> usize {
        self.update_count
    }

    fn result_page(&mut self) -> Result<ResultPage, SqlActionError> {
        let (seq, page) = self
            .current
            .take()
            .ok_or_else(|| SqlActionError::ExecutionError("no current page".into()))?;
        self.state.record(format!("page:{}:{seq}", self.sql));
        Ok(page)
    }

    fn more_results(&mut self) -> Result<bool, SqlActionError> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn generated_keys(&mut self) -> Result<Vec<RowValues>, SqlActionError> {
        if self.state.fail_key_read.load(Ordering::SeqCst) {
            return Err(SqlActionError::GeneratedKeyReadError(
                "permission denied".into(),
            ));
        }
        Ok(vec![RowValues::Int(42)])
    }
}

pub fn fake_catalog(state: &Arc<FakeState>) -> ProviderCatalog {
    ProviderCatalog::empty().with(FAKE_PROVIDER, Arc::new(FakeProvider(Arc::clone(state))))
}

pub fn fake_registry(state: &Arc<FakeState>) -> DataSourceRegistry {
    DataSourceRegistry::with_providers(fake_catalog(state))
}

pub fn fake_config() -> DataSourceConfig {
    DataSourceConfig::builder("fake://db")
        .provider_class(FAKE_PROVIDER)
        .finish()
}

/// Records every metrics event as a string.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<String>>,
    next: AtomicU64,
}

impl RecordingMetrics {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl PoolMetrics for RecordingMetrics {
    fn submitted(&self) -> MetricToken {
        self.push("submitted".into());
        MetricToken(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn begin(&self, queued: MetricToken) -> MetricToken {
        self.push("begin".into());
        queued
    }

    fn rejected(&self, _queued: MetricToken) {
        self.push("rejected".into());
    }

    fn end(&self, _token: MetricToken, succeeded: bool) {
        self.push(format!("end:{succeeded}"));
    }

    fn close(&self) {
        self.push("close".into());
    }
}

#[derive(Default)]
pub struct RecordingFactory {
    sinks: Mutex<HashMap<String, Arc<RecordingMetrics>>>,
    pool_sizes: Mutex<Vec<Option<u32>>>,
}

impl RecordingFactory {
    pub fn sink(&self, name: &str) -> Arc<RecordingMetrics> {
        Arc::clone(self.sinks.lock().unwrap().get(name).expect("sink created"))
    }

    pub fn pool_sizes(&self) -> Vec<Option<u32>> {
        self.pool_sizes.lock().unwrap().clone()
    }
}

impl MetricsFactory for RecordingFactory {
    fn create(&self, datasource_name: &str, max_pool_size: Option<u32>) -> Arc<dyn PoolMetrics> {
        let sink = Arc::new(RecordingMetrics::default());
        self.sinks
            .lock()
            .unwrap()
            .insert(datasource_name.to_owned(), Arc::clone(&sink));
        self.pool_sizes.lock().unwrap().push(max_pool_size);
        sink
    }
}

pub fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

/// Poll `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
