//! A checked-out connection and the ordered queue of actions running on it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio::sync::oneshot;
use tracing::debug;

use crate::actions::{SqlAction, SqlBuilder, execute_statement};
use crate::driver::Connection;
use crate::error::SqlActionError;
use crate::metrics::SessionMetric;
use crate::results::{ActionOutcome, ResultPage, UpdateOutcome};
use crate::types::{ParamMap, RowValues};

mod handle;
mod queue;

pub use handle::ActionHandle;
use queue::{ActionQueue, Command, Job};

static SESSION_IDS: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`ConnectionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Accepting submissions
    Open = 0,
    /// Close requested; queued work still runs
    Closing = 1,
    /// Connection released and metrics ended
    Closed = 2,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Exclusive owner of one physical connection.
///
/// Every verb enqueues its work at call time and returns an [`ActionHandle`]; actions run
/// strictly in the order they were submitted, whichever task submitted them. Results arrive
/// on the awaiting task, never on the worker thread.
///
/// ```rust,no_run
/// use sql_action_middleware::prelude::*;
///
/// # async fn demo(client: &SqlClient) -> Result<(), SqlActionError> {
/// let session = client.get_connection().await?;
/// let inserted = session.insert("users", ParamMap::from([("name", "ada")]));
/// let found = session.find_by_key("users", ParamMap::from([("name", "ada")]));
/// inserted.await?;
/// let page = found.await?;
/// session.close().await?;
/// # let _ = page;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionSession {
    id: u64,
    datasource: String,
    state: Arc<AtomicU8>,
    queue: ActionQueue,
}

impl ConnectionSession {
    /// Wrap a freshly checked-out connection. Runs on the acquisition thread.
    pub(crate) fn open(
        datasource: &str,
        conn: Box<dyn Connection>,
        metric: Option<SessionMetric>,
    ) -> Result<Self, SqlActionError> {
        let id = SESSION_IDS.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(SessionState::Open as u8));
        let queue = match ActionQueue::spawn(id, conn, Arc::clone(&state), metric.clone()) {
            Ok(queue) => queue,
            Err(err) => {
                if let Some(metric) = metric {
                    metric.end(false);
                }
                return Err(err);
            }
        };
        debug!(session = id, datasource, "session opened");
        Ok(Self {
            id,
            datasource: datasource.to_owned(),
            state,
            queue,
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the datasource this session's connection came from.
    #[must_use]
    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Run any action, returning its raw outcome.
    pub fn run(&self, action: SqlAction) -> ActionHandle<ActionOutcome> {
        self.submit_action(action, Some)
    }

    /// `INSERT INTO table (...) VALUES (...)`; generated keys are requested.
    pub fn insert(&self, table: impl Into<String>, params: ParamMap) -> ActionHandle<UpdateOutcome> {
        self.submit_action(
            SqlAction::Insert {
                table: table.into(),
                params,
            },
            ActionOutcome::into_update,
        )
    }

    /// `UPDATE table SET ... WHERE key...`; `params` bind before `key`.
    pub fn update_by_key(
        &self,
        table: impl Into<String>,
        params: ParamMap,
        key: ParamMap,
    ) -> ActionHandle<UpdateOutcome> {
        self.submit_action(
            SqlAction::UpdateByKey {
                table: table.into(),
                params,
                key,
            },
            ActionOutcome::into_update,
        )
    }

    pub fn delete_by_key(
        &self,
        table: impl Into<String>,
        key: ParamMap,
    ) -> ActionHandle<UpdateOutcome> {
        self.submit_action(
            SqlAction::DeleteByKey {
                table: table.into(),
                key,
            },
            ActionOutcome::into_update,
        )
    }

    pub fn find_by_key(
        &self,
        table: impl Into<String>,
        key: ParamMap,
    ) -> ActionHandle<Option<ResultPage>> {
        self.submit_action(
            SqlAction::FindByKey {
                table: table.into(),
                key,
            },
            rows,
        )
    }

    /// Run SQL with `:name` placeholders. Each result set becomes one page of the chain.
    pub fn named_query(
        &self,
        sql: impl Into<String>,
        params: ParamMap,
    ) -> ActionHandle<Option<ResultPage>> {
        self.submit_action(
            SqlAction::NamedQuery {
                sql: sql.into(),
                params,
            },
            rows,
        )
    }

    /// Build SQL from `(params, table)` with `builder`, then run it like [`Self::named_query`].
    pub fn dynamic_query<F>(
        &self,
        table: impl Into<String>,
        params: ParamMap,
        builder: F,
    ) -> ActionHandle<Option<ResultPage>>
    where
        F: Fn(&ParamMap, &str) -> String + Send + Sync + 'static,
    {
        let builder: SqlBuilder = Arc::new(builder);
        self.submit_action(
            SqlAction::DynamicQuery {
                table: table.into(),
                params,
                builder,
            },
            rows,
        )
    }

    /// Positional `?` query.
    pub fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> ActionHandle<Option<ResultPage>> {
        self.submit_action(
            SqlAction::Query {
                sql: sql.into(),
                params,
            },
            rows,
        )
    }

    /// Positional `?` update.
    pub fn update(
        &self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> ActionHandle<UpdateOutcome> {
        self.submit_action(
            SqlAction::Update {
                sql: sql.into(),
                params,
            },
            ActionOutcome::into_update,
        )
    }

    /// Run SQL without parameters, typically DDL. Result sets are discarded.
    pub fn execute(&self, sql: impl Into<String>) -> ActionHandle<()> {
        self.submit_action(SqlAction::Execute { sql: sql.into() }, |_| Some(()))
    }

    pub fn set_auto_commit(&self, auto_commit: bool) -> ActionHandle<()> {
        self.submit(move |conn| conn.set_auto_commit(auto_commit))
    }

    pub fn commit(&self) -> ActionHandle<()> {
        self.submit(|conn| conn.commit())
    }

    pub fn rollback(&self) -> ActionHandle<()> {
        self.submit(|conn| conn.rollback())
    }

    /// Close the session once every action submitted before this call has run.
    ///
    /// Later submissions fail with `SqlActionError::SessionClosed`. Closing an already closing
    /// session resolves immediately.
    pub fn close(&self) -> ActionHandle<()> {
        if self
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return ActionHandle::ready(Ok(()));
        }
        let (tx, rx) = oneshot::channel();
        match self.queue.send(Command::Close {
            respond_to: Some(tx),
        }) {
            Ok(()) => ActionHandle::pending(rx),
            Err(err) => ActionHandle::ready(Err(err)),
        }
    }

    fn submit_action<T>(
        &self,
        action: SqlAction,
        extract: fn(ActionOutcome) -> Option<T>,
    ) -> ActionHandle<T>
    where
        T: Send + 'static,
    {
        if let Err(err) = self.ensure_open() {
            return ActionHandle::ready(Err(err));
        }
        let verb = action.verb();
        let statement = match action.synthesize() {
            Ok(statement) => statement,
            Err(err) => return ActionHandle::ready(Err(err)),
        };
        debug!(
            session = self.id,
            verb,
            sql = %statement.sql,
            params = statement.params.len(),
            "action submitted"
        );
        self.submit(move |conn| {
            let outcome = execute_statement(conn, &statement)?;
            extract(outcome).ok_or_else(|| {
                SqlActionError::ExecutionError(format!("{verb} produced an unexpected outcome"))
            })
        })
    }

    fn submit<T, F>(&self, work: F) -> ActionHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Connection) -> Result<T, SqlActionError> + Send + 'static,
    {
        if let Err(err) = self.ensure_open() {
            return ActionHandle::ready(Err(err));
        }
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = tx.send(work(conn));
        });
        match self.queue.send(Command::Run(job)) {
            Ok(()) => ActionHandle::pending(rx),
            Err(err) => ActionHandle::ready(Err(err)),
        }
    }

    fn ensure_open(&self) -> Result<(), SqlActionError> {
        match self.state() {
            SessionState::Open => Ok(()),
            state => Err(SqlActionError::SessionClosed(format!(
                "session {} is {state:?}",
                self.id
            ))),
        }
    }
}

fn rows(outcome: ActionOutcome) -> Option<Option<ResultPage>> {
    match outcome {
        ActionOutcome::Rows(page) => Some(page),
        ActionOutcome::Update(_) => None,
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let was_open = self
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if was_open {
            debug!(session = self.id, "session dropped while open; closing");
            let _ = self.queue.send(Command::Close { respond_to: None });
        }
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("datasource", &self.datasource)
            .field("state", &self.state())
            .finish()
    }
}
