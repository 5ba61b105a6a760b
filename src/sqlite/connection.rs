use std::collections::VecDeque;
use std::fmt;

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Batch;
use rusqlite::types::Value;

use crate::driver::{Connection, KeyRequest, Statement};
use crate::error::SqlActionError;
use crate::results::ResultPage;
use crate::types::RowValues;

use super::params::row_value_to_sqlite_value;
use super::query::build_result_page;

/// Pooled `SQLite` connection checked out from a [`SqliteDataSource`](super::SqliteDataSource).
pub struct SqliteConnection {
    conn: PooledConnection<SqliteConnectionManager>,
    auto_commit: bool,
}

impl SqliteConnection {
    pub(crate) fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self {
            conn,
            auto_commit: true,
        }
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("auto_commit", &self.auto_commit)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl Connection for SqliteConnection {
    fn prepare<'c>(
        &'c mut self,
        sql: &str,
        keys: KeyRequest,
    ) -> Result<Box<dyn Statement + 'c>, SqlActionError> {
        // With auto-commit off the transaction opens lazily, on the first statement after
        // set_auto_commit(false) or after the previous commit/rollback.
        if !self.auto_commit && !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(Box::new(SqliteStatement::new(&self.conn, sql, keys)))
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlActionError> {
        if auto_commit && self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlActionError> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlActionError> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn release(self: Box<Self>) -> Result<(), SqlActionError> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK").map_err(|e| {
                SqlActionError::SessionCloseError(format!(
                    "rollback of uncommitted work failed: {e}"
                ))
            })?;
        }
        // Dropping the pooled handle returns the connection to the r2d2 pool.
        drop(self);
        Ok(())
    }
}

/// Statement over one SQL string that may hold several `;`-separated statements.
///
/// Every statement of the batch runs on `execute`; row-returning ones each become a result
/// page and positional parameters are consumed statement by statement.
pub struct SqliteStatement<'c> {
    conn: &'c rusqlite::Connection,
    sql: String,
    keys: KeyRequest,
    bound: Vec<Option<Value>>,
    current: Option<ResultPage>,
    pending: VecDeque<ResultPage>,
    update_count: usize,
    inserted_rowid: Option<i64>,
}

impl<'c> SqliteStatement<'c> {
    fn new(conn: &'c rusqlite::Connection, sql: &str, keys: KeyRequest) -> Self {
        Self {
            conn,
            sql: sql.to_owned(),
            keys,
            bound: Vec::new(),
            current: None,
            pending: VecDeque::new(),
            update_count: 0,
            inserted_rowid: None,
        }
    }

    fn bound_values(&self) -> Result<Vec<Value>, SqlActionError> {
        self.bound
            .iter()
            .enumerate()
            .map(|(i, value)| {
                value.clone().ok_or_else(|| {
                    SqlActionError::ExecutionError(format!("parameter {} was never bound", i + 1))
                })
            })
            .collect()
    }
}

/// Whether `sql` starts with `INSERT` or `REPLACE`, ignoring leading whitespace and comments.
fn inserts_rows(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            break;
        }
    }
    let keyword: String = rest
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();
    keyword == "INSERT" || keyword == "REPLACE"
}

impl Statement for SqliteStatement<'_> {
    fn bind_positional(&mut self, index: usize, value: &RowValues) -> Result<(), SqlActionError> {
        if index == 0 {
            return Err(SqlActionError::ExecutionError(
                "parameter indexes are 1-based".into(),
            ));
        }
        if self.bound.len() < index {
            self.bound.resize(index, None);
        }
        self.bound[index - 1] = Some(row_value_to_sqlite_value(value));
        Ok(())
    }

    fn execute(&mut self) -> Result<bool, SqlActionError> {
        self.current = None;
        self.pending.clear();
        self.update_count = 0;
        self.inserted_rowid = None;

        let params = self.bound_values()?;
        let mut offset = 0usize;

        let mut batch = Batch::new(self.conn, &self.sql);
        while let Some(mut stmt) = batch.next()? {
            let count = stmt.parameter_count();
            let values = params.get(offset..offset + count).ok_or_else(|| {
                SqlActionError::ExecutionError(format!(
                    "statement expects at least {} parameters, {} bound",
                    offset + count,
                    params.len()
                ))
            })?;
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
            offset += count;

            if stmt.column_count() > 0 {
                self.pending.push_back(build_result_page(&mut stmt)?);
            } else {
                let changed = stmt.raw_execute()?;
                self.update_count += changed;
                if changed > 0 && stmt.expanded_sql().as_deref().is_some_and(inserts_rows) {
                    self.inserted_rowid = Some(self.conn.last_insert_rowid());
                }
            }
        }

        if offset != params.len() {
            return Err(SqlActionError::ExecutionError(format!(
                "{} parameters bound but the statement uses {offset}",
                params.len()
            )));
        }

        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn update_count(&self) -> usize {
        self.update_count
    }

    fn result_page(&mut self) -> Result<ResultPage, SqlActionError> {
        self.current
            .take()
            .ok_or_else(|| SqlActionError::ExecutionError("no current result page".into()))
    }

    fn more_results(&mut self) -> Result<bool, SqlActionError> {
        self.current = self.pending.pop_front();
        Ok(self.current.is_some())
    }

    fn generated_keys(&mut self) -> Result<Vec<RowValues>, SqlActionError> {
        match self.keys {
            KeyRequest::NoReturn => Ok(Vec::new()),
            KeyRequest::Return => Ok(self
                .inserted_rowid
                .map(RowValues::Int)
                .into_iter()
                .collect()),
        }
    }
}
