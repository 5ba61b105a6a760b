//! Per-verb SQL synthesis and execution.
//!
//! A [`SqlAction`] is built from caller input, synthesized once into SQL text plus an ordered
//! parameter list, then executed against a physical connection by the session's queue.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::driver::KeyRequest;
use crate::error::SqlActionError;
use crate::translation::rewrite_named_parameters;
use crate::types::{ParamMap, RowValues};

mod binder;
mod execute;

pub use binder::bind_parameters;
pub(crate) use execute::execute_statement;

/// Caller-supplied SQL builder for dynamic queries: `(params, table) -> sql`.
///
/// The returned text may use `:name` placeholders; it goes through the same rewriting as
/// [`SqlAction::NamedQuery`].
pub type SqlBuilder = Arc<dyn Fn(&ParamMap, &str) -> String + Send + Sync>;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
        .expect("identifier pattern is valid")
});

/// One unit of SQL work.
#[derive(Clone)]
pub enum SqlAction {
    /// `INSERT INTO table (k1,...) VALUES (?,...)`, column order = map order
    Insert { table: String, params: ParamMap },
    /// `UPDATE table SET k1=?,... WHERE key1=? AND ...`
    UpdateByKey {
        table: String,
        params: ParamMap,
        key: ParamMap,
    },
    /// `DELETE FROM table WHERE key1=? AND ...`
    DeleteByKey { table: String, key: ParamMap },
    /// `SELECT * FROM table WHERE key1=? AND ...`
    FindByKey { table: String, key: ParamMap },
    /// Raw SQL with `:name` placeholders
    NamedQuery { sql: String, params: ParamMap },
    /// SQL produced by `builder` from `(params, table)`, then rewritten like a named query
    DynamicQuery {
        table: String,
        params: ParamMap,
        builder: SqlBuilder,
    },
    /// Raw SQL with positional `?` placeholders, returning rows
    Query { sql: String, params: Vec<RowValues> },
    /// Raw SQL with positional `?` placeholders, returning a row count
    Update { sql: String, params: Vec<RowValues> },
    /// Raw SQL without parameters; any result sets are discarded
    Execute { sql: String },
}

/// How the executor treats a synthesized statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementMode {
    /// Mutating; report rows affected and try to read generated keys
    Update(KeyRequest),
    /// Materialize every result page
    Rows,
    /// Run and drain, keep only the row count
    Discard,
}

/// SQL text ready for `prepare`, with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStatement {
    pub sql: String,
    pub params: Vec<RowValues>,
    pub mode: StatementMode,
}

impl SqlAction {
    /// Short verb name used in logs.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            SqlAction::Insert { .. } => "insert",
            SqlAction::UpdateByKey { .. } => "update_by_key",
            SqlAction::DeleteByKey { .. } => "delete_by_key",
            SqlAction::FindByKey { .. } => "find_by_key",
            SqlAction::NamedQuery { .. } => "named_query",
            SqlAction::DynamicQuery { .. } => "dynamic_query",
            SqlAction::Query { .. } => "query",
            SqlAction::Update { .. } => "update",
            SqlAction::Execute { .. } => "execute",
        }
    }

    /// Turn caller input into SQL text and an ordered parameter list.
    ///
    /// # Errors
    /// Returns `SqlActionError::SynthesisError` for empty tables, column or key maps, names that
    /// are not plain identifiers, and empty SQL.
    pub fn synthesize(&self) -> Result<SynthesizedStatement, SqlActionError> {
        match self {
            SqlAction::Insert { table, params } => {
                check_identifier("table", table)?;
                check_columns("insert", params)?;
                let columns: Vec<&str> = params.names().collect();
                let placeholders = vec!["?"; columns.len()];
                Ok(SynthesizedStatement {
                    sql: format!(
                        "INSERT INTO {table} ({}) VALUES ({})",
                        columns.join(","),
                        placeholders.join(",")
                    ),
                    params: params.values().cloned().collect(),
                    mode: StatementMode::Update(KeyRequest::Return),
                })
            }
            SqlAction::UpdateByKey { table, params, key } => {
                check_identifier("table", table)?;
                check_columns("update", params)?;
                check_columns("key", key)?;
                let assignments: Vec<String> =
                    params.names().map(|name| format!("{name}=?")).collect();
                // SET values bind first, key values after
                let bound = params.values().chain(key.values()).cloned().collect();
                Ok(SynthesizedStatement {
                    sql: format!(
                        "UPDATE {table} SET {} WHERE {}",
                        assignments.join(","),
                        key_clause(key)
                    ),
                    params: bound,
                    mode: StatementMode::Update(KeyRequest::NoReturn),
                })
            }
            SqlAction::DeleteByKey { table, key } => {
                check_identifier("table", table)?;
                check_columns("key", key)?;
                Ok(SynthesizedStatement {
                    sql: format!("DELETE FROM {table} WHERE {}", key_clause(key)),
                    params: key.values().cloned().collect(),
                    mode: StatementMode::Update(KeyRequest::NoReturn),
                })
            }
            SqlAction::FindByKey { table, key } => {
                check_identifier("table", table)?;
                check_columns("key", key)?;
                Ok(SynthesizedStatement {
                    sql: format!("SELECT * FROM {table} WHERE {}", key_clause(key)),
                    params: key.values().cloned().collect(),
                    mode: StatementMode::Rows,
                })
            }
            SqlAction::NamedQuery { sql, params } => named(sql, params),
            SqlAction::DynamicQuery {
                table,
                params,
                builder,
            } => named(&builder(params, table), params),
            SqlAction::Query { sql, params } => {
                check_sql(sql)?;
                Ok(SynthesizedStatement {
                    sql: sql.clone(),
                    params: params.clone(),
                    mode: StatementMode::Rows,
                })
            }
            SqlAction::Update { sql, params } => {
                check_sql(sql)?;
                Ok(SynthesizedStatement {
                    sql: sql.clone(),
                    params: params.clone(),
                    mode: StatementMode::Update(KeyRequest::Return),
                })
            }
            SqlAction::Execute { sql } => {
                check_sql(sql)?;
                Ok(SynthesizedStatement {
                    sql: sql.clone(),
                    params: Vec::new(),
                    mode: StatementMode::Discard,
                })
            }
        }
    }
}

impl fmt::Debug for SqlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SqlAction");
        s.field("verb", &self.verb());
        match self {
            SqlAction::Insert { table, params } => s.field("table", table).field("params", params),
            SqlAction::UpdateByKey { table, params, key } => s
                .field("table", table)
                .field("params", params)
                .field("key", key),
            SqlAction::DeleteByKey { table, key } | SqlAction::FindByKey { table, key } => {
                s.field("table", table).field("key", key)
            }
            SqlAction::NamedQuery { sql, params } => s.field("sql", sql).field("params", params),
            SqlAction::DynamicQuery { table, params, .. } => {
                s.field("table", table).field("params", params)
            }
            SqlAction::Query { sql, params } | SqlAction::Update { sql, params } => {
                s.field("sql", sql).field("params", params)
            }
            SqlAction::Execute { sql } => s.field("sql", sql),
        };
        s.finish()
    }
}

fn named(sql: &str, params: &ParamMap) -> Result<SynthesizedStatement, SqlActionError> {
    check_sql(sql)?;
    let rewritten = rewrite_named_parameters(sql, params);
    let values = rewritten.values();
    Ok(SynthesizedStatement {
        sql: rewritten.sql,
        params: values,
        mode: StatementMode::Rows,
    })
}

fn key_clause(key: &ParamMap) -> String {
    key.names()
        .map(|name| format!("{name}=?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn check_identifier(what: &str, name: &str) -> Result<(), SqlActionError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SqlActionError::SynthesisError(format!(
            "invalid {what} name '{name}'"
        )))
    }
}

fn check_columns(what: &str, map: &ParamMap) -> Result<(), SqlActionError> {
    if map.is_empty() {
        return Err(SqlActionError::SynthesisError(format!(
            "{what} map must not be empty"
        )));
    }
    map.names().try_for_each(|name| check_identifier("column", name))
}

fn check_sql(sql: &str) -> Result<(), SqlActionError> {
    if sql.trim().is_empty() {
        Err(SqlActionError::SynthesisError("SQL text is empty".into()))
    } else {
        Ok(())
    }
}
