// SQLite module - the default blocking driver behind the core
//
// - provider: r2d2 pool construction from a `DataSourceConfig`
// - connection: `Connection` / `Statement` implementations over rusqlite
// - params: conversion of portable values into rusqlite values
// - query: row materialization

mod connection;
mod params;
mod provider;
mod query;

pub use connection::{SqliteConnection, SqliteStatement};
pub use params::row_value_to_sqlite_value;
pub use provider::{SqliteDataSource, SqliteProvider};
pub use query::sqlite_extract_value_sync;
