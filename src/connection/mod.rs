//! Connections the query layer runs compiled statements on.

#[cfg(feature = "rusqlite")]
mod sqlite;

use futures_util::future::LocalBoxFuture;
use quarry_core::{CompiledQuery, Dialect};
use serde_json::Value;

use crate::error::Result;
use crate::model::Row;

#[cfg(feature = "rusqlite")]
pub use sqlite::SqliteConnection;

/// What a database returned for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub rows: Vec<Row>,
    pub affected: u64,
    /// Generated identifiers, for drivers that report them outside of rows
    pub ids: Vec<Value>,
}

/// A database connection or transaction handle.
///
/// The dialect is probed once through [`Connection::dialect`] and decides
/// the SQL shape of dialect sensitive operations.
pub trait Connection {
    fn dialect(&self) -> Dialect;

    fn execute<'a>(&'a self, query: &'a CompiledQuery) -> LocalBoxFuture<'a, Result<RawResult>>;
}
