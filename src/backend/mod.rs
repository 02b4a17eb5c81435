//! Driver abstraction layer.
//!
//! This module provides trait definitions that abstract statement
//! preparation, parameter binding, cursor traversal and batching, so the
//! query layer can run against any engine that implements them. The bundled
//! SQLite driver lives behind the `backend-sqlite` feature; a scriptable mock
//! driver is available to tests and the `test-utils` feature.
//!
//! Statements and cursors are single-owner: a statement is owned by exactly
//! one invocation object, and a cursor mutably borrows its statement for the
//! duration of the traversal.

use std::collections::BTreeMap;

use crate::error::SqlError;
use crate::value::SqlValue;

/// Named output values produced by a callable statement, snapshotted after
/// execution so they remain readable while a result cursor is open.
pub type OutputValues = BTreeMap<String, SqlValue>;

/// Binding of one positional parameter. Positions are 1-based, matching the
/// `?` markers in the compiled statement text.
pub trait ParamBinding {
    fn bind(&mut self, index: usize, value: &SqlValue) -> Result<(), SqlError>;
}

/// A connection that can prepare statements.
pub trait Connection {
    fn prepare<'c>(&'c self, sql: &str) -> Result<Box<dyn Statement + 'c>, SqlError>;

    /// Prepare a callable statement (stored procedure / function syntax).
    /// Engines without callable support report [`SqlError::Unsupported`].
    fn prepare_call<'c>(&'c self, sql: &str) -> Result<Box<dyn CallStatement + 'c>, SqlError> {
        let _ = sql;
        Err(SqlError::Unsupported {
            what: "callable statements",
        })
    }

    fn backend_name(&self) -> &'static str;
}

/// A prepared statement with bound parameters.
pub trait Statement: ParamBinding {
    /// Advisory fetch-size hint. Drivers that stream unconditionally ignore it.
    fn set_fetch_size(&mut self, rows: usize) {
        let _ = rows;
    }

    /// Run the statement; `true` means a result set was produced.
    fn execute(&mut self) -> Result<bool, SqlError>;

    /// Run a data-modification statement, returning the affected-row count.
    fn execute_update(&mut self) -> Result<u64, SqlError>;

    /// Run a query and hand back a cursor over its rows. The cursor borrows
    /// the statement mutably until dropped.
    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlError>;

    /// Enqueue the current parameter bindings as one batch row.
    fn add_batch(&mut self) -> Result<(), SqlError>;

    /// Flush enqueued batch rows, returning per-row affected counts.
    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError>;

    /// Discard enqueued batch rows without executing them.
    fn clear_batch(&mut self) -> Result<(), SqlError>;

    /// Reset all positional parameters to unbound.
    fn clear_bindings(&mut self) -> Result<(), SqlError>;
}

/// Forward-only traversal over a result set.
///
/// `advance` must be called before the first row is readable. `columns` and
/// `current` refer to the row most recently advanced to.
pub trait Cursor {
    fn advance(&mut self) -> Result<bool, SqlError>;

    fn columns(&self) -> &[String];

    fn current(&self) -> &[SqlValue];

    /// 1-based index of the current row.
    fn position(&self) -> u64;
}

/// A prepared callable statement. In addition to an optional result set, a
/// call produces named output values.
pub trait CallStatement: ParamBinding {
    fn set_fetch_size(&mut self, rows: usize) {
        let _ = rows;
    }

    /// Run the call for its result set. Outputs are snapshotted before the
    /// cursor is returned.
    fn query_call<'s>(&'s mut self) -> Result<(Box<dyn Cursor + 's>, OutputValues), SqlError>;

    /// Run the call for its outputs only, discarding any result set.
    fn execute_call(&mut self) -> Result<OutputValues, SqlError>;
}

impl std::fmt::Debug for dyn CallStatement + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CallStatement")
    }
}

#[cfg(feature = "backend-sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
