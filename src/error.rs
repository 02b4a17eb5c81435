//! Error types for the query layer.
//!
//! Every fallible operation in this crate returns [`SqlError`]. Template
//! compilation has no failure mode; everything downstream of it (binding,
//! execution, row access, batch flushing) reports through this enum.

use thiserror::Error;

/// Errors produced while binding, executing and reading queries.
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("failed to prepare statement: {message}")]
    Prepare { message: String },

    #[error("failed to bind parameter '{name}' at position {index}: {message}")]
    Bind {
        index: usize,
        name: String,
        message: String,
    },

    #[error("execution failed: {message}")]
    Execute { message: String },

    #[error("driver error: {message}")]
    Driver { message: String },

    #[error("column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A raw accessor hit a database NULL while safe mode was on, or a value
    /// with no natural zero sentinel was NULL with safe mode off.
    #[error("column '{column}' is null")]
    NullColumn { column: String },

    #[error("output parameter '{name}' is null")]
    NullParameter { name: String },

    #[error("missing column '{name}' in result row")]
    MissingColumn { name: String },

    /// A placeholder name from the compiled template has no entry in the
    /// active parameter set. Binding is strict: every placeholder must be
    /// bound before execution.
    #[error("no value bound for parameter '{name}'")]
    MissingParameter { name: String },

    #[error("output parameter '{name}' was not produced by the call")]
    MissingOutput { name: String },

    #[error("column '{column}': cannot decode array of {found} as {expected}")]
    ArrayElement {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Registering a batch trigger would make a batch reachable from itself.
    #[error("batch trigger registration would create a cycle")]
    TriggerCycle,

    #[error("{what} is not supported by this backend")]
    Unsupported { what: &'static str },
}
