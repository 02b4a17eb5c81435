//! Named-parameter SQL execution layer.
//!
//! Statements are written with `{name}` placeholders instead of positional
//! markers; the layer compiles them to driver-native `?` markers, binds named
//! values in template order, and gives typed access to result rows:
//!
//! ```no_run
//! use namedsql::{Sql, RowAccess, backend::sqlite};
//!
//! # fn demo() -> Result<(), namedsql::SqlError> {
//! let conn = sqlite::open_memory()?;
//! let adults = Sql::new(&conn, "select name from persons where age > {low} and age < {high}")
//!     .on("low", 18i64)
//!     .on("high", 100i64)
//!     .collect(|row| row.get_str("name").ok())?;
//! # Ok(())
//! # }
//! ```
//!
//! The main entry points:
//!
//! - [`Sql`]: one-shot statements with eager terminals (`collect`, `all`,
//!   `execute_update`, `index_by`, ...);
//! - [`Stream`]: lazy fused pipelines over a query's rows, built from a
//!   [`Sql`] via `stream`/`map`/`filter`;
//! - [`Call`]: callable statements with named [`Outputs`];
//! - [`Batch`]: accumulated execution with auto-flush thresholds and
//!   dependency-ordered flushing.
//!
//! Drivers plug in through the traits in [`backend`]; the bundled SQLite
//! driver is enabled by the default `backend-sqlite` feature.

pub mod backend;
mod batch;
mod binder;
mod call;
mod config;
mod error;
mod row;
mod sql;
mod stream;
mod template;
mod value;

pub use batch::Batch;
pub use call::{Call, CallRow, Outputs};
pub use config::{global_page_of, global_safe_mode};
pub use error::SqlError;
pub use row::{OwnedRow, Row, RowAccess};
pub use sql::Sql;
pub use stream::Stream;
pub use template::QueryTemplate;
pub use value::{FromSqlValue, ParamSet, SqlValue};

use backend::Connection;

/// Start a one-shot statement invocation.
pub fn sql<'c>(conn: &'c dyn Connection, template: &str) -> Sql<'c> {
    Sql::new(conn, template)
}

/// Start a callable statement invocation.
pub fn call<'c>(conn: &'c dyn Connection, template: &str) -> Call<'c> {
    Call::new(conn, template)
}

/// Prepare a batch with no auto-flush threshold.
pub fn batch<'c>(conn: &'c dyn Connection, template: &str) -> Result<Batch<'c>, SqlError> {
    Batch::new(conn, template)
}

/// Prepare a batch that auto-flushes every `threshold` enqueued sets.
pub fn batch_of<'c>(
    conn: &'c dyn Connection,
    template: &str,
    threshold: u32,
) -> Result<Batch<'c>, SqlError> {
    Batch::with_threshold(conn, template, threshold)
}
