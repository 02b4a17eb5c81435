//! One-shot statement invocation.
//!
//! A [`Sql`] owns a compiled template, a parameter set and its execution
//! options. Builders consume and return the value; terminals borrow it, so
//! one configured invocation can run several times with different parameters.
//!
//! Every terminal drives a single cursor pass: prepare, bind, step, and the
//! statement is dropped when the terminal returns. Row-limiting terminals
//! (`single`, `collect_single`) stop stepping after the first row instead of
//! draining the cursor.

use std::collections::BTreeMap;

use tracing::debug;

use crate::backend::Connection;
use crate::binder::bind_statement;
use crate::config;
use crate::error::SqlError;
use crate::row::{OwnedRow, Row, RowAccess};
use crate::template::QueryTemplate;
use crate::value::{ParamSet, SqlValue};

/// A configured statement invocation against one connection.
#[derive(Clone)]
pub struct Sql<'c> {
    conn: &'c dyn Connection,
    template: QueryTemplate,
    params: ParamSet,
    safe_mode: bool,
    page: Option<usize>,
}

impl<'c> Sql<'c> {
    /// Compile `template` and snapshot the process-wide defaults.
    pub fn new(conn: &'c dyn Connection, template: &str) -> Self {
        Self::with_template(conn, QueryTemplate::compile(template))
    }

    pub fn with_template(conn: &'c dyn Connection, template: QueryTemplate) -> Self {
        Self {
            conn,
            template,
            params: ParamSet::new(),
            safe_mode: config::default_safe_mode(),
            page: config::default_page_of(),
        }
    }

    /// Bind one named parameter.
    pub fn on(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Merge a sequence of named parameters.
    pub fn add<N, V>(mut self, pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: AsRef<str>,
        V: Into<SqlValue>,
    {
        self.params.extend(pairs);
        self
    }

    /// Replace the whole parameter set.
    pub fn set_params(mut self, params: ParamSet) -> Self {
        self.params = params;
        self
    }

    /// Override the null-handling policy for this invocation.
    pub fn safe(mut self, enabled: bool) -> Self {
        self.safe_mode = enabled;
        self
    }

    /// Hint the driver to fetch this many rows at a time.
    pub fn with_page_of(mut self, rows: usize) -> Self {
        self.page = Some(rows);
        self
    }

    pub fn with_no_page(mut self) -> Self {
        self.page = None;
        self
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Prepare, bind and step the cursor, handing each row to `visit`.
    /// `visit` returning `Ok(false)` stops the pass early.
    pub(crate) fn run_cursor(
        &self,
        mut visit: impl FnMut(&Row<'_>) -> Result<bool, SqlError>,
    ) -> Result<(), SqlError> {
        debug!(
            backend = self.conn.backend_name(),
            sql = self.template.text(),
            "running query"
        );
        let mut stmt = self.conn.prepare(self.template.text())?;
        if let Some(rows) = self.page {
            stmt.set_fetch_size(rows);
        }
        bind_statement(stmt.as_mut(), self.template.param_names(), &self.params)?;
        let mut cursor = stmt.query()?;
        while cursor.advance()? {
            let row = Row::new(
                cursor.columns(),
                cursor.current(),
                cursor.position(),
                self.safe_mode,
            );
            if !visit(&row)? {
                break;
            }
        }
        Ok(())
    }

    /// Run the statement for its side effects. `true` means it produced a
    /// result set.
    pub fn execute(&self) -> Result<bool, SqlError> {
        debug!(
            backend = self.conn.backend_name(),
            sql = self.template.text(),
            "executing statement"
        );
        let mut stmt = self.conn.prepare(self.template.text())?;
        bind_statement(stmt.as_mut(), self.template.param_names(), &self.params)?;
        stmt.execute()
    }

    /// Run a data-modification statement, returning the affected-row count.
    pub fn execute_update(&self) -> Result<u64, SqlError> {
        debug!(
            backend = self.conn.backend_name(),
            sql = self.template.text(),
            "executing update"
        );
        let mut stmt = self.conn.prepare(self.template.text())?;
        bind_statement(stmt.as_mut(), self.template.param_names(), &self.params)?;
        stmt.execute_update()
    }

    /// Parse every row; rows the parser maps to `None` are skipped.
    pub fn collect<T>(
        &self,
        mut parser: impl FnMut(&Row<'_>) -> Option<T>,
    ) -> Result<Vec<T>, SqlError> {
        let mut out = Vec::new();
        self.run_cursor(|row| {
            if let Some(item) = parser(row) {
                out.push(item);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Step until the parser produces a value, then stop the cursor. Rows
    /// the parser drops do not count as the result.
    pub fn collect_single<T>(
        &self,
        mut parser: impl FnMut(&Row<'_>) -> Option<T>,
    ) -> Result<Option<T>, SqlError> {
        let mut out = None;
        self.run_cursor(|row| {
            out = parser(row);
            Ok(out.is_none())
        })?;
        Ok(out)
    }

    /// All rows as owned snapshots.
    pub fn all(&self) -> Result<Vec<OwnedRow>, SqlError> {
        self.collect(|row| Some(row.to_owned_row()))
    }

    /// The first row as an owned snapshot, if any.
    pub fn single(&self) -> Result<Option<OwnedRow>, SqlError> {
        self.collect_single(|row| Some(row.to_owned_row()))
    }

    pub fn for_each(
        &self,
        mut f: impl FnMut(&Row<'_>) -> Result<(), SqlError>,
    ) -> Result<(), SqlError> {
        self.run_cursor(|row| {
            f(row)?;
            Ok(true)
        })
    }

    /// Build a map keyed by `key`. Rows where either extractor returns `None`
    /// are discarded; a repeated key keeps the later row.
    pub fn index_by<K, V>(
        &self,
        mut key: impl FnMut(&Row<'_>) -> Option<K>,
        mut value: impl FnMut(&Row<'_>) -> Option<V>,
    ) -> Result<BTreeMap<K, V>, SqlError>
    where
        K: Ord,
    {
        let mut out = BTreeMap::new();
        self.run_cursor(|row| {
            if let (Some(k), Some(v)) = (key(row), value(row)) {
                out.insert(k, v);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Like [`index_by`](Self::index_by) but values under the same key
    /// accumulate in row order.
    pub fn group_by<K, V>(
        &self,
        mut key: impl FnMut(&Row<'_>) -> Option<K>,
        mut value: impl FnMut(&Row<'_>) -> Option<V>,
    ) -> Result<BTreeMap<K, Vec<V>>, SqlError>
    where
        K: Ord,
    {
        let mut out: BTreeMap<K, Vec<V>> = BTreeMap::new();
        self.run_cursor(|row| {
            if let (Some(k), Some(v)) = (key(row), value(row)) {
                out.entry(k).or_default().push(v);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Fold the rows into an accumulator in row order.
    pub fn reduce<A>(
        &self,
        init: A,
        mut f: impl FnMut(A, &Row<'_>) -> A,
    ) -> Result<A, SqlError> {
        let mut acc = Some(init);
        self.run_cursor(|row| {
            // The accumulator moves through the fold; the slot is always
            // refilled before the next row.
            if let Some(current) = acc.take() {
                acc = Some(f(current, row));
            }
            Ok(true)
        })?;
        Ok(acc.unwrap_or_else(|| unreachable!("accumulator is always refilled")))
    }
}
