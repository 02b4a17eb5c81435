//! Scriptable in-memory driver for tests.
//!
//! A [`MockConnection`] is configured up front with the result set, output
//! values and update count every prepared statement will report, and records
//! everything the query layer asks of it: prepared SQL, individual binds and
//! batch flushes. Tests assert against the recorded log.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;

use crate::backend::{CallStatement, Connection, Cursor, OutputValues, ParamBinding, Statement};
use crate::error::SqlError;
use crate::value::SqlValue;

/// Everything observed by the mock since construction.
#[derive(Debug, Default)]
pub struct MockLog {
    /// SQL text of every prepared statement, in order.
    pub prepared: Vec<String>,
    /// Every bind as `(sql, position, value)`.
    pub binds: Vec<(String, usize, SqlValue)>,
    /// Every successful batch flush as `(sql, rows_flushed)`.
    pub flushes: Vec<(String, usize)>,
    /// Every fetch-size hint as `(sql, rows)`.
    pub fetch_hints: Vec<(String, usize)>,
}

#[derive(Debug, Default)]
pub struct MockConnection {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    outputs: OutputValues,
    update_count: u64,
    fail_flush_containing: Option<String>,
    log: RefCell<MockLog>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result set every query will return.
    pub fn with_rows(
        mut self,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.rows = rows;
        self
    }

    /// Script the named outputs every call will produce.
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = (&'static str, SqlValue)>) -> Self {
        self.outputs = outputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self
    }

    pub fn with_update_count(mut self, count: u64) -> Self {
        self.update_count = count;
        self
    }

    /// Make batch flushes fail for statements whose SQL contains `marker`.
    pub fn fail_batch_flush_containing(mut self, marker: &str) -> Self {
        self.fail_flush_containing = Some(marker.to_string());
        self
    }

    pub fn log(&self) -> Ref<'_, MockLog> {
        self.log.borrow()
    }
}

impl Connection for MockConnection {
    fn prepare<'c>(&'c self, sql: &str) -> Result<Box<dyn Statement + 'c>, SqlError> {
        self.log.borrow_mut().prepared.push(sql.to_string());
        Ok(Box::new(MockStatement {
            conn: self,
            sql: sql.to_string(),
            bound: BTreeMap::new(),
            pending: 0,
        }))
    }

    fn prepare_call<'c>(&'c self, sql: &str) -> Result<Box<dyn CallStatement + 'c>, SqlError> {
        self.log.borrow_mut().prepared.push(sql.to_string());
        Ok(Box::new(MockCall {
            conn: self,
            sql: sql.to_string(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

struct MockStatement<'c> {
    conn: &'c MockConnection,
    sql: String,
    bound: BTreeMap<usize, SqlValue>,
    pending: usize,
}

impl ParamBinding for MockStatement<'_> {
    fn bind(&mut self, index: usize, value: &SqlValue) -> Result<(), SqlError> {
        self.conn
            .log
            .borrow_mut()
            .binds
            .push((self.sql.clone(), index, value.clone()));
        self.bound.insert(index, value.clone());
        Ok(())
    }
}

impl Statement for MockStatement<'_> {
    fn set_fetch_size(&mut self, rows: usize) {
        self.conn
            .log
            .borrow_mut()
            .fetch_hints
            .push((self.sql.clone(), rows));
    }

    fn execute(&mut self) -> Result<bool, SqlError> {
        Ok(!self.conn.columns.is_empty())
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        Ok(self.conn.update_count)
    }

    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlError> {
        Ok(Box::new(MockCursor {
            columns: self.conn.columns.clone(),
            rows: self.conn.rows.clone(),
            current: Vec::new(),
            position: 0,
        }))
    }

    fn add_batch(&mut self) -> Result<(), SqlError> {
        self.pending += 1;
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        if let Some(marker) = &self.conn.fail_flush_containing
            && self.sql.contains(marker.as_str())
        {
            return Err(SqlError::Execute {
                message: format!("scripted batch failure for '{}'", self.sql),
            });
        }
        let flushed = self.pending;
        self.pending = 0;
        self.conn
            .log
            .borrow_mut()
            .flushes
            .push((self.sql.clone(), flushed));
        Ok(vec![1; flushed])
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.pending = 0;
        Ok(())
    }

    fn clear_bindings(&mut self) -> Result<(), SqlError> {
        self.bound.clear();
        Ok(())
    }
}

struct MockCall<'c> {
    conn: &'c MockConnection,
    sql: String,
}

impl ParamBinding for MockCall<'_> {
    fn bind(&mut self, index: usize, value: &SqlValue) -> Result<(), SqlError> {
        self.conn
            .log
            .borrow_mut()
            .binds
            .push((self.sql.clone(), index, value.clone()));
        Ok(())
    }
}

impl CallStatement for MockCall<'_> {
    fn set_fetch_size(&mut self, rows: usize) {
        self.conn
            .log
            .borrow_mut()
            .fetch_hints
            .push((self.sql.clone(), rows));
    }

    fn query_call<'s>(&'s mut self) -> Result<(Box<dyn Cursor + 's>, OutputValues), SqlError> {
        let cursor = MockCursor {
            columns: self.conn.columns.clone(),
            rows: self.conn.rows.clone(),
            current: Vec::new(),
            position: 0,
        };
        Ok((Box::new(cursor), self.conn.outputs.clone()))
    }

    fn execute_call(&mut self) -> Result<OutputValues, SqlError> {
        Ok(self.conn.outputs.clone())
    }
}

struct MockCursor {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    current: Vec<SqlValue>,
    position: u64,
}

impl Cursor for MockCursor {
    fn advance(&mut self) -> Result<bool, SqlError> {
        if (self.position as usize) < self.rows.len() {
            self.current = self.rows[self.position as usize].clone();
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn current(&self) -> &[SqlValue] {
        &self.current
    }

    fn position(&self) -> u64 {
        self.position
    }
}
