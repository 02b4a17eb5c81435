//! SQLite driver built on `rusqlite`.
//!
//! SQLite streams rows through a stepping cursor whose row handles borrow the
//! statement, so each row is materialized into owned values as the cursor
//! advances. Batching is emulated: enqueued parameter sets are buffered and
//! replayed one `raw_execute` at a time on flush.
//!
//! SQLite has no stored procedures, so callable statements go through the
//! default unsupported path.

use std::path::Path;

use rusqlite::types::{Value, ValueRef};

use crate::backend::{Connection, Cursor, ParamBinding, Statement};
use crate::error::SqlError;
use crate::value::SqlValue;

/// Open a file-backed SQLite database.
pub fn open_file(path: &Path) -> Result<rusqlite::Connection, SqlError> {
    rusqlite::Connection::open(path).map_err(driver_err)
}

/// Open a private in-memory SQLite database.
pub fn open_memory() -> Result<rusqlite::Connection, SqlError> {
    rusqlite::Connection::open_in_memory().map_err(driver_err)
}

fn driver_err(e: rusqlite::Error) -> SqlError {
    SqlError::Driver {
        message: e.to_string(),
    }
}

/// Encode a value into SQLite's storage classes. Temporal values are stored
/// as ISO-8601 text, booleans as 0/1 integers. Timezone-aware instants bind
/// as their date portion only.
fn encode(value: &SqlValue) -> Result<Value, &'static str> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Int(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Decimal(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
        SqlValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::DateTime(dt) => Value::Text(dt.date_naive().format("%Y-%m-%d").to_string()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
        SqlValue::Array(_) => return Err("array parameters"),
    })
}

fn decode(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

struct SqliteStatement<'conn> {
    stmt: rusqlite::Statement<'conn>,
    /// Current bindings by position, `Null` where unbound.
    bound: Vec<Value>,
    /// Parameter sets enqueued by `add_batch`, awaiting a flush.
    buffered: Vec<Vec<Value>>,
}

impl SqliteStatement<'_> {
    fn apply_bindings(&mut self) -> Result<(), SqlError> {
        for (offset, value) in self.bound.iter().enumerate() {
            self.stmt
                .raw_bind_parameter(offset + 1, value)
                .map_err(driver_err)?;
        }
        Ok(())
    }
}

impl ParamBinding for SqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: &SqlValue) -> Result<(), SqlError> {
        let slot = self
            .bound
            .get_mut(index - 1)
            .ok_or_else(|| SqlError::Bind {
                index,
                name: String::new(),
                message: "position out of range".to_string(),
            })?;
        *slot = encode(value).map_err(|what| SqlError::Bind {
            index,
            name: String::new(),
            message: format!("{what} are not supported by sqlite"),
        })?;
        Ok(())
    }
}

impl Statement for SqliteStatement<'_> {
    fn execute(&mut self) -> Result<bool, SqlError> {
        self.apply_bindings()?;
        if self.stmt.column_count() > 0 {
            // A query statement only runs when stepped.
            let mut rows = self.stmt.raw_query();
            rows.next().map_err(driver_err)?;
            Ok(true)
        } else {
            self.stmt.raw_execute().map_err(driver_err)?;
            Ok(false)
        }
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        self.apply_bindings()?;
        let changed = self.stmt.raw_execute().map_err(driver_err)?;
        Ok(changed as u64)
    }

    fn query<'s>(&'s mut self) -> Result<Box<dyn Cursor + 's>, SqlError> {
        self.apply_bindings()?;
        let columns: Vec<String> = self
            .stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = self.stmt.raw_query();
        Ok(Box::new(SqliteCursor {
            rows,
            columns,
            current: Vec::new(),
            position: 0,
        }))
    }

    fn add_batch(&mut self) -> Result<(), SqlError> {
        self.buffered.push(self.bound.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<u64>, SqlError> {
        let pending = std::mem::take(&mut self.buffered);
        let mut counts = Vec::with_capacity(pending.len());
        for set in pending {
            for (offset, value) in set.iter().enumerate() {
                self.stmt
                    .raw_bind_parameter(offset + 1, value)
                    .map_err(driver_err)?;
            }
            let changed = self.stmt.raw_execute().map_err(driver_err)?;
            counts.push(changed as u64);
        }
        Ok(counts)
    }

    fn clear_batch(&mut self) -> Result<(), SqlError> {
        self.buffered.clear();
        Ok(())
    }

    fn clear_bindings(&mut self) -> Result<(), SqlError> {
        for slot in &mut self.bound {
            *slot = Value::Null;
        }
        // Overwrite any values the engine still holds from the last run.
        self.apply_bindings()
    }
}

struct SqliteCursor<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    columns: Vec<String>,
    current: Vec<SqlValue>,
    position: u64,
}

impl Cursor for SqliteCursor<'_> {
    fn advance(&mut self) -> Result<bool, SqlError> {
        match self.rows.next().map_err(driver_err)? {
            Some(row) => {
                self.current.clear();
                for i in 0..self.columns.len() {
                    let value = row.get_ref(i).map_err(driver_err)?;
                    self.current.push(decode(value));
                }
                self.position += 1;
                Ok(true)
            }
            None => Ok(false),
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

impl Connection for rusqlite::Connection {
    fn prepare<'c>(&'c self, sql: &str) -> Result<Box<dyn Statement + 'c>, SqlError> {
        let stmt = rusqlite::Connection::prepare(self, sql).map_err(|e| SqlError::Prepare {
            message: e.to_string(),
        })?;
        let param_count = stmt.parameter_count();
        Ok(Box::new(SqliteStatement {
            stmt,
            bound: vec![Value::Null; param_count],
            buffered: Vec::new(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> rusqlite::Connection {
        let c = open_memory().unwrap();
        c.execute_batch("create table t (id integer primary key, name text, score real)")
            .unwrap();
        c
    }

    #[test]
    fn execute_update_reports_affected_rows() {
        let c = conn();
        let mut stmt = Connection::prepare(&c, "insert into t (name, score) values (?, ?)").unwrap();
        stmt.bind(1, &SqlValue::Text("a".to_string())).unwrap();
        stmt.bind(2, &SqlValue::Float(1.5)).unwrap();
        assert_eq!(stmt.execute_update().unwrap(), 1);
    }

    #[test]
    fn cursor_materializes_rows() {
        let c = conn();
        c.execute_batch("insert into t (name, score) values ('a', 1.0), ('b', 2.0)")
            .unwrap();
        let mut stmt = Connection::prepare(&c, "select name, score from t order by id").unwrap();
        let mut cursor = stmt.query().unwrap();

        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.columns(), &["name", "score"]);
        assert_eq!(cursor.current()[0], SqlValue::Text("a".to_string()));
        assert_eq!(cursor.position(), 1);

        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.current()[1], SqlValue::Float(2.0));
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn batch_replays_buffered_sets() {
        let c = conn();
        let mut stmt = Connection::prepare(&c, "insert into t (name) values (?)").unwrap();
        for name in ["x", "y", "z"] {
            stmt.bind(1, &SqlValue::Text(name.to_string())).unwrap();
            stmt.add_batch().unwrap();
        }
        assert_eq!(stmt.execute_batch().unwrap(), vec![1, 1, 1]);
        // Buffer is consumed by the flush.
        assert!(stmt.execute_batch().unwrap().is_empty());
    }

    #[test]
    fn temporal_values_round_trip_as_text() {
        let c = conn();
        c.execute_batch("create table d (v text)").unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut stmt = Connection::prepare(&c, "insert into d (v) values (?)").unwrap();
        stmt.bind(1, &SqlValue::Date(day)).unwrap();
        stmt.execute_update().unwrap();

        let mut stmt = Connection::prepare(&c, "select v from d").unwrap();
        let mut cursor = stmt.query().unwrap();
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.current()[0].as_date(), Some(day));
    }

    #[test]
    fn array_parameters_are_rejected() {
        let c = conn();
        let mut stmt = Connection::prepare(&c, "select ?").unwrap();
        let err = stmt.bind(1, &SqlValue::Array(vec![])).unwrap_err();
        assert!(matches!(err, SqlError::Bind { .. }));
    }

    #[test]
    fn callable_statements_are_unsupported() {
        let c = conn();
        let err = c.prepare_call("call p()").unwrap_err();
        assert!(matches!(err, SqlError::Unsupported { .. }));
    }
}
