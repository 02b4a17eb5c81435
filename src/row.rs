//! Typed access to result rows.
//!
//! # Null handling
//!
//! Raw accessors (`get_*`) follow the row's safe-mode flag:
//!
//! - safe mode **off**: database NULL comes back as the type's zero sentinel
//!   (`0`, `0.0`, `false`, `""`, empty blob, empty array);
//! - safe mode **on**: database NULL is [`SqlError::NullColumn`].
//!
//! Temporal and decimal values have no meaningful zero sentinel, so their raw
//! accessors report NULL as an error in either mode.
//!
//! Optional accessors (`opt_*`) are the null-aware path: NULL is `Ok(None)`
//! regardless of safe mode, while a missing column or a type mismatch is an
//! error rather than a silent `None`.
//!
//! Column lookup tries an exact name match first, then falls back to a
//! case-insensitive scan. `is_present` probes the column metadata only and
//! never errors.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::SqlError;
use crate::value::{FromSqlValue, SqlValue};

fn mismatch(column: &str, expected: &'static str, found: &SqlValue) -> SqlError {
    SqlError::TypeMismatch {
        column: column.to_string(),
        expected,
        found: found.kind(),
    }
}

fn null_column(column: &str) -> SqlError {
    SqlError::NullColumn {
        column: column.to_string(),
    }
}

/// Column access shared by live rows, owned row snapshots and call rows.
pub trait RowAccess {
    fn columns(&self) -> &[String];

    fn value_at(&self, index: usize) -> Option<&SqlValue>;

    fn safe_mode(&self) -> bool;

    /// 1-based index of this row within its result set.
    fn position(&self) -> u64;

    /// Resolve a column by name: exact match first, then case-insensitive.
    fn lookup(&self, name: &str) -> Result<&SqlValue, SqlError> {
        let columns = self.columns();
        let index = columns
            .iter()
            .position(|c| c == name)
            .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)));
        index
            .and_then(|i| self.value_at(i))
            .ok_or_else(|| SqlError::MissingColumn {
                name: name.to_string(),
            })
    }

    /// Whether the result set has a column under this name, case-insensitive.
    /// Metadata only: a column holding NULL still counts. Never errors.
    fn is_present(&self, name: &str) -> bool {
        self.columns().iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn get_str(&self, name: &str) -> Result<String, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(String::new())
            };
        }
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(name, "text", v))
    }

    /// Large text columns read through the same path as ordinary text.
    fn get_clob(&self, name: &str) -> Result<String, SqlError> {
        self.get_str(name)
    }

    fn get_i32(&self, name: &str) -> Result<i32, SqlError> {
        let wide = self.get_i64(name)?;
        i32::try_from(wide).map_err(|_| SqlError::TypeMismatch {
            column: name.to_string(),
            expected: "i32",
            found: "int",
        })
    }

    fn get_i64(&self, name: &str) -> Result<i64, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(0)
            };
        }
        v.as_i64().ok_or_else(|| mismatch(name, "int", v))
    }

    fn get_f32(&self, name: &str) -> Result<f32, SqlError> {
        self.get_f64(name).map(|v| v as f32)
    }

    fn get_f64(&self, name: &str) -> Result<f64, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(0.0)
            };
        }
        v.as_f64().ok_or_else(|| mismatch(name, "float", v))
    }

    fn get_bool(&self, name: &str) -> Result<bool, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(false)
            };
        }
        v.as_bool().ok_or_else(|| mismatch(name, "bool", v))
    }

    /// Lexical decimal form. NULL is an error in either mode; there is no
    /// meaningful zero sentinel for arbitrary-precision values.
    fn get_decimal(&self, name: &str) -> Result<String, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_column(name));
        }
        v.as_decimal().ok_or_else(|| mismatch(name, "decimal", v))
    }

    fn get_date(&self, name: &str) -> Result<NaiveDate, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_column(name));
        }
        v.as_date().ok_or_else(|| mismatch(name, "date", v))
    }

    fn get_time(&self, name: &str) -> Result<NaiveTime, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_column(name));
        }
        v.as_time().ok_or_else(|| mismatch(name, "time", v))
    }

    fn get_timestamp(&self, name: &str) -> Result<NaiveDateTime, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_column(name));
        }
        v.as_timestamp()
            .ok_or_else(|| mismatch(name, "timestamp", v))
    }

    /// Timezone-aware instant; date-only and naive-timestamp columns are
    /// interpreted as UTC.
    fn get_datetime(&self, name: &str) -> Result<DateTime<Utc>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_column(name));
        }
        v.as_datetime()
            .ok_or_else(|| mismatch(name, "datetime", v))
    }

    fn get_blob(&self, name: &str) -> Result<Vec<u8>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(Vec::new())
            };
        }
        v.as_blob().map(<[u8]>::to_vec).ok_or_else(|| mismatch(name, "blob", v))
    }

    /// The raw value, NULL included.
    fn get_value(&self, name: &str) -> Result<SqlValue, SqlError> {
        self.lookup(name).cloned()
    }

    /// Decode an array column into a typed vector. NULL decodes as empty; an
    /// element outside the requested family is [`SqlError::ArrayElement`].
    fn get_array<T: FromSqlValue>(&self, name: &str) -> Result<Vec<T>, SqlError>
    where
        Self: Sized,
    {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode() {
                Err(null_column(name))
            } else {
                Ok(Vec::new())
            };
        }
        let items = v.as_array().ok_or_else(|| mismatch(name, "array", v))?;
        items
            .iter()
            .map(|item| {
                T::from_value(item).ok_or_else(|| SqlError::ArrayElement {
                    column: name.to_string(),
                    expected: T::FAMILY,
                    found: item.kind(),
                })
            })
            .collect()
    }

    fn opt_str(&self, name: &str) -> Result<Option<String>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| mismatch(name, "text", v))
    }

    fn opt_clob(&self, name: &str) -> Result<Option<String>, SqlError> {
        self.opt_str(name)
    }

    fn opt_i32(&self, name: &str) -> Result<Option<i32>, SqlError> {
        match self.opt_i64(name)? {
            None => Ok(None),
            Some(wide) => i32::try_from(wide).map(Some).map_err(|_| SqlError::TypeMismatch {
                column: name.to_string(),
                expected: "i32",
                found: "int",
            }),
        }
    }

    fn opt_i64(&self, name: &str) -> Result<Option<i64>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_i64().map(Some).ok_or_else(|| mismatch(name, "int", v))
    }

    fn opt_f32(&self, name: &str) -> Result<Option<f32>, SqlError> {
        Ok(self.opt_f64(name)?.map(|v| v as f32))
    }

    fn opt_f64(&self, name: &str) -> Result<Option<f64>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_f64()
            .map(Some)
            .ok_or_else(|| mismatch(name, "float", v))
    }

    fn opt_bool(&self, name: &str) -> Result<Option<bool>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_bool()
            .map(Some)
            .ok_or_else(|| mismatch(name, "bool", v))
    }

    fn opt_decimal(&self, name: &str) -> Result<Option<String>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_decimal()
            .map(Some)
            .ok_or_else(|| mismatch(name, "decimal", v))
    }

    fn opt_date(&self, name: &str) -> Result<Option<NaiveDate>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_date()
            .map(Some)
            .ok_or_else(|| mismatch(name, "date", v))
    }

    fn opt_time(&self, name: &str) -> Result<Option<NaiveTime>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_time()
            .map(Some)
            .ok_or_else(|| mismatch(name, "time", v))
    }

    fn opt_timestamp(&self, name: &str) -> Result<Option<NaiveDateTime>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_timestamp()
            .map(Some)
            .ok_or_else(|| mismatch(name, "timestamp", v))
    }

    fn opt_datetime(&self, name: &str) -> Result<Option<DateTime<Utc>>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_datetime()
            .map(Some)
            .ok_or_else(|| mismatch(name, "datetime", v))
    }

    fn opt_blob(&self, name: &str) -> Result<Option<Vec<u8>>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_blob()
            .map(|b| Some(b.to_vec()))
            .ok_or_else(|| mismatch(name, "blob", v))
    }

    /// Render a temporal column through a `chrono` format string.
    fn formatted_date(&self, name: &str, format: &str) -> Result<String, SqlError> {
        let instant = self.get_datetime(name)?;
        Ok(instant.format(format).to_string())
    }

    fn opt_formatted_date(&self, name: &str, format: &str) -> Result<Option<String>, SqlError> {
        Ok(self
            .opt_datetime(name)?
            .map(|instant| instant.format(format).to_string()))
    }

    /// The row as a name-to-value map. Later duplicate column names win.
    fn as_map(&self) -> BTreeMap<String, SqlValue> {
        self.columns()
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                self.value_at(i).map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// The row as `(name, value)` pairs in column order, duplicates kept.
    fn as_list(&self) -> Vec<(String, SqlValue)> {
        self.columns()
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                self.value_at(i).map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Snapshot the row into an owned form that outlives the cursor.
    fn to_owned_row(&self) -> OwnedRow {
        OwnedRow {
            columns: self.columns().to_vec(),
            values: (0..self.columns().len())
                .filter_map(|i| self.value_at(i).cloned())
                .collect(),
            position: self.position(),
            safe_mode: self.safe_mode(),
        }
    }
}

/// A live row borrowed from an open cursor. Valid only until the cursor
/// advances; snapshot with [`RowAccess::to_owned_row`] to keep it.
#[derive(Debug)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
    position: u64,
    safe_mode: bool,
}

impl<'a> Row<'a> {
    pub(crate) fn new(
        columns: &'a [String],
        values: &'a [SqlValue],
        position: u64,
        safe_mode: bool,
    ) -> Self {
        Self {
            columns,
            values,
            position,
            safe_mode,
        }
    }
}

impl RowAccess for Row<'_> {
    fn columns(&self) -> &[String] {
        self.columns
    }

    fn value_at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// An owned row snapshot, detached from any cursor.
#[derive(Clone, Debug)]
pub struct OwnedRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
    position: u64,
    safe_mode: bool,
}

impl RowAccess for OwnedRow {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn value_at(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    fn position(&self) -> u64 {
        self.position
    }
}
