//! Callable statement invocation.
//!
//! A [`Call`] runs stored-procedure syntax through the same template and
//! binding machinery as [`Sql`](crate::Sql). Besides an optional result set,
//! a call produces named output values, surfaced as an [`Outputs`] snapshot.
//! While a result cursor is open, each row is handed to the visitor as a
//! [`CallRow`] so parsers can read columns and outputs together.
//!
//! Output accessors follow the same null policy as row accessors, reporting
//! [`SqlError::NullParameter`] instead of `NullColumn`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;

use crate::backend::{Connection, OutputValues};
use crate::binder::bind_statement;
use crate::config;
use crate::error::SqlError;
use crate::row::{Row, RowAccess};
use crate::template::QueryTemplate;
use crate::value::{ParamSet, SqlValue};

/// A configured callable-statement invocation.
#[derive(Clone)]
pub struct Call<'c> {
    conn: &'c dyn Connection,
    template: QueryTemplate,
    params: ParamSet,
    safe_mode: bool,
    page: Option<usize>,
}

impl<'c> Call<'c> {
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

    pub fn with_page_of(mut self, rows: usize) -> Self {
        self.page = Some(rows);
        self
    }

    fn run_call(
        &self,
        mut visit: impl FnMut(&CallRow<'_>) -> Result<bool, SqlError>,
    ) -> Result<Outputs, SqlError> {
        debug!(
            backend = self.conn.backend_name(),
            sql = self.template.text(),
            "running call"
        );
        let mut stmt = self.conn.prepare_call(self.template.text())?;
        if let Some(rows) = self.page {
            stmt.set_fetch_size(rows);
        }
        bind_statement(stmt.as_mut(), self.template.param_names(), &self.params)?;
        let (mut cursor, values) = stmt.query_call()?;
        let outputs = Outputs {
            values,
            safe_mode: self.safe_mode,
        };
        while cursor.advance()? {
            let row = Row::new(
                cursor.columns(),
                cursor.current(),
                cursor.position(),
                self.safe_mode,
            );
            let call_row = CallRow {
                row,
                outputs: &outputs,
            };
            if !visit(&call_row)? {
                break;
            }
        }
        Ok(outputs)
    }

    /// Run the call for its outputs only, discarding any result set.
    pub fn outputs(&self) -> Result<Outputs, SqlError> {
        debug!(
            backend = self.conn.backend_name(),
            sql = self.template.text(),
            "executing call"
        );
        let mut stmt = self.conn.prepare_call(self.template.text())?;
        bind_statement(stmt.as_mut(), self.template.param_names(), &self.params)?;
        let values = stmt.execute_call()?;
        Ok(Outputs {
            values,
            safe_mode: self.safe_mode,
        })
    }

    /// Parse every result row; rows the parser maps to `None` are skipped.
    /// The outputs snapshot comes back alongside the parsed rows.
    pub fn collect<T>(
        &self,
        mut parser: impl FnMut(&CallRow<'_>) -> Option<T>,
    ) -> Result<(Vec<T>, Outputs), SqlError> {
        let mut out = Vec::new();
        let outputs = self.run_call(|row| {
            if let Some(item) = parser(row) {
                out.push(item);
            }
            Ok(true)
        })?;
        Ok((out, outputs))
    }

    /// Step until the parser produces a value, then stop the cursor.
    pub fn collect_single<T>(
        &self,
        mut parser: impl FnMut(&CallRow<'_>) -> Option<T>,
    ) -> Result<(Option<T>, Outputs), SqlError> {
        let mut out = None;
        let outputs = self.run_call(|row| {
            out = parser(row);
            Ok(out.is_none())
        })?;
        Ok((out, outputs))
    }

    pub fn for_each(
        &self,
        mut f: impl FnMut(&CallRow<'_>) -> Result<(), SqlError>,
    ) -> Result<Outputs, SqlError> {
        self.run_call(|row| {
            f(row)?;
            Ok(true)
        })
    }
}

fn null_output(name: &str) -> SqlError {
    SqlError::NullParameter {
        name: name.to_string(),
    }
}

fn output_mismatch(name: &str, expected: &'static str, found: &SqlValue) -> SqlError {
    SqlError::TypeMismatch {
        column: name.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Named output values snapshotted from one call execution.
#[derive(Clone, Debug)]
pub struct Outputs {
    values: OutputValues,
    safe_mode: bool,
}

impl Outputs {
    fn lookup(&self, name: &str) -> Result<&SqlValue, SqlError> {
        self.values
            .get(name)
            .or_else(|| {
                self.values
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .ok_or_else(|| SqlError::MissingOutput {
                name: name.to_string(),
            })
    }

    /// Whether the call produced an output under this name, case-insensitive.
    /// Metadata only: a NULL output still counts. Never errors.
    pub fn is_present(&self, name: &str) -> bool {
        self.values.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    pub fn output_str(&self, name: &str) -> Result<String, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode {
                Err(null_output(name))
            } else {
                Ok(String::new())
            };
        }
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| output_mismatch(name, "text", v))
    }

    pub fn output_clob(&self, name: &str) -> Result<String, SqlError> {
        self.output_str(name)
    }

    pub fn output_i32(&self, name: &str) -> Result<i32, SqlError> {
        let wide = self.output_i64(name)?;
        i32::try_from(wide).map_err(|_| SqlError::TypeMismatch {
            column: name.to_string(),
            expected: "i32",
            found: "int",
        })
    }

    pub fn output_i64(&self, name: &str) -> Result<i64, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode {
                Err(null_output(name))
            } else {
                Ok(0)
            };
        }
        v.as_i64().ok_or_else(|| output_mismatch(name, "int", v))
    }

    pub fn output_f32(&self, name: &str) -> Result<f32, SqlError> {
        self.output_f64(name).map(|v| v as f32)
    }

    pub fn output_f64(&self, name: &str) -> Result<f64, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode {
                Err(null_output(name))
            } else {
                Ok(0.0)
            };
        }
        v.as_f64().ok_or_else(|| output_mismatch(name, "float", v))
    }

    pub fn output_bool(&self, name: &str) -> Result<bool, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode {
                Err(null_output(name))
            } else {
                Ok(false)
            };
        }
        v.as_bool().ok_or_else(|| output_mismatch(name, "bool", v))
    }

    /// NULL is an error in either mode; decimals have no zero sentinel.
    pub fn output_decimal(&self, name: &str) -> Result<String, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_output(name));
        }
        v.as_decimal()
            .ok_or_else(|| output_mismatch(name, "decimal", v))
    }

    pub fn output_date(&self, name: &str) -> Result<NaiveDate, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_output(name));
        }
        v.as_date().ok_or_else(|| output_mismatch(name, "date", v))
    }

    pub fn output_time(&self, name: &str) -> Result<NaiveTime, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_output(name));
        }
        v.as_time().ok_or_else(|| output_mismatch(name, "time", v))
    }

    pub fn output_timestamp(&self, name: &str) -> Result<NaiveDateTime, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_output(name));
        }
        v.as_timestamp()
            .ok_or_else(|| output_mismatch(name, "timestamp", v))
    }

    pub fn output_datetime(&self, name: &str) -> Result<DateTime<Utc>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Err(null_output(name));
        }
        v.as_datetime()
            .ok_or_else(|| output_mismatch(name, "datetime", v))
    }

    pub fn output_blob(&self, name: &str) -> Result<Vec<u8>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return if self.safe_mode {
                Err(null_output(name))
            } else {
                Ok(Vec::new())
            };
        }
        v.as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| output_mismatch(name, "blob", v))
    }

    /// The raw value, NULL included.
    pub fn output_value(&self, name: &str) -> Result<SqlValue, SqlError> {
        self.lookup(name).cloned()
    }

    /// The output instant shifted into the given UTC offset.
    pub fn output_timestamp_at(
        &self,
        name: &str,
        offset: FixedOffset,
    ) -> Result<DateTime<FixedOffset>, SqlError> {
        Ok(self.output_datetime(name)?.with_timezone(&offset))
    }

    /// The calendar date of the output instant in the given UTC offset.
    pub fn output_date_at(&self, name: &str, offset: FixedOffset) -> Result<NaiveDate, SqlError> {
        Ok(self.output_timestamp_at(name, offset)?.date_naive())
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<String>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| output_mismatch(name, "text", v))
    }

    pub fn opt_clob(&self, name: &str) -> Result<Option<String>, SqlError> {
        self.opt_str(name)
    }

    pub fn opt_i32(&self, name: &str) -> Result<Option<i32>, SqlError> {
        match self.opt_i64(name)? {
            None => Ok(None),
            Some(wide) => i32::try_from(wide).map(Some).map_err(|_| SqlError::TypeMismatch {
                column: name.to_string(),
                expected: "i32",
                found: "int",
            }),
        }
    }

    pub fn opt_i64(&self, name: &str) -> Result<Option<i64>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_i64()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "int", v))
    }

    pub fn opt_f32(&self, name: &str) -> Result<Option<f32>, SqlError> {
        Ok(self.opt_f64(name)?.map(|v| v as f32))
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_f64()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "float", v))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_bool()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "bool", v))
    }

    pub fn opt_decimal(&self, name: &str) -> Result<Option<String>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_decimal()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "decimal", v))
    }

    pub fn opt_date(&self, name: &str) -> Result<Option<NaiveDate>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_date()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "date", v))
    }

    pub fn opt_time(&self, name: &str) -> Result<Option<NaiveTime>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_time()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "time", v))
    }

    pub fn opt_timestamp(&self, name: &str) -> Result<Option<NaiveDateTime>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_timestamp()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "timestamp", v))
    }

    pub fn opt_datetime(&self, name: &str) -> Result<Option<DateTime<Utc>>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_datetime()
            .map(Some)
            .ok_or_else(|| output_mismatch(name, "datetime", v))
    }

    pub fn opt_blob(&self, name: &str) -> Result<Option<Vec<u8>>, SqlError> {
        let v = self.lookup(name)?;
        if v.is_null() {
            return Ok(None);
        }
        v.as_blob()
            .map(|b| Some(b.to_vec()))
            .ok_or_else(|| output_mismatch(name, "blob", v))
    }
}

/// One result row of a call, with the call's outputs alongside.
pub struct CallRow<'a> {
    row: Row<'a>,
    outputs: &'a Outputs,
}

impl CallRow<'_> {
    pub fn outputs(&self) -> &Outputs {
        self.outputs
    }
}

impl RowAccess for CallRow<'_> {
    fn columns(&self) -> &[String] {
        self.row.columns()
    }

    fn value_at(&self, index: usize) -> Option<&SqlValue> {
        self.row.value_at(index)
    }

    fn safe_mode(&self) -> bool {
        self.row.safe_mode()
    }

    fn position(&self) -> u64 {
        self.row.position()
    }
}
