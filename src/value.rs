//! Tagged value type shared by parameter binding and row access.
//!
//! # Type Decisions
//!
//! **Why a closed enum instead of trait-object values?**
//! Binding and row extraction both dispatch on the value's runtime shape.
//! A closed enum makes that dispatch an exhaustive match: adding a database
//! type means the compiler points at every site that must handle it, and an
//! unsupported type is a compile error rather than a silent fallback.
//!
//! **Why `i64`/`f64` only?**
//! Drivers hand integers back at full width. Carrying a single `Int(i64)` and
//! `Float(f64)` avoids lossy conversions inside the value model; narrower
//! accessors (`get_i32`, `get_f32`) perform checked conversion at the edge.
//!
//! **Why `Decimal(String)`?**
//! Arbitrary-precision decimals are carried in lexical form and interpretation
//! is left to the caller. None of the supported backends has a native decimal
//! wire type, so a numeric crate would only add a lossy round-trip.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// A single database value, either bound as a parameter or read from a row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision decimal in lexical form.
    Decimal(String),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// Timezone-aware instant. Binds as its date portion only.
    DateTime(DateTime<Utc>),
    Blob(Vec<u8>),
    Array(Vec<SqlValue>),
}

impl SqlValue {
    /// Type name for error messages and introspection.
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Text(_) => "text",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Bool(_) => "bool",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Blob(_) => "blob",
            SqlValue::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Extract as a string slice if the value is string-like.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) | SqlValue::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Booleans also accept 0/1 integers, since several engines store
    /// booleans as integer columns.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Lexical decimal form. Numeric values render through their display
    /// representation; text passes through unchanged.
    pub fn as_decimal(&self) -> Option<String> {
        match self {
            SqlValue::Decimal(s) | SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// Calendar date. Text columns are parsed as ISO `YYYY-MM-DD`; timestamp
    /// shaped values contribute their date portion.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::Timestamp(ts) => Some(ts.date()),
            SqlValue::DateTime(dt) => Some(dt.date_naive()),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            SqlValue::Time(t) => Some(*t),
            SqlValue::Timestamp(ts) => Some(ts.time()),
            SqlValue::Text(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .ok(),
            _ => None,
        }
    }

    /// Naive timestamp. Text columns accept both `T` and space separators,
    /// with or without fractional seconds.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(ts) => Some(*ts),
            SqlValue::DateTime(dt) => Some(dt.naive_utc()),
            SqlValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            SqlValue::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    /// Timezone-aware instant; naive timestamps are interpreted as UTC.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            SqlValue::DateTime(dt) => Some(*dt),
            other => other.as_timestamp().map(|ts| Utc.from_utc_datetime(&ts)),
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[SqlValue]> {
        match self {
            SqlValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Named parameter values for one query invocation or batch row.
///
/// Keys are trimmed on insertion and compared case-sensitively. The set is
/// owned by exactly one invocation object; `set` operations replace it
/// wholesale, `add`/`on` operations merge into it.
#[derive(Clone, Debug, Default)]
pub struct ParamSet {
    values: BTreeMap<String, SqlValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one parameter, trimming the name. Replaces any existing entry.
    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue>) {
        self.values.insert(name.trim().to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge a sequence of pairs into the set.
    pub fn extend<N, V>(&mut self, pairs: impl IntoIterator<Item = (N, V)>)
    where
        N: AsRef<str>,
        V: Into<SqlValue>,
    {
        for (name, value) in pairs {
            self.insert(name.as_ref(), value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Conversion out of a [`SqlValue`], used by the typed-array accessor.
///
/// One implementation per supported element family; requesting an element
/// type outside this set is a compile error rather than a runtime fallback.
pub trait FromSqlValue: Sized {
    /// Family name used in decode-error messages.
    const FAMILY: &'static str;

    fn from_value(value: &SqlValue) -> Option<Self>;
}

impl FromSqlValue for String {
    const FAMILY: &'static str = "text";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromSqlValue for i32 {
    const FAMILY: &'static str = "i32";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSqlValue for i64 {
    const FAMILY: &'static str = "i64";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSqlValue for f32 {
    const FAMILY: &'static str = "f32";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl FromSqlValue for f64 {
    const FAMILY: &'static str = "f64";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromSqlValue for bool {
    const FAMILY: &'static str = "bool";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSqlValue for NaiveDate {
    const FAMILY: &'static str = "date";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_date()
    }
}

impl FromSqlValue for NaiveTime {
    const FAMILY: &'static str = "time";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_time()
    }
}

impl FromSqlValue for NaiveDateTime {
    const FAMILY: &'static str = "timestamp";

    fn from_value(value: &SqlValue) -> Option<Self> {
        value.as_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_coerces_to_float_but_not_reverse() {
        assert_eq!(SqlValue::Int(42).as_f64(), Some(42.0));
        assert_eq!(SqlValue::Float(42.5).as_i64(), None);
    }

    #[test]
    fn bool_accepts_zero_one_integers() {
        assert_eq!(SqlValue::Int(0).as_bool(), Some(false));
        assert_eq!(SqlValue::Int(1).as_bool(), Some(true));
        assert_eq!(SqlValue::Int(2).as_bool(), None);
    }

    #[test]
    fn text_parses_as_date() {
        let d = SqlValue::Text("2024-03-15".to_string()).as_date();
        assert_eq!(d, Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
    }

    #[test]
    fn timestamp_text_accepts_both_separators() {
        let a = SqlValue::Text("2024-03-15T10:30:00".to_string()).as_timestamp();
        let b = SqlValue::Text("2024-03-15 10:30:00".to_string()).as_timestamp();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn datetime_contributes_date_portion() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let v = SqlValue::DateTime(Utc.from_utc_datetime(&ts));
        assert_eq!(v.as_date(), NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn param_set_trims_names() {
        let mut params = ParamSet::new();
        params.insert(" low ", 18i64);
        assert!(params.contains("low"));
        assert_eq!(params.get("low"), Some(&SqlValue::Int(18)));
    }

    #[test]
    fn param_set_insert_replaces() {
        let mut params = ParamSet::new();
        params.insert("x", 1i64);
        params.insert("x", 2i64);
        assert_eq!(params.get("x"), Some(&SqlValue::Int(2)));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn option_converts_to_null() {
        let v: SqlValue = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: SqlValue = Some("x").into();
        assert_eq!(v, SqlValue::Text("x".to_string()));
    }

    #[test]
    fn from_value_i32_rejects_overflow() {
        let big = SqlValue::Int(i64::from(i32::MAX) + 1);
        assert_eq!(i32::from_value(&big), None);
        assert_eq!(i64::from_value(&big), Some(i64::from(i32::MAX) + 1));
    }
}
