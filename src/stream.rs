//! Lazy row pipelines.
//!
//! A [`Stream`] is a deferred computation over a query's rows. Combinators
//! (`map`, `filter`, `collect`, `and_then`) compose into a single fused
//! function; nothing touches the database until a terminal runs. A terminal
//! drives one cursor pass and applies the fused pipeline to each row as it is
//! stepped to, so a row that an early stage drops never reaches later stages,
//! and `run_single` stops the cursor as soon as one value survives the whole
//! pipeline.

use std::collections::BTreeMap;

use crate::error::SqlError;
use crate::row::{OwnedRow, Row, RowAccess};
use crate::sql::Sql;

type Pipeline<'c, T> = Box<dyn FnMut(&Row<'_>) -> Option<T> + 'c>;

/// A deferred, fused computation over the rows of one query.
pub struct Stream<'c, T> {
    sql: Sql<'c>,
    pipeline: Pipeline<'c, T>,
}

impl<'c> Sql<'c> {
    /// Defer this query into a pipeline of owned row snapshots.
    pub fn stream(self) -> Stream<'c, OwnedRow> {
        Stream {
            sql: self,
            pipeline: Box::new(|row| Some(row.to_owned_row())),
        }
    }

    /// Defer this query, transforming each row at the source.
    pub fn map<T, F>(self, mut f: F) -> Stream<'c, T>
    where
        F: FnMut(&Row<'_>) -> T + 'c,
    {
        Stream {
            sql: self,
            pipeline: Box::new(move |row| Some(f(row))),
        }
    }

    /// Defer this query, keeping only rows the predicate accepts.
    pub fn filter<F>(self, mut predicate: F) -> Stream<'c, OwnedRow>
    where
        F: FnMut(&Row<'_>) -> bool + 'c,
    {
        Stream {
            sql: self,
            pipeline: Box::new(move |row| predicate(row).then(|| row.to_owned_row())),
        }
    }
}

impl<'c, T: 'c> Stream<'c, T> {
    /// Transform each surviving value.
    pub fn map<U, F>(self, mut f: F) -> Stream<'c, U>
    where
        F: FnMut(T) -> U + 'c,
    {
        let mut prev = self.pipeline;
        Stream {
            sql: self.sql,
            pipeline: Box::new(move |row| prev(row).map(&mut f)),
        }
    }

    /// Drop values the predicate rejects.
    pub fn filter<F>(self, mut predicate: F) -> Stream<'c, T>
    where
        F: FnMut(&T) -> bool + 'c,
    {
        let mut prev = self.pipeline;
        Stream {
            sql: self.sql,
            pipeline: Box::new(move |row| prev(row).filter(|v| predicate(v))),
        }
    }

    /// Transform and filter in one stage: `None` drops the value.
    pub fn collect<U, F>(self, mut f: F) -> Stream<'c, U>
    where
        F: FnMut(T) -> Option<U> + 'c,
    {
        let mut prev = self.pipeline;
        Stream {
            sql: self.sql,
            pipeline: Box::new(move |row| prev(row).and_then(&mut f)),
        }
    }

    /// Observe each surviving value without consuming it.
    pub fn and_then<F>(self, mut effect: F) -> Stream<'c, T>
    where
        F: FnMut(&T) + 'c,
    {
        let mut prev = self.pipeline;
        Stream {
            sql: self.sql,
            pipeline: Box::new(move |row| {
                prev(row).map(|v| {
                    effect(&v);
                    v
                })
            }),
        }
    }

    /// Run the pipeline, collecting every surviving value in row order.
    pub fn run(self) -> Result<Vec<T>, SqlError> {
        let Self { sql, mut pipeline } = self;
        let mut out = Vec::new();
        sql.run_cursor(|row| {
            if let Some(v) = pipeline(row) {
                out.push(v);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Run until one value survives the pipeline, then stop the cursor.
    pub fn run_single(self) -> Result<Option<T>, SqlError> {
        let Self { sql, mut pipeline } = self;
        let mut out = None;
        sql.run_cursor(|row| {
            out = pipeline(row);
            Ok(out.is_none())
        })?;
        Ok(out)
    }

    /// Run the pipeline for its effects, discarding the values.
    pub fn exec(self) -> Result<(), SqlError> {
        let Self { sql, mut pipeline } = self;
        sql.run_cursor(|row| {
            pipeline(row);
            Ok(true)
        })
    }

    /// Index surviving values by key. `None` keys are discarded; a repeated
    /// key keeps the later value.
    pub fn index_by<K, F>(self, mut key: F) -> Result<BTreeMap<K, T>, SqlError>
    where
        K: Ord,
        F: FnMut(&T) -> Option<K>,
    {
        self.index_by_with(key_and_identity(&mut key))
    }

    /// Index by key and projected value; rows where either side is `None`
    /// are discarded.
    pub fn index_by_with<K, V, F>(self, mut entry: F) -> Result<BTreeMap<K, V>, SqlError>
    where
        K: Ord,
        F: FnMut(T) -> Option<(K, V)>,
    {
        let Self { sql, mut pipeline } = self;
        let mut out = BTreeMap::new();
        sql.run_cursor(|row| {
            if let Some((k, v)) = pipeline(row).and_then(&mut entry) {
                out.insert(k, v);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Group surviving values by key, accumulating in row order.
    pub fn group_by<K, F>(self, mut key: F) -> Result<BTreeMap<K, Vec<T>>, SqlError>
    where
        K: Ord,
        F: FnMut(&T) -> Option<K>,
    {
        self.group_by_with(key_and_identity(&mut key))
    }

    /// Group by key and projected value; rows where either side is `None`
    /// are discarded.
    pub fn group_by_with<K, V, F>(self, mut entry: F) -> Result<BTreeMap<K, Vec<V>>, SqlError>
    where
        K: Ord,
        F: FnMut(T) -> Option<(K, V)>,
    {
        let Self { sql, mut pipeline } = self;
        let mut out: BTreeMap<K, Vec<V>> = BTreeMap::new();
        sql.run_cursor(|row| {
            if let Some((k, v)) = pipeline(row).and_then(&mut entry) {
                out.entry(k).or_default().push(v);
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Fold surviving values into an accumulator in row order.
    pub fn reduce<A, F>(self, init: A, mut f: F) -> Result<A, SqlError>
    where
        F: FnMut(A, T) -> A,
    {
        let Self { sql, mut pipeline } = self;
        let mut acc = Some(init);
        sql.run_cursor(|row| {
            if let Some(v) = pipeline(row)
                && let Some(current) = acc.take()
            {
                acc = Some(f(current, v));
            }
            Ok(true)
        })?;
        Ok(acc.unwrap_or_else(|| unreachable!("accumulator is always refilled")))
    }
}

/// Adapter turning a key extractor into an entry extractor that keeps the
/// value itself.
fn key_and_identity<'f, K, T, F>(key: &'f mut F) -> impl FnMut(T) -> Option<(K, T)> + 'f
where
    F: FnMut(&T) -> Option<K>,
{
    move |v| key(&v).map(|k| (k, v))
}
