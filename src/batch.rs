//! Dependency-aware batched execution.
//!
//! A [`Batch`] owns one prepared statement and accumulates parameter sets
//! against it. Each `batch()` enqueues the current set and clears it; a flush
//! replays every enqueued set in one driver round.
//!
//! # Triggers
//!
//! Batches can depend on each other: registering `a.trigger_before_self(&[&b])`
//! makes `b` flush before `a` whenever `a` flushes, and `trigger_after_self`
//! the same on the way out. Registration disables the dependent's auto-flush
//! threshold, so a dependent only flushes when its anchor does and relative
//! ordering is preserved. A registration that would make a batch reachable
//! from itself is rejected with [`SqlError::TriggerCycle`].
//!
//! On flush, before-dependents run first and their errors propagate
//! immediately. The batch's own flush runs next; after-dependents always run,
//! even when the own flush failed. The own flush's error wins over a
//! dependent's cleanup error.
//!
//! Handles are `Rc`-shared clones of one underlying state and are not `Send`;
//! a batch graph lives on a single thread, like the connection it wraps.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::backend::{Connection, Statement};
use crate::binder::bind_statement;
use crate::error::SqlError;
use crate::template::QueryTemplate;
use crate::value::{ParamSet, SqlValue};

enum Direction {
    Before,
    After,
}

struct BatchInner<'c> {
    stmt: Box<dyn Statement + 'c>,
    template: QueryTemplate,
    params: ParamSet,
    /// Auto-flush threshold; `None` means flush only on demand.
    threshold: Option<u32>,
    enqueued: u32,
    trigger_before: Vec<Batch<'c>>,
    trigger_after: Vec<Batch<'c>>,
}

/// A shared handle to one batched statement. Cloning shares state.
#[derive(Clone)]
pub struct Batch<'c> {
    inner: Rc<RefCell<BatchInner<'c>>>,
}

impl<'c> Batch<'c> {
    /// Prepare a batch with no auto-flush threshold.
    pub fn new(conn: &'c dyn Connection, template: &str) -> Result<Self, SqlError> {
        Self::build(conn, template, None)
    }

    /// Prepare a batch that auto-flushes once `threshold` sets are enqueued.
    pub fn with_threshold(
        conn: &'c dyn Connection,
        template: &str,
        threshold: u32,
    ) -> Result<Self, SqlError> {
        Self::build(conn, template, Some(threshold))
    }

    fn build(
        conn: &'c dyn Connection,
        template: &str,
        threshold: Option<u32>,
    ) -> Result<Self, SqlError> {
        Self::with_template(conn, QueryTemplate::compile(template), threshold)
    }

    /// Prepare a batch from an already-compiled template.
    pub fn with_template(
        conn: &'c dyn Connection,
        template: QueryTemplate,
        threshold: Option<u32>,
    ) -> Result<Self, SqlError> {
        let stmt = conn.prepare(template.text())?;
        Ok(Self {
            inner: Rc::new(RefCell::new(BatchInner {
                stmt,
                template,
                params: ParamSet::new(),
                threshold,
                enqueued: 0,
                trigger_before: Vec::new(),
                trigger_after: Vec::new(),
            })),
        })
    }

    /// Bind one named parameter into the pending set.
    pub fn on(&self, name: &str, value: impl Into<SqlValue>) -> &Self {
        self.inner.borrow_mut().params.insert(name, value);
        self
    }

    /// Merge a sequence of named parameters into the pending set.
    pub fn add<N, V>(&self, pairs: impl IntoIterator<Item = (N, V)>) -> &Self
    where
        N: AsRef<str>,
        V: Into<SqlValue>,
    {
        self.inner.borrow_mut().params.extend(pairs);
        self
    }

    /// Replace the pending parameter set.
    pub fn set_params(&self, params: ParamSet) -> &Self {
        self.inner.borrow_mut().params = params;
        self
    }

    /// Enqueue the pending parameter set as one batch row and clear it.
    /// Returns the flushed counts when this enqueue crossed the threshold,
    /// empty otherwise.
    pub fn batch(&self) -> Result<Vec<u64>, SqlError> {
        let flush_due = {
            let inner = &mut *self.inner.borrow_mut();
            bind_statement(
                inner.stmt.as_mut(),
                inner.template.param_names(),
                &inner.params,
            )?;
            inner.stmt.add_batch()?;
            inner.enqueued += 1;
            inner.params.clear();
            matches!(inner.threshold, Some(t) if inner.enqueued >= t)
        };
        if flush_due {
            self.execute_batch()
        } else {
            Ok(Vec::new())
        }
    }

    /// Discard enqueued rows and pending parameters without executing.
    pub fn clear_batch(&self) -> Result<(), SqlError> {
        let inner = &mut *self.inner.borrow_mut();
        inner.enqueued = 0;
        inner.params.clear();
        inner.stmt.clear_batch()?;
        inner.stmt.clear_bindings()
    }

    /// Register batches to flush before this one. A batch never depends on
    /// itself: entries sharing this handle's state are skipped.
    pub fn trigger_before_self(&self, others: &[&Batch<'c>]) -> Result<(), SqlError> {
        self.register(others, Direction::Before)
    }

    /// Register batches to flush after this one.
    pub fn trigger_after_self(&self, others: &[&Batch<'c>]) -> Result<(), SqlError> {
        self.register(others, Direction::After)
    }

    fn register(&self, others: &[&Batch<'c>], direction: Direction) -> Result<(), SqlError> {
        for other in others {
            if Rc::ptr_eq(&self.inner, &other.inner) {
                continue;
            }
            // Reject the edge if this batch is already reachable from the
            // dependent; flushing would otherwise recurse forever.
            if other.reaches(self) {
                return Err(SqlError::TriggerCycle);
            }
            // Dependents flush only when their anchor does.
            other.inner.borrow_mut().threshold = None;
            let mut inner = self.inner.borrow_mut();
            match direction {
                Direction::Before => inner.trigger_before.push((*other).clone()),
                Direction::After => inner.trigger_after.push((*other).clone()),
            }
        }
        Ok(())
    }

    fn reaches(&self, target: &Batch<'c>) -> bool {
        if Rc::ptr_eq(&self.inner, &target.inner) {
            return true;
        }
        let inner = self.inner.borrow();
        inner
            .trigger_before
            .iter()
            .chain(inner.trigger_after.iter())
            .any(|dep| dep.reaches(target))
    }

    /// Flush this batch and its dependents.
    ///
    /// Before-dependents flush first and abort on error. After-dependents
    /// always flush, even when the own flush failed; the own error wins.
    pub fn execute_batch(&self) -> Result<Vec<u64>, SqlError> {
        let befores = self.inner.borrow().trigger_before.clone();
        for dep in &befores {
            dep.execute_batch()?;
        }

        let primary = self.flush_own();

        let afters = self.inner.borrow().trigger_after.clone();
        let mut cleanup_err = None;
        for dep in &afters {
            if let Err(e) = dep.execute_batch()
                && cleanup_err.is_none()
            {
                cleanup_err = Some(e);
            }
        }

        match (primary, cleanup_err) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(counts), None) => Ok(counts),
        }
    }

    /// Flush only this batch's rows. On success the enqueued state is reset;
    /// on error it is kept so the caller can retry or clear explicitly.
    fn flush_own(&self) -> Result<Vec<u64>, SqlError> {
        let inner = &mut *self.inner.borrow_mut();
        debug!(
            sql = inner.template.text(),
            rows = inner.enqueued,
            "flushing batch"
        );
        let counts = inner.stmt.execute_batch()?;
        inner.enqueued = 0;
        inner.params.clear();
        inner.stmt.clear_batch()?;
        inner.stmt.clear_bindings()?;
        Ok(counts)
    }

    /// Rows enqueued since the last flush.
    pub fn enqueued(&self) -> u32 {
        self.inner.borrow().enqueued
    }

    pub fn threshold(&self) -> Option<u32> {
        self.inner.borrow().threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockConnection;

    #[test]
    fn auto_flush_at_threshold() {
        let conn = MockConnection::new();
        let batch = Batch::with_threshold(&conn, "insert into t (a) values ({a})", 3).unwrap();

        for i in 0..2 {
            batch.on("a", i as i64);
            assert!(batch.batch().unwrap().is_empty());
        }
        assert_eq!(batch.enqueued(), 2);
        assert!(conn.log().flushes.is_empty());

        batch.on("a", 2i64);
        let counts = batch.batch().unwrap();
        assert_eq!(counts.len(), 3);
        assert_eq!(batch.enqueued(), 0);
        assert_eq!(conn.log().flushes, vec![("insert into t (a) values (?)".to_string(), 3)]);
    }

    #[test]
    fn pending_params_clear_after_enqueue() {
        let conn = MockConnection::new();
        let batch = Batch::new(&conn, "insert into t (a) values ({a})").unwrap();
        batch.on("a", 1i64);
        batch.batch().unwrap();
        // The next enqueue needs its own bindings.
        let err = batch.batch().unwrap_err();
        assert!(matches!(err, SqlError::MissingParameter { name } if name == "a"));
    }

    #[test]
    fn registration_disables_dependent_threshold() {
        let conn = MockConnection::new();
        let anchor = Batch::new(&conn, "insert into t1 (a) values ({a})").unwrap();
        let dependent = Batch::with_threshold(&conn, "insert into t2 (a) values ({a})", 2).unwrap();

        anchor.trigger_before_self(&[&dependent]).unwrap();
        assert_eq!(dependent.threshold(), None);

        for i in 0..5 {
            dependent.on("a", i as i64);
            assert!(dependent.batch().unwrap().is_empty());
        }
        assert_eq!(dependent.enqueued(), 5);
        assert!(conn.log().flushes.is_empty());
    }

    #[test]
    fn dependents_flush_around_the_anchor() {
        let conn = MockConnection::new();
        let anchor = Batch::new(&conn, "insert into main (a) values ({a})").unwrap();
        let first = Batch::new(&conn, "insert into parent (a) values ({a})").unwrap();
        let last = Batch::new(&conn, "insert into child (a) values ({a})").unwrap();

        anchor.trigger_before_self(&[&first]).unwrap();
        anchor.trigger_after_self(&[&last]).unwrap();

        first.on("a", 1i64);
        first.batch().unwrap();
        anchor.on("a", 2i64);
        anchor.batch().unwrap();
        last.on("a", 3i64);
        last.batch().unwrap();

        anchor.execute_batch().unwrap();

        let log = conn.log();
        let order: Vec<&str> = log.flushes.iter().map(|(sql, _)| sql.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "insert into parent (a) values (?)",
                "insert into main (a) values (?)",
                "insert into child (a) values (?)",
            ]
        );
    }

    #[test]
    fn self_registration_is_skipped() {
        let conn = MockConnection::new();
        let batch = Batch::new(&conn, "insert into t (a) values ({a})").unwrap();
        let alias = batch.clone();
        batch.trigger_before_self(&[&alias]).unwrap();
        // No dependency registered; flushing does not recurse.
        batch.on("a", 1i64);
        batch.batch().unwrap();
        batch.execute_batch().unwrap();
    }

    #[test]
    fn cycles_are_rejected_at_registration() {
        let conn = MockConnection::new();
        let a = Batch::new(&conn, "insert into a (x) values ({x})").unwrap();
        let b = Batch::new(&conn, "insert into b (x) values ({x})").unwrap();
        let c = Batch::new(&conn, "insert into c (x) values ({x})").unwrap();

        a.trigger_before_self(&[&b]).unwrap();
        b.trigger_after_self(&[&c]).unwrap();
        let err = c.trigger_before_self(&[&a]).unwrap_err();
        assert!(matches!(err, SqlError::TriggerCycle));
    }

    #[test]
    fn after_dependents_flush_even_when_own_flush_fails() {
        let conn = MockConnection::new().fail_batch_flush_containing("broken");
        let anchor = Batch::new(&conn, "insert into broken (a) values ({a})").unwrap();
        let cleanup = Batch::new(&conn, "insert into cleanup (a) values ({a})").unwrap();
        anchor.trigger_after_self(&[&cleanup]).unwrap();

        anchor.on("a", 1i64);
        anchor.batch().unwrap();
        cleanup.on("a", 2i64);
        cleanup.batch().unwrap();

        let err = anchor.execute_batch().unwrap_err();
        // The own failure is reported, and the cleanup still flushed.
        assert!(matches!(err, SqlError::Execute { .. }));
        assert_eq!(conn.log().flushes, vec![("insert into cleanup (a) values (?)".to_string(), 1)]);
        // Failed rows stay enqueued for retry or explicit clearing.
        assert_eq!(anchor.enqueued(), 1);
    }

    #[test]
    fn before_dependent_failure_propagates_immediately() {
        let conn = MockConnection::new().fail_batch_flush_containing("broken");
        let anchor = Batch::new(&conn, "insert into main (a) values ({a})").unwrap();
        let parent = Batch::new(&conn, "insert into broken (a) values ({a})").unwrap();
        anchor.trigger_before_self(&[&parent]).unwrap();

        anchor.on("a", 1i64);
        anchor.batch().unwrap();
        parent.on("a", 2i64);
        parent.batch().unwrap();

        let err = anchor.execute_batch().unwrap_err();
        assert!(matches!(err, SqlError::Execute { .. }));
        // The anchor never flushed.
        assert!(conn.log().flushes.is_empty());
        assert_eq!(anchor.enqueued(), 1);
    }
}
