//! Process-wide defaults for new invocation objects.
//!
//! Each [`Sql`](crate::Sql), [`Call`](crate::Call) and
//! [`Batch`](crate::Batch) snapshots these defaults at construction; changing
//! a default afterwards affects only objects created later. Per-object
//! builders (`safe`, `with_page_of`) override the snapshot.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static DEFAULT_SAFE_MODE: AtomicBool = AtomicBool::new(false);

// 0 means "no default page size".
static DEFAULT_PAGE: AtomicUsize = AtomicUsize::new(0);

/// Set the default null-handling policy for subsequently created objects.
///
/// With safe mode on, raw accessors report database NULL as an error instead
/// of substituting a zero sentinel.
pub fn global_safe_mode(enabled: bool) {
    DEFAULT_SAFE_MODE.store(enabled, Ordering::Relaxed);
}

/// Set the default fetch-size hint, or clear it with `None`.
pub fn global_page_of(rows: Option<usize>) {
    DEFAULT_PAGE.store(rows.unwrap_or(0), Ordering::Relaxed);
}

pub(crate) fn default_safe_mode() -> bool {
    DEFAULT_SAFE_MODE.load(Ordering::Relaxed)
}

pub(crate) fn default_page_of() -> Option<usize> {
    match DEFAULT_PAGE.load(Ordering::Relaxed) {
        0 => None,
        rows => Some(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Sql;
    use crate::backend::mock::MockConnection;

    // Globals are shared across the test binary, so this is the only test
    // that mutates them; it restores the initial state before returning.
    #[test]
    fn defaults_round_trip_and_snapshot_at_construction() {
        let initial_safe = default_safe_mode();
        let initial_page = default_page_of();

        global_safe_mode(true);
        assert!(default_safe_mode());
        global_safe_mode(false);
        assert!(!default_safe_mode());

        global_page_of(Some(250));
        assert_eq!(default_page_of(), Some(250));

        // The default is captured when an invocation is built, not when it
        // runs.
        let conn = MockConnection::new();
        let query = Sql::new(&conn, "select 1");
        global_page_of(None);
        assert_eq!(default_page_of(), None);
        query.all().unwrap();
        assert_eq!(conn.log().fetch_hints, vec![("select 1".to_string(), 250)]);

        global_safe_mode(initial_safe);
        global_page_of(initial_page);
    }
}
