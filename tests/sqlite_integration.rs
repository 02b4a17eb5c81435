//! End-to-end coverage against the bundled SQLite driver.

#![cfg(feature = "backend-sqlite")]

use std::cell::Cell;

use namedsql::backend::sqlite;
use namedsql::{Batch, RowAccess, Sql, SqlError, SqlValue, batch_of, sql};

fn persons_db() -> rusqlite::Connection {
    let conn = sqlite::open_memory().unwrap();
    conn.execute_batch(
        "create table persons (id integer primary key, name text not null, age integer)",
    )
    .unwrap();
    conn
}

fn seed_persons(conn: &rusqlite::Connection) {
    for (name, age) in [("ann", 42i64), ("bob", 16), ("cat", 90)] {
        let n = Sql::new(conn, "insert into persons (name, age) values ({name}, {age})")
            .on("name", name)
            .on("age", age)
            .execute_update()
            .unwrap();
        assert_eq!(n, 1);
    }
}

fn count(conn: &rusqlite::Connection, table: &str) -> i64 {
    Sql::new(conn, &format!("select count(*) as n from {table}"))
        .collect_single(|row| row.get_i64("n").ok())
        .unwrap()
        .unwrap_or(0)
}

#[test]
fn named_range_query_end_to_end() {
    let conn = persons_db();
    seed_persons(&conn);

    let names = sql(&conn, "select name from persons where age > {low} and age < {high} order by age")
        .on("low", 18i64)
        .on("high", 100i64)
        .collect(|row| row.get_str("name").ok())
        .unwrap();

    assert_eq!(names, vec!["ann", "cat"]);
}

#[test]
fn duplicate_placeholder_against_real_engine() {
    let conn = persons_db();
    seed_persons(&conn);

    let hits = Sql::new(
        &conn,
        "select name from persons where age = {v} or id = {v} order by id",
    )
    .on("v", 42i64)
    .collect(|row| row.get_str("name").ok())
    .unwrap();

    // id 42 does not exist; age 42 is ann.
    assert_eq!(hits, vec!["ann"]);
}

#[test]
fn missing_parameter_fails_without_touching_data() {
    let conn = persons_db();
    let err = Sql::new(&conn, "insert into persons (name) values ({name})")
        .execute_update()
        .unwrap_err();
    assert!(matches!(err, SqlError::MissingParameter { .. }));
    assert_eq!(count(&conn, "persons"), 0);
}

#[test]
fn null_policy_against_real_nulls() {
    let conn = persons_db();
    conn.execute_batch("insert into persons (name, age) values ('nil', null)")
        .unwrap();

    // Relaxed mode substitutes the zero sentinel.
    let relaxed = Sql::new(&conn, "select age from persons where name = {n}")
        .on("n", "nil")
        .safe(false)
        .collect_single(|row| row.get_i64("age").ok())
        .unwrap();
    assert_eq!(relaxed, Some(0));

    // Safe mode surfaces the NULL as an error from the raw accessor.
    Sql::new(&conn, "select age from persons where name = {n}")
        .on("n", "nil")
        .safe(true)
        .for_each(|row| {
            assert!(matches!(row.get_i64("age"), Err(SqlError::NullColumn { .. })));
            // The null-aware accessor stays usable in either mode, and the
            // column still counts as present.
            assert_eq!(row.opt_i64("age").unwrap(), None);
            assert!(row.is_present("age"));
            Ok(())
        })
        .unwrap();
}

#[test]
fn stream_pipeline_fuses_over_real_rows() {
    let conn = persons_db();
    seed_persons(&conn);
    let touched = Cell::new(0u32);

    let doubled = Sql::new(&conn, "select age from persons order by age")
        .map(|row| row.get_i64("age").unwrap_or(0))
        .filter(|age| *age >= 18)
        .map(|age| {
            touched.set(touched.get() + 1);
            age * 2
        })
        .run()
        .unwrap();

    assert_eq!(doubled, vec![84, 180]);
    // The final stage never saw the filtered-out minor.
    assert_eq!(touched.get(), 2);
}

#[test]
fn run_single_stops_the_cursor_early() {
    let conn = persons_db();
    for i in 0..1000i64 {
        Sql::new(&conn, "insert into persons (name, age) values ({n}, {a})")
            .on("n", format!("p{i}"))
            .on("a", i)
            .execute_update()
            .unwrap();
    }

    let stepped = Cell::new(0u32);
    let found = Sql::new(&conn, "select age from persons order by age")
        .map(|row| {
            stepped.set(stepped.get() + 1);
            row.get_i64("age").unwrap_or(0)
        })
        .filter(|age| *age >= 5)
        .run_single()
        .unwrap();

    assert_eq!(found, Some(5));
    assert_eq!(stepped.get(), 6);
}

#[test]
fn grouping_terminals_end_to_end() {
    let conn = persons_db();
    seed_persons(&conn);

    let by_name = Sql::new(&conn, "select name, age from persons")
        .index_by(
            |row| row.get_str("name").ok(),
            |row| row.get_i64("age").ok(),
        )
        .unwrap();
    assert_eq!(by_name.get("cat"), Some(&90));

    let by_adulthood = Sql::new(&conn, "select name, age from persons")
        .group_by(
            |row| row.get_i64("age").ok().map(|a| a >= 18),
            |row| row.get_str("name").ok(),
        )
        .unwrap();
    assert_eq!(by_adulthood.get(&true).map(Vec::len), Some(2));
    assert_eq!(by_adulthood.get(&false), Some(&vec!["bob".to_string()]));
}

#[test]
fn batch_auto_flushes_every_ten_rows() {
    let conn = persons_db();
    let batch = batch_of(&conn, "insert into persons (name, age) values ({n}, {a})", 10).unwrap();

    for i in 0..25i64 {
        batch.on("n", format!("p{i}")).on("a", i);
        let counts = batch.batch().unwrap();
        if (i + 1) % 10 == 0 {
            assert_eq!(counts.len(), 10);
        } else {
            assert!(counts.is_empty());
        }
    }
    // Two auto-flushes have landed; five rows are still enqueued.
    assert_eq!(count(&conn, "persons"), 20);
    assert_eq!(batch.enqueued(), 5);

    assert_eq!(batch.execute_batch().unwrap().len(), 5);
    assert_eq!(count(&conn, "persons"), 25);
}

#[test]
fn trigger_graph_flushes_in_dependency_order() {
    let conn = sqlite::open_memory().unwrap();
    conn.execute_batch(
        "create table parents (id integer primary key);
         create table children (id integer primary key, parent_id integer not null
             references parents(id));
         create table audit (entry text);
         pragma foreign_keys = on;",
    )
    .unwrap();

    let parents = Batch::new(&conn, "insert into parents (id) values ({id})").unwrap();
    let children =
        Batch::new(&conn, "insert into children (id, parent_id) values ({id}, {pid})").unwrap();
    let audit = Batch::new(&conn, "insert into audit (entry) values ({e})").unwrap();

    // Parents must exist before children; audit rows follow the children.
    children.trigger_before_self(&[&parents]).unwrap();
    children.trigger_after_self(&[&audit]).unwrap();

    for id in 1..=3i64 {
        parents.on("id", id);
        parents.batch().unwrap();
        children.on("id", id * 10).on("pid", id);
        children.batch().unwrap();
        audit.on("e", format!("child {id}"));
        audit.batch().unwrap();
    }

    // One flush of the anchor drains the whole graph, in order.
    children.execute_batch().unwrap();
    assert_eq!(count(&conn, "parents"), 3);
    assert_eq!(count(&conn, "children"), 3);
    assert_eq!(count(&conn, "audit"), 3);
    assert_eq!(parents.enqueued(), 0);
    assert_eq!(audit.enqueued(), 0);
}

#[test]
fn trigger_cycle_is_rejected() {
    let conn = persons_db();
    let a = Batch::new(&conn, "insert into persons (name) values ({n})").unwrap();
    let b = Batch::new(&conn, "insert into persons (name) values ({n})").unwrap();

    a.trigger_before_self(&[&b]).unwrap();
    let err = b.trigger_after_self(&[&a]).unwrap_err();
    assert!(matches!(err, SqlError::TriggerCycle));
}

#[test]
fn failed_flush_keeps_rows_and_still_runs_afters() {
    let conn = sqlite::open_memory().unwrap();
    conn.execute_batch(
        "create table unique_names (name text primary key);
         create table log (entry text);",
    )
    .unwrap();

    let writes = Batch::new(&conn, "insert into unique_names (name) values ({n})").unwrap();
    let log = Batch::new(&conn, "insert into log (entry) values ({e})").unwrap();
    writes.trigger_after_self(&[&log]).unwrap();

    // Two identical keys make the second insert fail on flush.
    writes.on("n", "dup");
    writes.batch().unwrap();
    writes.on("n", "dup");
    writes.batch().unwrap();
    log.on("e", "attempted");
    log.batch().unwrap();

    let err = writes.execute_batch().unwrap_err();
    assert!(matches!(err, SqlError::Driver { .. }));
    // The after-dependent still flushed.
    assert_eq!(count(&conn, "log"), 1);
}

#[test]
fn temporal_round_trip_through_file_backed_db() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let born = chrono::NaiveDate::from_ymd_opt(1984, 5, 2).unwrap();

    {
        let conn = sqlite::open_file(&path).unwrap();
        conn.execute_batch("create table events (name text, at text)")
            .unwrap();
        Sql::new(&conn, "insert into events (name, at) values ({n}, {at})")
            .on("n", "birthday")
            .on("at", born)
            .execute_update()
            .unwrap();
    }

    let conn = sqlite::open_file(&path).unwrap();
    let row = Sql::new(&conn, "select name, at from events")
        .single()
        .unwrap()
        .unwrap();
    assert_eq!(row.get_str("name").unwrap(), "birthday");
    assert_eq!(row.get_date("at").unwrap(), born);
    assert_eq!(
        row.get_value("at").unwrap(),
        SqlValue::Text("1984-05-02".to_string())
    );
}

#[test]
fn owned_rows_survive_the_statement() {
    let conn = persons_db();
    seed_persons(&conn);

    let rows = Sql::new(&conn, "select name, age from persons order by age").all().unwrap();
    drop(conn);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get_str("name").unwrap(), "bob");
    assert_eq!(rows[2].position(), 3);
    let map = rows[2].as_map();
    assert_eq!(map.get("age"), Some(&SqlValue::Int(90)));
}
