//! End-to-end SQL tests against on-disk databases.

use speedsql::{Database, ErrorCode, StepResult, Value};
use tempfile::TempDir;

fn open_db(dir: &TempDir) -> Database {
    Database::open(dir.path().join("test.db")).unwrap()
}

/// Runs a query and returns every row rendered as text.
fn query(db: &Database, sql: &str) -> Vec<Vec<Option<String>>> {
    let (stmt, _) = db.prepare(sql).unwrap();
    let mut stmt = stmt.unwrap();
    let mut rows = Vec::new();
    while stmt.step().unwrap() == StepResult::Row {
        rows.push(
            (0..stmt.column_count())
                .map(|i| stmt.column_text(i))
                .collect(),
        );
    }
    rows
}

fn single_i64(db: &Database, sql: &str) -> i64 {
    let (stmt, _) = db.prepare(sql).unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    stmt.column_int64(0)
}

#[test]
fn create_insert_select() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT); \
         INSERT INTO t VALUES (1,'Alice'),(2,'Bob'),(3,'Charlie');",
        None,
    )
    .unwrap();

    let rows = query(&db, "SELECT id, name FROM t WHERE id > 1");
    assert_eq!(
        rows,
        vec![
            vec![Some("2".to_string()), Some("Bob".to_string())],
            vec![Some("3".to_string()), Some("Charlie".to_string())],
        ]
    );
}

#[test]
fn prepared_parameter_rebind() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec(
        "CREATE TABLE t (id INTEGER, name TEXT); \
         INSERT INTO t VALUES (1,'Alice'),(2,'Bob'),(3,'Charlie');",
        None,
    )
    .unwrap();

    let (stmt, _) = db.prepare("SELECT id FROM t WHERE name = ?").unwrap();
    let mut stmt = stmt.unwrap();

    stmt.bind_text(1, "Bob").unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_int64(0), 2);
    assert_eq!(stmt.step().unwrap(), StepResult::Done);

    stmt.reset().unwrap();
    stmt.bind_text(1, "Zed").unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Done);
}

#[test]
fn transaction_rollback_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec("CREATE TABLE u (v INTEGER)", None).unwrap();
    db.exec("INSERT INTO u VALUES (1)", None).unwrap();
    db.exec("BEGIN", None).unwrap();
    db.exec("INSERT INTO u VALUES (2)", None).unwrap();
    db.exec("ROLLBACK", None).unwrap();

    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM u"), 1);
}

#[test]
fn savepoint_partial_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec("CREATE TABLE u (v INTEGER)", None).unwrap();
    db.exec("INSERT INTO u VALUES (1)", None).unwrap();
    db.exec("BEGIN", None).unwrap();
    db.exec("INSERT INTO u VALUES (10)", None).unwrap();
    db.exec("SAVEPOINT s", None).unwrap();
    db.exec("INSERT INTO u VALUES (11)", None).unwrap();
    db.exec("ROLLBACK TO s", None).unwrap();
    db.exec("COMMIT", None).unwrap();

    let rows = query(&db, "SELECT v FROM u ORDER BY v");
    assert_eq!(
        rows,
        vec![
            vec![Some("1".to_string())],
            vec![Some("10".to_string())],
        ]
    );
}

#[test]
fn savepoint_restores_rowid_and_change_counters() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec("CREATE TABLE t (v INTEGER)", None).unwrap();
    db.exec("INSERT INTO t VALUES (1)", None).unwrap();
    db.exec("BEGIN", None).unwrap();
    db.exec("SAVEPOINT s", None).unwrap();
    let rowid_at_s = db.last_insert_rowid();
    let changes_at_s = db.total_changes();

    db.exec("INSERT INTO t VALUES (2)", None).unwrap();
    db.exec("INSERT INTO t VALUES (3)", None).unwrap();
    assert!(db.last_insert_rowid() > rowid_at_s);
    assert!(db.total_changes() > changes_at_s);

    db.exec("ROLLBACK TO s", None).unwrap();
    assert_eq!(db.last_insert_rowid(), rowid_at_s);
    assert_eq!(db.total_changes(), changes_at_s);
    db.exec("COMMIT", None).unwrap();
}

#[test]
fn order_by_desc_with_limit() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (name TEXT, score INTEGER); \
         INSERT INTO t VALUES ('A',85),('B',92),('C',78);",
        None,
    )
    .unwrap();

    let rows = query(&db, "SELECT name FROM t ORDER BY score DESC LIMIT 2");
    assert_eq!(
        rows,
        vec![
            vec![Some("B".to_string())],
            vec![Some("A".to_string())],
        ]
    );
}

#[test]
fn order_by_with_offset_and_ties() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (grp INTEGER, seq INTEGER); \
         INSERT INTO t VALUES (2,1),(1,2),(2,3),(1,4);",
        None,
    )
    .unwrap();

    // Ties on grp break on seq; OFFSET skips the first result row.
    let rows = query(&db, "SELECT seq FROM t ORDER BY grp, seq LIMIT 2 OFFSET 1");
    assert_eq!(
        rows,
        vec![
            vec![Some("4".to_string())],
            vec![Some("1".to_string())],
        ]
    );
}

#[test]
fn aggregates_without_group_by() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (v INTEGER); \
         INSERT INTO t VALUES (3),(1),(4),(1),(5);",
        None,
    )
    .unwrap();

    let (stmt, _) = db
        .prepare("SELECT COUNT(*), SUM(v), AVG(v), MIN(v), MAX(v) FROM t")
        .unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_int64(0), 5);
    assert_eq!(stmt.column_double(1), 14.0);
    assert_eq!(stmt.column_double(2), 2.8);
    assert_eq!(stmt.column_double(3), 1.0);
    assert_eq!(stmt.column_double(4), 5.0);
    assert_eq!(stmt.step().unwrap(), StepResult::Done);
}

#[test]
fn count_on_empty_table_is_zero() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (v INTEGER)", None).unwrap();
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 0);
}

#[test]
fn count_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1),(2),(3),(4);",
        None,
    )
    .unwrap();
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t WHERE v > 2"), 2);
}

#[test]
fn group_by_partitions_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE sales (dept TEXT, amount INTEGER); \
         INSERT INTO sales VALUES ('a',10),('b',20),('a',30),('b',5),('c',1);",
        None,
    )
    .unwrap();

    let rows = query(
        &db,
        "SELECT dept, COUNT(*), SUM(amount) FROM sales GROUP BY dept ORDER BY dept",
    );
    assert_eq!(
        rows,
        vec![
            vec![
                Some("a".to_string()),
                Some("2".to_string()),
                Some("40".to_string())
            ],
            vec![
                Some("b".to_string()),
                Some("2".to_string()),
                Some("25".to_string())
            ],
            vec![
                Some("c".to_string()),
                Some("1".to_string()),
                Some("1".to_string())
            ],
        ]
    );
}

#[test]
fn group_by_with_having() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE sales (dept TEXT, amount INTEGER); \
         INSERT INTO sales VALUES ('a',10),('b',20),('a',30),('b',5),('c',1);",
        None,
    )
    .unwrap();

    let rows = query(
        &db,
        "SELECT dept FROM sales GROUP BY dept HAVING SUM(amount) > 20 ORDER BY dept",
    );
    assert_eq!(
        rows,
        vec![
            vec![Some("a".to_string())],
            vec![Some("b".to_string())],
        ]
    );
}

#[test]
fn inner_join_matches_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE users (id INTEGER, name TEXT); \
         CREATE TABLE orders (uid INTEGER, item TEXT); \
         INSERT INTO users VALUES (1,'alice'),(2,'bob'),(3,'carol'); \
         INSERT INTO orders VALUES (1,'book'),(1,'pen'),(3,'mug');",
        None,
    )
    .unwrap();

    let rows = query(
        &db,
        "SELECT name, item FROM users INNER JOIN orders ON users.id = orders.uid \
         ORDER BY name, item",
    );
    assert_eq!(
        rows,
        vec![
            vec![Some("alice".to_string()), Some("book".to_string())],
            vec![Some("alice".to_string()), Some("pen".to_string())],
            vec![Some("carol".to_string()), Some("mug".to_string())],
        ]
    );
}

#[test]
fn left_join_pads_unmatched_rows_with_null() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE users (id INTEGER, name TEXT); \
         CREATE TABLE orders (uid INTEGER, item TEXT); \
         INSERT INTO users VALUES (1,'alice'),(2,'bob'); \
         INSERT INTO orders VALUES (1,'book');",
        None,
    )
    .unwrap();

    let rows = query(
        &db,
        "SELECT name, item FROM users LEFT JOIN orders ON users.id = orders.uid ORDER BY name",
    );
    assert_eq!(
        rows,
        vec![
            vec![Some("alice".to_string()), Some("book".to_string())],
            vec![Some("bob".to_string()), None],
        ]
    );
}

#[test]
fn cross_join_via_comma() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE a (x INTEGER); CREATE TABLE b (y INTEGER); \
         INSERT INTO a VALUES (1),(2); INSERT INTO b VALUES (10),(20);",
        None,
    )
    .unwrap();

    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM a, b"), 4);
}

#[test]
fn update_with_where_and_expressions() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (id INTEGER, score INTEGER); \
         INSERT INTO t VALUES (1,10),(2,20),(3,30);",
        None,
    )
    .unwrap();

    db.exec("UPDATE t SET score = score + 5 WHERE id <> 2", None)
        .unwrap();
    assert_eq!(db.changes(), 2);

    let rows = query(&db, "SELECT score FROM t ORDER BY id");
    assert_eq!(
        rows,
        vec![
            vec![Some("15".to_string())],
            vec![Some("20".to_string())],
            vec![Some("35".to_string())],
        ]
    );
}

#[test]
fn delete_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1),(2),(3),(4),(5);",
        None,
    )
    .unwrap();

    db.exec("DELETE FROM t WHERE v % 2 = 0", None).unwrap();
    assert_eq!(db.changes(), 2);
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 3);
}

#[test]
fn select_expressions_without_from() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    let (stmt, _) = db.prepare("SELECT 1 + 2 * 3, 10 / 4, 'x'").unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_int64(0), 7);
    assert_eq!(stmt.column_int64(1), 2);
    assert_eq!(stmt.column_text(2), Some("x".to_string()));
    assert_eq!(stmt.step().unwrap(), StepResult::Done);
}

#[test]
fn null_semantics_in_where() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (v INTEGER); \
         INSERT INTO t (v) VALUES (1); INSERT INTO t (v) VALUES (NULL);",
        None,
    )
    .unwrap();

    // NULL comparisons never match; IS NULL does.
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t WHERE v = 1"), 1);
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t WHERE v <> 1"), 0);
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t WHERE v IS NULL"), 1);
    assert_eq!(
        single_i64(&db, "SELECT COUNT(*) FROM t WHERE v IS NOT NULL"),
        1
    );
    // Division by zero evaluates to NULL, which filters the row out.
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t WHERE 1 / 0"), 0);
}

#[test]
fn like_patterns_in_where() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (name TEXT); \
         INSERT INTO t VALUES ('apple'),('apricot'),('banana');",
        None,
    )
    .unwrap();

    assert_eq!(
        single_i64(&db, "SELECT COUNT(*) FROM t WHERE name LIKE 'ap%'"),
        2
    );
    assert_eq!(
        single_i64(&db, "SELECT COUNT(*) FROM t WHERE name LIKE '_anana'"),
        1
    );
}

#[test]
fn unique_index_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (email TEXT); \
         INSERT INTO t VALUES ('a@x'),('b@x'); \
         CREATE UNIQUE INDEX idx_email ON t (email);",
        None,
    )
    .unwrap();

    let err = db.exec("INSERT INTO t VALUES ('a@x')", None).unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Constraint);
    assert_eq!(db.errcode(), ErrorCode::Constraint.as_i32());

    // Distinct values still insert, and deleting frees the slot.
    db.exec("INSERT INTO t VALUES ('c@x')", None).unwrap();
    db.exec("DELETE FROM t WHERE email = 'a@x'", None).unwrap();
    db.exec("INSERT INTO t VALUES ('a@x')", None).unwrap();
}

#[test]
fn create_unique_index_fails_on_existing_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('dup'),('dup');",
        None,
    )
    .unwrap();

    let err = db
        .exec("CREATE UNIQUE INDEX idx_v ON t (v)", None)
        .unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Constraint);
}

#[test]
fn not_null_constraint() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (v INTEGER NOT NULL)", None).unwrap();

    let err = db.exec("INSERT INTO t VALUES (NULL)", None).unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Constraint);
}

#[test]
fn drop_table_then_recreate() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1),(2);",
        None,
    )
    .unwrap();
    db.exec("DROP TABLE t", None).unwrap();

    let err = db.exec("SELECT * FROM t", None).unwrap_err();
    assert!(err.to_string().contains("no such table"));

    db.exec("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (9);", None)
        .unwrap();
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 1);
}

#[test]
fn begin_twice_is_misuse() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    db.begin().unwrap();
    let err = db.begin().unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Misuse);
    assert_eq!(db.errcode(), ErrorCode::Misuse.as_i32());

    // Commit and rollback outside a transaction are no-ops.
    db.commit().unwrap();
    db.commit().unwrap();
    db.rollback().unwrap();
}

#[test]
fn savepoint_misuse_and_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    let err = db.savepoint("s").unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Misuse);

    db.begin().unwrap();
    db.savepoint("s").unwrap();
    let err = db.savepoint("s").unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Constraint);

    let err = db.release("missing").unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::NotFound);

    db.release("s").unwrap();
    db.rollback().unwrap();
}

#[test]
fn bind_out_of_range() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (v INTEGER)", None).unwrap();

    let (stmt, _) = db.prepare("SELECT v FROM t WHERE v = ?").unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.param_count(), 1);

    let err = stmt.bind_int64(2, 5).unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Range);
    let err = stmt.bind_int64(0, 5).unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Range);
}

#[test]
fn insert_with_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (a INTEGER, b TEXT)", None).unwrap();

    let (stmt, _) = db.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
    let mut stmt = stmt.unwrap();
    for (a, b) in [(1, "one"), (2, "two")] {
        stmt.reset().unwrap();
        stmt.bind_int64(1, a).unwrap();
        stmt.bind_text(2, b).unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
    }

    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 2);
    assert_eq!(db.last_insert_rowid(), 2);
}

#[test]
fn blob_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (data BLOB)", None).unwrap();

    let payload = vec![0u8, 1, 2, 253, 254, 255];
    let (stmt, _) = db.prepare("INSERT INTO t VALUES (?)").unwrap();
    let mut stmt = stmt.unwrap();
    stmt.bind_blob(1, &payload).unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Done);
    drop(stmt);

    let (stmt, _) = db.prepare("SELECT data FROM t").unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_blob(0), Some(payload.as_slice()));
    assert_eq!(stmt.column_value(0), Some(&Value::Blob(payload.clone())));
}

#[test]
fn schema_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");

    {
        let db = Database::open(&path).unwrap();
        db.exec(
            "CREATE TABLE t (id INTEGER, name TEXT); \
             INSERT INTO t VALUES (1,'keep'),(2,'these');",
            None,
        )
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path).unwrap();
    let rows = query(&db, "SELECT name FROM t ORDER BY id");
    assert_eq!(
        rows,
        vec![
            vec![Some("keep".to_string())],
            vec![Some("these".to_string())],
        ]
    );
}

#[test]
fn rowids_continue_within_a_session_after_reopen_data_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");

    {
        let db = Database::open(&path).unwrap();
        db.exec(
            "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1),(2),(3);",
            None,
        )
        .unwrap();
        db.close().unwrap();
    }

    let db = Database::open(&path).unwrap();
    db.exec("INSERT INTO t VALUES (4)", None).unwrap();
    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 4);
}

#[test]
fn many_rows_force_tree_growth() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec("CREATE TABLE t (n INTEGER, tag TEXT)", None).unwrap();

    let (stmt, _) = db.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
    let mut stmt = stmt.unwrap();
    for n in 0..3000i64 {
        stmt.reset().unwrap();
        stmt.bind_int64(1, n).unwrap();
        stmt.bind_text(2, &format!("row-{:05}", n)).unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Done);
    }
    drop(stmt);

    assert_eq!(single_i64(&db, "SELECT COUNT(*) FROM t"), 3000);
    assert_eq!(single_i64(&db, "SELECT MIN(n) FROM t"), 0);
    assert_eq!(single_i64(&db, "SELECT MAX(n) FROM t"), 2999);
    assert_eq!(
        single_i64(&db, "SELECT COUNT(*) FROM t WHERE n >= 1500"),
        1500
    );
}

#[test]
fn in_memory_database() {
    let db = Database::open(":memory:").unwrap();
    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (42);",
        None,
    )
    .unwrap();
    assert_eq!(single_i64(&db, "SELECT v FROM t"), 42);
}

#[test]
fn exec_callback_receives_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7),(8);",
        None,
    )
    .unwrap();

    let mut seen = Vec::new();
    let mut cb = |names: &[String], values: &[Option<String>]| {
        assert_eq!(names[0], "v");
        seen.push(values[0].clone());
        true
    };
    db.exec("SELECT v FROM t ORDER BY v", Some(&mut cb)).unwrap();
    assert_eq!(seen, vec![Some("7".to_string()), Some("8".to_string())]);
}

#[test]
fn parse_error_sets_error_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);

    let err = db.exec("SELEC 1", None).unwrap_err();
    assert_eq!(ErrorCode::of(&err), ErrorCode::Error);
    assert_eq!(db.errcode(), ErrorCode::Error.as_i32());
    assert!(!db.errmsg().is_empty());
}

#[test]
fn column_names_use_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec(
        "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);",
        None,
    )
    .unwrap();

    let (stmt, _) = db
        .prepare("SELECT v AS renamed, v + 1, COUNT(*) FROM t")
        .unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_name(0), Some("renamed"));
    assert_eq!(stmt.column_name(1), Some("column1"));
    assert_eq!(stmt.column_name(2), Some("COUNT"));
}

#[test]
fn select_star_expands_all_columns() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir);
    db.exec(
        "CREATE TABLE t (a INTEGER, b TEXT); INSERT INTO t VALUES (5,'five');",
        None,
    )
    .unwrap();

    let (stmt, _) = db.prepare("SELECT * FROM t").unwrap();
    let mut stmt = stmt.unwrap();
    assert_eq!(stmt.step().unwrap(), StepResult::Row);
    assert_eq!(stmt.column_count(), 2);
    assert_eq!(stmt.column_name(0), Some("a"));
    assert_eq!(stmt.column_name(1), Some("b"));
    assert_eq!(stmt.column_int64(0), 5);
}
