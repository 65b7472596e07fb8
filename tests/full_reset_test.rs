mod helpers;

use db_reset::reset::{run_full_reset, FullReset, ResetError, ResetOptions, ResetPhase};
use helpers::{count, foreign_keys, test_db, violations, TABLES};

#[test]
fn round_trip_restores_identical_constraints() {
    let mut conn = test_db();
    let before = foreign_keys(&conn);
    assert_eq!(before.len(), 14);

    let report = run_full_reset(&mut conn, &ResetOptions::default()).unwrap();
    assert_eq!(report.phase, ResetPhase::Verified);
    assert_eq!(report.constraints, before.len());

    // Names, columns, actions and order of columns all survive
    assert_eq!(foreign_keys(&conn), before);
    assert_eq!(violations(&conn), 0);
}

#[test]
fn every_table_but_bookkeeping_is_emptied() {
    let mut conn = test_db();
    let report = run_full_reset(&mut conn, &ResetOptions::default()).unwrap();

    assert_eq!(count(&conn, "_schema_migrations"), 1);
    for table in &TABLES[1..] {
        assert_eq!(count(&conn, table), 0, "{table} should be empty");
    }
    assert_eq!(report.truncated.skipped, ["_schema_migrations"]);
    assert_eq!(report.truncated.tables.len(), TABLES.len() - 1);
    assert!(report.truncated.rows() > 20);
}

#[test]
fn indexes_triggers_views_and_checks_survive() {
    let mut conn = test_db();
    run_full_reset(&mut conn, &ResetOptions::default()).unwrap();

    let objects: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE name IN ('appeal_lpa_idx', 'appeal_status_audit', 'appeal_summary')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(objects, 3);

    conn.execute_batch(
        "INSERT INTO lpa VALUES (1, 'Q1111', 'Fresh Borough');
         INSERT INTO appeal (reference, lpa_id) VALUES ('APP/Q1111/W/24/0000001', 1);",
    )
    .unwrap();

    // AUTOINCREMENT restarted
    let id: i64 = conn
        .query_row("SELECT id FROM appeal", [], |row| row.get(0))
        .unwrap();
    assert_eq!(id, 1);

    // CHECK constraint still enforced
    assert!(conn
        .execute("UPDATE appeal SET status = 'bogus' WHERE id = 1", [])
        .is_err());

    // Trigger still fires
    conn.execute("UPDATE appeal SET status = 'complete' WHERE id = 1", [])
        .unwrap();
    assert_eq!(count(&conn, "audit_trail"), 1);

    // View still resolves
    let code: String = conn
        .query_row("SELECT code FROM appeal_summary", [], |row| row.get(0))
        .unwrap();
    assert_eq!(code, "Q1111");
}

#[test]
fn restored_constraints_are_enforced() {
    let mut conn = test_db();
    run_full_reset(&mut conn, &ResetOptions::default()).unwrap();

    let orphan = conn.execute(
        "INSERT INTO appeal (reference, lpa_id) VALUES ('APP/X/W/24/9', 42)",
        [],
    );
    assert!(orphan.is_err());
}

#[test]
fn custom_bookkeeping_tables_are_kept() {
    let mut conn = test_db();
    let options = ResetOptions {
        bookkeeping_tables: vec!["_schema_migrations".into(), "incomplete_reason".into()],
        ..ResetOptions::default()
    };

    // incomplete_reason is referenced by reason_selection, which is emptied
    run_full_reset(&mut conn, &options).unwrap();
    assert_eq!(count(&conn, "incomplete_reason"), 2);
    assert_eq!(count(&conn, "reason_selection"), 0);
}

#[test]
fn restoring_over_orphans_fails_and_names_the_constraint() {
    let mut conn = test_db();
    // appeal keeps rows whose lpa and case officer are truncated away
    let options = ResetOptions {
        bookkeeping_tables: vec!["appeal".into()],
        ..ResetOptions::default()
    };

    let truncated = FullReset::begin(&mut conn, &options)
        .unwrap()
        .drop_constraints()
        .unwrap()
        .truncate()
        .unwrap();
    assert_eq!(truncated.phase(), ResetPhase::Truncated);

    match truncated.restore_constraints() {
        Err(ResetError::ForeignKeyViolation {
            table, violations, ..
        }) => {
            assert_eq!(table.name, "appeal");
            assert!(violations > 0);
        }
        Err(other) => panic!("expected a violation, got {other}"),
        Ok(_) => panic!("expected a violation"),
    }
}

#[test]
fn delete_triggers_cannot_refill_truncated_tables() {
    let mut conn = test_db();
    // a_log sorts before appeal, so it is emptied first
    conn.execute_batch(
        "CREATE TABLE a_log (appeal_id INTEGER NOT NULL, reference TEXT NOT NULL);
         CREATE TRIGGER appeal_deleted AFTER DELETE ON appeal
         BEGIN INSERT INTO a_log VALUES (old.id, old.reference); END;
         CREATE TRIGGER appellant_case_deleted AFTER DELETE ON appellant_case
         BEGIN INSERT INTO a_log VALUES (old.appeal_id, 'case'); END;",
    )
    .unwrap();

    let report = run_full_reset(&mut conn, &ResetOptions::default()).unwrap();
    assert_eq!(report.phase, ResetPhase::Verified);

    assert_eq!(count(&conn, "a_log"), 0);
    for table in &TABLES[1..] {
        assert_eq!(count(&conn, table), 0, "{table} should be empty");
    }

    // Both triggers were put back
    let triggers: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' \
             AND name IN ('appeal_deleted', 'appellant_case_deleted', 'appeal_status_audit')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(triggers, 3);
}
