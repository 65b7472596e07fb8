//! SQLite table rebuild.
//!
//! Creates a staging table from edited DDL, copies every row across, drops
//! the original, renames the staging table into place and replays the
//! original's indexes and triggers, all in one transaction. Must run inside
//! [`with_schema_edits`] so foreign keys are not enforced mid-rebuild and the
//! rename leaves references in other tables alone.

use rusqlite::{params, Connection};

use crate::db::catalog::{companion_sql, TableInfo, ROWID};
use crate::db::sql::{self, quote_ident, Ident};

const STAGING_TABLE: &str = "__db_reset_staging";

/// Schema-qualified identifier the edited DDL must be renamed to.
pub fn staging_ident(table: &TableInfo) -> Ident {
    Ident::qualified(&table.table.schema, STAGING_TABLE)
}

/// Run `f` with `foreign_keys = OFF` and `legacy_alter_table = ON`, then
/// restore both to their previous values.
pub fn with_schema_edits<T>(
    conn: &mut Connection,
    f: impl FnOnce(&mut Connection) -> T,
) -> rusqlite::Result<T> {
    let foreign_keys: bool = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    let legacy: bool = conn.pragma_query_value(None, "legacy_alter_table", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", false)?;
    conn.pragma_update(None, "legacy_alter_table", true)?;

    let out = f(conn);

    if let Err(e) = conn.pragma_update(None, "legacy_alter_table", legacy) {
        tracing::warn!(error = %e, "failed to restore legacy_alter_table");
    }
    if let Err(e) = conn.pragma_update(None, "foreign_keys", foreign_keys) {
        tracing::warn!(error = %e, "failed to restore foreign_keys");
    }
    Ok(out)
}

/// Replace `table` with one created by `staging_sql`, which must create
/// [`staging_ident`]. When `check` is set, `foreign_key_check` runs on the
/// rebuilt table before commit; any violation rolls the rebuild back and
/// the violation count is returned.
pub fn rebuild_table(
    conn: &mut Connection,
    table: &TableInfo,
    staging_sql: &str,
    check: bool,
) -> rusqlite::Result<usize> {
    let companions = companion_sql(conn, &table.table)?;
    let staging = staging_ident(table);
    let target = table.ident();

    let mut columns = table.stored_columns();
    // Rowid tables without a declared key keep their rowids
    let shadowed = table
        .columns
        .iter()
        .any(|c| c.name.eq_ignore_ascii_case(ROWID));
    if table.primary_key().is_empty() && !table.without_rowid && !shadowed {
        columns.insert(0, Ident::new(ROWID));
    }
    let columns = sql::join(&columns);

    let tx = conn.transaction()?;
    tx.execute(staging_sql, [])?;
    tx.execute(
        &format!("INSERT INTO {staging} ({columns}) SELECT {columns} FROM {target}"),
        [],
    )?;
    tx.execute(&format!("DROP TABLE {target}"), [])?;
    tx.execute(
        &format!("ALTER TABLE {staging} RENAME TO {}", quote_ident(table.name())),
        [],
    )?;
    for ddl in &companions {
        tx.execute_batch(ddl)?;
    }

    if check {
        let violations: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pragma_foreign_key_check(?1, ?2)",
            params![table.table.name, table.table.schema],
            |row| row.get(0),
        )?;
        if violations > 0 {
            // Dropping the transaction rolls the rebuild back
            return Ok(violations as usize);
        }
    }

    tx.commit()?;
    tracing::debug!(table = %table.table, indexes_and_triggers = companions.len(), "table rebuilt");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::Catalog;
    use crate::db::ddl::CreateTable;

    #[test]
    fn rebuild_keeps_rows_indexes_and_triggers() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE log (body TEXT NOT NULL CHECK (body <> ''));
             CREATE INDEX idx_log_body ON log(body);
             CREATE TABLE audit (n INTEGER);
             CREATE TRIGGER log_audit AFTER INSERT ON log BEGIN INSERT INTO audit VALUES (1); END;
             INSERT INTO log VALUES ('a'), ('b');
             DELETE FROM log WHERE body = 'a';",
        )
        .unwrap();
        let rowid_before: i64 = conn
            .query_row("SELECT rowid FROM log WHERE body = 'b'", [], |r| r.get(0))
            .unwrap();

        let catalog = Catalog::load(&conn, "main").unwrap();
        let table = catalog.table("log").unwrap().clone();
        let sql = crate::db::catalog::table_sql(&conn, &table.table).unwrap();
        let staging_sql = CreateTable::parse(&sql)
            .unwrap()
            .renamed(staging_ident(&table).as_sql());

        let violations = with_schema_edits(&mut conn, |conn| rebuild_table(conn, &table, &staging_sql, true))
            .unwrap()
            .unwrap();
        assert_eq!(violations, 0);

        let rowid_after: i64 = conn
            .query_row("SELECT rowid FROM log WHERE body = 'b'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rowid_before, rowid_after);

        let index: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('idx_log_body', 'log_audit')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(index, 2);
        assert!(conn.execute("INSERT INTO log VALUES ('')", []).is_err());
    }

    #[test]
    fn schema_edit_pragmas_are_restored() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        let inside = with_schema_edits(&mut conn, |conn| {
            conn.pragma_query_value(None, "foreign_keys", |r| r.get::<_, bool>(0))
                .unwrap()
        })
        .unwrap();
        assert!(!inside);
        let after: bool = conn
            .pragma_query_value(None, "foreign_keys", |r| r.get(0))
            .unwrap();
        assert!(after);
    }
}
