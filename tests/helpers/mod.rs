#![allow(dead_code)]

use db_reset::reset::{ForeignKeyConstraint, SchemaGraphReader};
use rusqlite::Connection;

/// Appeal-case schema exercising every shape the reset has to handle:
/// composite and implicit-key references, a self reference, a nullable
/// composite cycle, every referential action, a WITHOUT ROWID table, a
/// reserved-word table name, plus an index, a trigger, a view, CHECK
/// constraints and a migration bookkeeping table.
pub const SCHEMA: &str = r#"
CREATE TABLE _schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE "user" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE
);

CREATE TABLE lpa (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);

CREATE TABLE appeal (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference TEXT NOT NULL UNIQUE,
    lpa_id INTEGER NOT NULL REFERENCES lpa (id),
    case_officer_id INTEGER,
    parent_appeal_id INTEGER,
    status TEXT NOT NULL DEFAULT 'received'
        CHECK (status IN ('received', 'validation', 'complete')),
    CONSTRAINT appeal_case_officer_fk FOREIGN KEY (case_officer_id)
        REFERENCES "user" (id) ON DELETE SET NULL,
    CONSTRAINT appeal_parent_fk FOREIGN KEY (parent_appeal_id) REFERENCES appeal (id)
);
CREATE INDEX appeal_lpa_idx ON appeal (lpa_id);

CREATE TABLE appellant_case (
    id INTEGER PRIMARY KEY,
    appeal_id INTEGER NOT NULL UNIQUE REFERENCES appeal (id),
    site_area REAL CHECK (site_area IS NULL OR site_area > 0)
);

CREATE TABLE incomplete_reason (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    has_text INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE reason_selection (
    appellant_case_id INTEGER NOT NULL REFERENCES appellant_case (id),
    reason_id INTEGER NOT NULL REFERENCES incomplete_reason,
    PRIMARY KEY (appellant_case_id, reason_id)
) WITHOUT ROWID;

CREATE TABLE reason_selection_text (
    id INTEGER PRIMARY KEY,
    appellant_case_id INTEGER NOT NULL,
    reason_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    FOREIGN KEY (appellant_case_id, reason_id)
        REFERENCES reason_selection (appellant_case_id, reason_id)
        ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE folder (
    id INTEGER PRIMARY KEY,
    appeal_id INTEGER NOT NULL REFERENCES appeal (id) ON DELETE CASCADE,
    path TEXT NOT NULL
);

CREATE TABLE document (
    guid TEXT PRIMARY KEY,
    folder_id INTEGER NOT NULL REFERENCES folder (id),
    latest_version INTEGER,
    name TEXT NOT NULL,
    FOREIGN KEY (guid, latest_version) REFERENCES document_version (document_guid, version)
);

CREATE TABLE document_version (
    document_guid TEXT NOT NULL REFERENCES document (guid),
    version INTEGER NOT NULL,
    blob_uri TEXT,
    PRIMARY KEY (document_guid, version)
);

CREATE TABLE neighbouring_site (
    id INTEGER PRIMARY KEY,
    appeal_id INTEGER REFERENCES appeal (id) ON DELETE SET NULL,
    address TEXT NOT NULL
);

CREATE TABLE audit_trail (
    appeal_id INTEGER NOT NULL REFERENCES appeal (id) ON DELETE RESTRICT,
    user_id INTEGER REFERENCES "user" (id),
    details TEXT NOT NULL
);

CREATE TRIGGER appeal_status_audit AFTER UPDATE OF status ON appeal BEGIN
    INSERT INTO audit_trail (appeal_id, details) VALUES (NEW.id, 'status: ' || NEW.status);
END;

CREATE VIEW appeal_summary AS
    SELECT a.reference, l.code FROM appeal AS a JOIN lpa AS l ON l.id = a.lpa_id;
"#;

/// Two appeal trees: appeal 1 with linked child appeal 2, and unrelated
/// appeal 3.
pub const DATA: &str = r#"
INSERT INTO _schema_migrations VALUES ('0001_init', '2024-01-01T00:00:00Z');
INSERT INTO "user" (id, email) VALUES (1, 'officer@example.gov'), (2, 'admin@example.gov');
INSERT INTO lpa VALUES (1, 'Q9999', 'System Test Borough');

INSERT INTO appeal (id, reference, lpa_id, case_officer_id, parent_appeal_id)
    VALUES (1, 'APP/Q9999/W/24/0000001', 1, 1, NULL),
           (2, 'APP/Q9999/W/24/0000002', 1, 1, 1),
           (3, 'APP/Q9999/W/24/0000003', 1, 2, NULL);

INSERT INTO appellant_case VALUES (10, 1, 120.5), (20, 2, NULL), (30, 3, 40.0);
INSERT INTO incomplete_reason VALUES (1, 'Missing plans', 1), (2, 'Other', 0);
INSERT INTO reason_selection VALUES (10, 1), (10, 2), (30, 1);
INSERT INTO reason_selection_text VALUES (1, 10, 1, 'Site plan missing'), (2, 30, 1, 'No elevations');

INSERT INTO folder VALUES (100, 1, '/appellant-case'), (300, 3, '/appellant-case');
INSERT INTO document (guid, folder_id, latest_version, name)
    VALUES ('doc-a', 100, NULL, 'plans.pdf'), ('doc-c', 300, NULL, 'statement.pdf');
INSERT INTO document_version VALUES ('doc-a', 1, 'blob://a1'), ('doc-a', 2, 'blob://a2'),
    ('doc-c', 1, 'blob://c1');
UPDATE document SET latest_version = 2 WHERE guid = 'doc-a';
UPDATE document SET latest_version = 1 WHERE guid = 'doc-c';

INSERT INTO neighbouring_site VALUES (1, 1, '1 Next Door'), (2, 3, '3 Over The Road');
UPDATE appeal SET status = 'validation' WHERE id IN (1, 3);
"#;

/// Open a fresh in-memory database with the fixture schema, no rows.
pub fn empty_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

/// Open a fresh in-memory database with the fixture schema and data.
pub fn test_db() -> Connection {
    let conn = empty_db();
    conn.execute_batch(DATA).unwrap();
    conn
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

pub fn foreign_keys(conn: &Connection) -> Vec<ForeignKeyConstraint> {
    SchemaGraphReader::new(conn, "main").list_foreign_keys().unwrap()
}

/// Raw `foreign_key_check` rows across the whole database.
pub fn violations(conn: &Connection) -> usize {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check").unwrap();
    let rows = stmt.query_map([], |_| Ok(())).unwrap();
    rows.count()
}

/// Every rows-bearing table of the fixture, bookkeeping first.
pub const TABLES: &[&str] = &[
    "_schema_migrations",
    "\"user\"",
    "lpa",
    "appeal",
    "appellant_case",
    "incomplete_reason",
    "reason_selection",
    "reason_selection_text",
    "folder",
    "document",
    "document_version",
    "neighbouring_site",
    "audit_trail",
];
