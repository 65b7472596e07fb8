pub mod catalog;
pub mod ddl;
pub mod rebuild;
pub mod sql;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open an existing database for maintenance.
///
/// Unlike an application connection this never creates the file: resetting
/// a database that does not exist is always a mistake in the target path.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "database not found at {}", path.display());

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Referential integrity is enforced for everything except table rebuilds
    conn.pragma_update(None, "foreign_keys", "ON")?;

    tracing::info!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Open an in-memory database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_to_create_a_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        assert!(open_database(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn connections_enforce_foreign_keys() {
        let conn = open_memory_database().unwrap();
        let on: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(on);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        Connection::open(&path).unwrap();
        let conn = open_database(&path).unwrap();
        let on: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(on);
    }
}
