//! Truncation of every base table.
//!
//! SQLite has no `TRUNCATE`; rows go with `DELETE FROM`. Triggers on the
//! emptied tables are dropped for the duration and replayed in the same
//! transaction, so per-row delete triggers cannot refill a table that was
//! already emptied.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::db::catalog::{self, Catalog, StoredTrigger, TableInfo};
use crate::db::sql;
use crate::reset::error::{ResetError, Result};
use crate::reset::types::TableRef;

#[derive(Debug, Clone, Serialize)]
pub struct TruncatedTable {
    pub table: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TruncateReport {
    pub tables: Vec<TruncatedTable>,
    /// Bookkeeping tables left untouched.
    pub skipped: Vec<String>,
}

impl TruncateReport {
    pub fn rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

pub struct TableTruncator<'a> {
    catalog: &'a Catalog,
    bookkeeping: &'a [String],
}

impl<'a> TableTruncator<'a> {
    /// `bookkeeping` names migration-tracking tables that survive a reset.
    pub fn new(catalog: &'a Catalog, bookkeeping: &'a [String]) -> Self {
        Self {
            catalog,
            bookkeeping,
        }
    }

    fn is_bookkeeping(&self, table: &TableInfo) -> bool {
        self.bookkeeping
            .iter()
            .any(|b| b.eq_ignore_ascii_case(table.name()))
    }

    /// Base tables that `truncate_all` will empty, in name order.
    pub fn targets(&self) -> Vec<&'a TableInfo> {
        self.catalog
            .tables()
            .filter(|t| !self.is_bookkeeping(t))
            .collect()
    }

    /// Empty every non-bookkeeping table in one transaction and restart
    /// their `AUTOINCREMENT` counters. Foreign keys must already be gone.
    pub fn truncate_all(&self, conn: &mut Connection) -> Result<TruncateReport> {
        let has_sequence = sequence_table_exists(conn, self.catalog.schema()).map_err(ResetError::Introspection)?;
        let targets = self.targets();
        let mut report = TruncateReport {
            tables: Vec::with_capacity(targets.len()),
            skipped: self
                .catalog
                .tables()
                .filter(|t| self.is_bookkeeping(t))
                .map(|t| t.name().to_string())
                .collect(),
        };

        let triggers: Vec<_> = catalog::triggers(conn, self.catalog.schema())
            .map_err(ResetError::Introspection)?
            .into_iter()
            .filter(|t| targets.iter().any(|table| table.name().eq_ignore_ascii_case(&t.table)))
            .collect();

        let tx = conn.transaction().map_err(ResetError::Transaction)?;
        for trigger in &triggers {
            tx.execute(
                &format!(
                    "DROP TRIGGER {}.{}",
                    sql::quote_ident(self.catalog.schema()),
                    sql::quote_ident(&trigger.name)
                ),
                [],
            )
            .map_err(|source| trigger_error(self.catalog, trigger, source))?;
        }
        for table in &targets {
            let truncate_error = |source| ResetError::Truncate {
                table: table.table.clone(),
                source,
            };
            let rows = sql::delete_all(&table.ident())
                .execute(&tx)
                .map_err(truncate_error)?;
            if has_sequence {
                tx.execute(
                    &format!(
                        "DELETE FROM {}.sqlite_sequence WHERE name = ?1",
                        sql::quote_ident(self.catalog.schema())
                    ),
                    params![table.name()],
                )
                .map_err(truncate_error)?;
            }
            tracing::debug!(table = %table.table, rows, "table truncated");
            report.tables.push(TruncatedTable {
                table: table.name().to_string(),
                rows,
            });
        }
        for trigger in &triggers {
            tx.execute_batch(&trigger.sql)
                .map_err(|source| trigger_error(self.catalog, trigger, source))?;
        }
        tx.commit().map_err(ResetError::Transaction)?;

        tracing::info!(
            tables = report.tables.len(),
            rows = report.rows(),
            skipped = report.skipped.len(),
            triggers = triggers.len(),
            "tables truncated"
        );
        Ok(report)
    }
}

fn trigger_error(catalog: &Catalog, trigger: &StoredTrigger, source: rusqlite::Error) -> ResetError {
    ResetError::Truncate {
        table: TableRef::new(catalog.schema(), &trigger.table),
        source,
    }
}

fn sequence_table_exists(conn: &Connection, schema: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            sql::quote_ident(schema)
        ),
        [],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}
