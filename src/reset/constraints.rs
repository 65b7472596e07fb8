//! Bulk drop, recreate and verification of foreign-key constraints.
//!
//! Each drop or recreate edits the owning table's stored DDL by exactly one
//! clause and rebuilds the table. A failure part-way leaves earlier
//! constraints dropped (or recreated); there is no compensating rollback.

use rusqlite::Connection;
use std::collections::BTreeMap;

use crate::db::catalog::{table_sql, Catalog, TableInfo};
use crate::db::ddl::{render_foreign_key, CreateTable};
use crate::db::rebuild::{rebuild_table, staging_ident, with_schema_edits};
use crate::reset::error::{ResetError, Result};
use crate::reset::types::ForeignKeyConstraint;

pub struct ConstraintLifecycleManager<'c> {
    conn: &'c mut Connection,
    catalog: &'c Catalog,
}

impl<'c> ConstraintLifecycleManager<'c> {
    pub fn new(conn: &'c mut Connection, catalog: &'c Catalog) -> Self {
        Self { conn, catalog }
    }

    /// Drop every constraint, one rebuild per constraint, in list order.
    pub fn drop_all(&mut self, constraints: &[ForeignKeyConstraint]) -> Result<()> {
        let catalog = self.catalog;
        let outcome = with_schema_edits(self.conn, |conn| -> Result<()> {
            for fk in constraints {
                drop_one(conn, catalog, fk)?;
            }
            Ok(())
        });
        flatten(outcome, constraints.first())?;
        tracing::info!(constraints = constraints.len(), "foreign keys dropped");
        Ok(())
    }

    /// Recreate every constraint in captured order. Each rebuilt table must
    /// pass `foreign_key_check` before its rebuild commits.
    pub fn recreate_all(&mut self, constraints: &[ForeignKeyConstraint]) -> Result<()> {
        let catalog = self.catalog;
        let outcome = with_schema_edits(self.conn, |conn| -> Result<()> {
            for fk in constraints {
                recreate_one(conn, catalog, fk)?;
            }
            Ok(())
        });
        flatten(outcome, constraints.first())?;
        tracing::info!(constraints = constraints.len(), "foreign keys recreated");
        Ok(())
    }
}

/// A pragma failure around the edits surfaces as a drop failure of the
/// first constraint; nothing was edited yet at that point.
fn flatten(
    outcome: rusqlite::Result<Result<()>>,
    first: Option<&ForeignKeyConstraint>,
) -> Result<()> {
    match outcome {
        Ok(inner) => inner,
        Err(source) => match first {
            Some(fk) => Err(ResetError::Drop {
                constraint: fk.name.clone(),
                table: fk.table.clone(),
                source,
            }),
            None => Ok(()),
        },
    }
}

fn owning_table<'a>(catalog: &'a Catalog, fk: &ForeignKeyConstraint) -> Result<&'a TableInfo> {
    catalog.table(&fk.table.name)
}

fn drop_one(conn: &mut Connection, catalog: &Catalog, fk: &ForeignKeyConstraint) -> Result<()> {
    let table = owning_table(catalog, fk)?;
    let drop_error = |source| ResetError::Drop {
        constraint: fk.name.clone(),
        table: fk.table.clone(),
        source,
    };
    let ddl_error = |source| ResetError::Ddl {
        table: fk.table.clone(),
        source,
    };

    let sql = table_sql(conn, &table.table).map_err(drop_error)?;
    let parsed = CreateTable::parse(&sql).map_err(ddl_error)?;
    let clauses = parsed.foreign_keys().map_err(ddl_error)?;
    let clause = clauses
        .iter()
        .find(|c| c.matches(fk))
        .ok_or_else(|| ResetError::ConstraintMissing {
            constraint: fk.name.clone(),
            table: fk.table.clone(),
        })?;

    let edited = parsed.without(clause);
    let staging_sql = CreateTable::parse(&edited)
        .map_err(ddl_error)?
        .renamed(staging_ident(table).as_sql());
    rebuild_table(conn, table, &staging_sql, false).map_err(drop_error)?;

    tracing::debug!(constraint = %fk.name, table = %fk.table, "foreign key dropped");
    Ok(())
}

fn recreate_one(conn: &mut Connection, catalog: &Catalog, fk: &ForeignKeyConstraint) -> Result<()> {
    let table = owning_table(catalog, fk)?;
    let recreate_error = |source| ResetError::Recreate {
        constraint: fk.name.clone(),
        table: fk.table.clone(),
        source,
    };
    let ddl_error = |source| ResetError::Ddl {
        table: fk.table.clone(),
        source,
    };

    let sql = table_sql(conn, &table.table).map_err(recreate_error)?;
    let parsed = CreateTable::parse(&sql).map_err(ddl_error)?;
    if parsed.foreign_keys().map_err(ddl_error)?.iter().any(|c| c.matches(fk)) {
        return Err(ResetError::ConstraintPresent {
            constraint: fk.name.clone(),
            table: fk.table.clone(),
        });
    }

    let edited = parsed.with_constraint(&render_foreign_key(fk));
    let staging_sql = CreateTable::parse(&edited)
        .map_err(ddl_error)?
        .renamed(staging_ident(table).as_sql());
    let violations = rebuild_table(conn, table, &staging_sql, true).map_err(recreate_error)?;
    if violations > 0 {
        return Err(ResetError::ForeignKeyViolation {
            constraint: fk.name.clone(),
            table: fk.table.clone(),
            violations,
        });
    }

    tracing::debug!(constraint = %fk.name, table = %fk.table, "foreign key recreated");
    Ok(())
}

/// Order-independent equality of two constraint sets.
///
/// Fails with the constraints present only before (`missing`) and only
/// after (`unexpected`). Duplicates are counted, so a constraint captured
/// twice must come back twice.
pub fn verify(before: &[ForeignKeyConstraint], after: &[ForeignKeyConstraint]) -> Result<()> {
    let mut balance: BTreeMap<&ForeignKeyConstraint, i64> = BTreeMap::new();
    for fk in before {
        *balance.entry(fk).or_default() += 1;
    }
    for fk in after {
        *balance.entry(fk).or_default() -= 1;
    }

    let mut missing = Vec::new();
    let mut unexpected = Vec::new();
    for (fk, n) in balance {
        for _ in 0..n.max(0) {
            missing.push(fk.clone());
        }
        for _ in 0..(-n).max(0) {
            unexpected.push(fk.clone());
        }
    }

    if missing.is_empty() && unexpected.is_empty() {
        tracing::info!(constraints = before.len(), "foreign keys verified");
        return Ok(());
    }
    for fk in &missing {
        tracing::error!(constraint = %fk, "missing after reset");
    }
    for fk in &unexpected {
        tracing::error!(constraint = %fk, "unexpected after reset");
    }
    Err(ResetError::VerificationMismatch {
        missing,
        unexpected,
    })
}
