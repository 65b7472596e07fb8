//! Execution of a [`DeletePlan`] against a set of root ids.
//!
//! Key sets are resolved into temp tables before anything is mutated, so
//! later deletes cannot hide rows that still need to go. Nulling updates run
//! one by one in autocommit; all deletes then share a single transaction.
//! A failed delete rolls back every delete but not the nulling updates.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::catalog::{Catalog, TableInfo};
use crate::db::sql::{self, Filter, Ident};
use crate::reset::batch::{BatchStats, BatchedBulkDeleter, TableBatchTarget};
use crate::reset::error::{ResetError, Result};
use crate::reset::planner::{DeletePlan, StepAction};
use crate::reset::types::TableRef;

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub table: String,
    /// `delete` or `nullify`.
    pub action: &'static str,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<BatchStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectiveReport {
    pub root: String,
    pub root_ids: usize,
    /// Keys resolved per table before mutation.
    pub resolved: BTreeMap<String, usize>,
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SelectiveReport {
    pub fn deleted(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == "delete")
            .map(|s| s.rows)
            .sum()
    }
}

/// Temp table holding the resolved keys of one plan table.
struct KeySet<'a> {
    info: &'a TableInfo,
    set: Ident,
}

pub struct SelectiveReset<'a> {
    catalog: &'a Catalog,
    plan: &'a DeletePlan,
    deleter: BatchedBulkDeleter,
}

impl<'a> SelectiveReset<'a> {
    pub fn new(catalog: &'a Catalog, plan: &'a DeletePlan, batch_size: usize) -> Self {
        Self {
            catalog,
            plan,
            deleter: BatchedBulkDeleter::new(batch_size),
        }
    }

    /// Remove the root rows matching `root_ids` and everything the plan
    /// reaches from them.
    pub fn execute(&self, conn: &mut Connection, root_ids: &[Value]) -> Result<SelectiveReport> {
        let started_at = Utc::now();
        let sets = self.key_sets()?;

        let outcome = self.run(conn, &sets, root_ids);
        for key_set in sets.values() {
            if let Err(e) = conn.execute(&format!("DROP TABLE IF EXISTS {}", key_set.set), []) {
                tracing::warn!(error = %e, table = %key_set.set, "failed to drop key table");
            }
        }
        let (resolved, steps) = outcome?;

        let report = SelectiveReport {
            root: self.plan.root().name.clone(),
            root_ids: root_ids.len(),
            resolved,
            steps,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            root = %report.root,
            root_ids = report.root_ids,
            deleted = report.deleted(),
            "selective reset finished"
        );
        Ok(report)
    }

    fn key_sets(&self) -> Result<BTreeMap<&'a TableRef, KeySet<'a>>> {
        self.plan
            .tables()
            .into_iter()
            .enumerate()
            .map(|(n, table)| -> Result<(&'a TableRef, KeySet<'a>)> {
                let info = self.catalog.table(&table.name)?;
                let set = Ident::qualified("temp", &format!("db_reset_keys_{n}"));
                Ok((table, KeySet { info, set }))
            })
            .collect()
    }

    #[allow(clippy::type_complexity)]
    fn run(
        &self,
        conn: &mut Connection,
        sets: &BTreeMap<&TableRef, KeySet<'_>>,
        root_ids: &[Value],
    ) -> Result<(BTreeMap<String, usize>, Vec<StepOutcome>)> {
        for key_set in sets.values() {
            create_key_table(conn, key_set).map_err(|source| ResetError::Resolve {
                table: key_set.info.name().to_string(),
                source,
            })?;
        }
        self.seed_root(conn, sets, root_ids)?;
        self.propagate(conn, sets)?;
        let mut resolved = BTreeMap::new();
        for key_set in sets.values() {
            let keys = count(conn, &key_set.set).map_err(|source| resolve_error(key_set, source))?;
            resolved.insert(key_set.info.name().to_string(), keys);
        }
        tracing::debug!(?resolved, "key sets resolved");

        let mut steps = Vec::new();
        for step in self.plan.nullify_steps() {
            let StepAction::Nullify { columns, .. } = &step.action else {
                continue;
            };
            let key_set = key_set_for(sets, &step.table)?;
            let nullify_error = |source| ResetError::Nullify {
                table: step.table.name.clone(),
                columns: columns.clone(),
                source,
            };
            let targets = key_set.info.columns_idents(columns)?;
            let rows = sql::set_null(&key_set.info.ident(), &targets, &key_filter(key_set))
                .execute(conn)
                .map_err(nullify_error)?;
            tracing::info!(table = %step.table, ?columns, rows, "references nulled");
            steps.push(StepOutcome {
                table: step.table.name.clone(),
                action: "nullify",
                rows,
                batches: None,
            });
        }

        let tx = conn.transaction().map_err(ResetError::Transaction)?;
        for step in self.plan.delete_steps() {
            let key_set = key_set_for(sets, &step.table)?;
            let mut target = TableBatchTarget::new(&tx, key_set.info, key_filter(key_set));
            let stats = self.deleter.run(&mut target)?;
            tracing::info!(table = %step.table, rows = stats.deleted, "rows deleted");
            steps.push(StepOutcome {
                table: step.table.name.clone(),
                action: "delete",
                rows: stats.deleted,
                batches: Some(stats),
            });
        }
        tx.commit().map_err(ResetError::Transaction)?;

        Ok((resolved, steps))
    }

    /// Insert the root table's keys for `root_ids`, a chunk at a time.
    fn seed_root(
        &self,
        conn: &Connection,
        sets: &BTreeMap<&TableRef, KeySet<'_>>,
        root_ids: &[Value],
    ) -> Result<()> {
        let root = key_set_for(sets, self.plan.root())?;
        let column = root.info.column(self.plan.root_column())?;
        let keys = sql::join(&root.info.key_idents());
        for chunk in root_ids.chunks(self.deleter.batch_size()) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let stmt = sql::Statement {
                sql: format!(
                    "INSERT OR IGNORE INTO {} SELECT {keys} FROM {} WHERE {column} IN ({placeholders})",
                    root.set,
                    root.info.ident()
                ),
                params: chunk.to_vec(),
            };
            stmt.execute(conn).map_err(|source| resolve_error(root, source))?;
        }
        Ok(())
    }

    /// Follow every plan edge from parent keys to child keys until no new
    /// key appears.
    fn propagate(&self, conn: &Connection, sets: &BTreeMap<&TableRef, KeySet<'_>>) -> Result<()> {
        let mut statements = Vec::with_capacity(self.plan.edges().len());
        for fk in self.plan.edges() {
            let child = key_set_for(sets, &fk.table)?;
            let parent = key_set_for(sets, &fk.referenced_table)?;
            let sql = format!(
                "INSERT OR IGNORE INTO {} SELECT {} FROM {} WHERE {} IN \
                 (SELECT {} FROM {} WHERE {} IN (SELECT * FROM {}))",
                child.set,
                sql::join(&child.info.key_idents()),
                child.info.ident(),
                sql::row_value(&child.info.columns_idents(&fk.columns)?),
                sql::join(&parent.info.columns_idents(&fk.referenced_columns)?),
                parent.info.ident(),
                sql::row_value(&parent.info.key_idents()),
                parent.set,
            );
            statements.push((child, sql));
        }

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut added = 0;
            for (child, sql) in &statements {
                added += conn.execute(sql, []).map_err(|source| resolve_error(child, source))?;
            }
            if added == 0 {
                break;
            }
        }
        tracing::debug!(rounds, edges = statements.len(), "key propagation settled");
        Ok(())
    }
}

fn key_set_for<'s, 'a>(
    sets: &'s BTreeMap<&TableRef, KeySet<'a>>,
    table: &TableRef,
) -> Result<&'s KeySet<'a>> {
    sets.get(table)
        .ok_or_else(|| ResetError::UnknownTable(table.clone()))
}

fn key_filter(key_set: &KeySet<'_>) -> Filter {
    Filter::InKeySet {
        columns: key_set.info.key_idents(),
        set: key_set.set.clone(),
    }
}

fn resolve_error(key_set: &KeySet<'_>, source: rusqlite::Error) -> ResetError {
    ResetError::Resolve {
        table: key_set.info.name().to_string(),
        source,
    }
}

fn create_key_table(conn: &Connection, key_set: &KeySet<'_>) -> rusqlite::Result<()> {
    let columns: Vec<String> = (0..key_set.info.key_columns().len())
        .map(|i| format!("k{i}"))
        .collect();
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {set}; CREATE TEMP TABLE {set} ({cols}, PRIMARY KEY ({cols}));",
        set = key_set.set,
        cols = columns.join(", "),
    ))
}

fn count(conn: &Connection, set: &Ident) -> rusqlite::Result<usize> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {set}"), [], |row| row.get::<_, i64>(0))
        .map(|n| n as usize)
}
