//! Paginated find-then-delete.
//!
//! SQLite, like most stores, caps the number of bound parameters per
//! statement. Deleting an unbounded matching set in one statement is unsafe,
//! so deletes go through [`BatchedBulkDeleter`]: fetch at most `batch_size`
//! keys, delete exactly those keys, repeat until a fetch comes back short.

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;

use crate::db::catalog::TableInfo;
use crate::db::sql::{self, Filter, Ident};
use crate::reset::error::{ResetError, Result};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Upper bound on the batch size. Keeps every `IN (...)` list and page of
/// keys well under SQLite's bound-parameter limit.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// A find/delete pair over one key projection.
pub trait BatchTarget {
    type Key;

    /// Label used in errors and logs.
    fn label(&self) -> String;

    /// Up to `limit` keys of rows that still match.
    fn find(&mut self, limit: usize) -> Result<Vec<Self::Key>>;

    /// Delete exactly the rows identified by `keys`; returns rows removed.
    fn delete(&mut self, keys: &[Self::Key]) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub fetches: usize,
    /// Fetch/delete cycles that removed rows.
    pub cycles: usize,
    pub deleted: usize,
}

/// Rows removed by the last fetch/delete cycle; decides whether to loop.
#[derive(Debug, Clone, Copy)]
struct BatchCursor {
    fetched: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchedBulkDeleter {
    batch_size: usize,
}

impl Default for BatchedBulkDeleter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchedBulkDeleter {
    /// The batch size is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(batch_size: usize) -> Self {
        let clamped = batch_size.clamp(1, MAX_BATCH_SIZE);
        if clamped != batch_size {
            tracing::warn!(requested = batch_size, batch_size = clamped, "batch size clamped");
        }
        Self { batch_size: clamped }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain every row `target` matches. Stops after an empty fetch or a
    /// fetch shorter than the batch size. Any failure aborts the loop.
    pub fn run<T: BatchTarget>(&self, target: &mut T) -> Result<BatchStats> {
        let mut stats = BatchStats::default();
        loop {
            let keys = target
                .find(self.batch_size)
                .map_err(|e| abort(target.label(), stats.deleted, e))?;
            stats.fetches += 1;
            let cursor = BatchCursor { fetched: keys.len() };
            if cursor.fetched == 0 {
                break;
            }

            let removed = target
                .delete(&keys)
                .map_err(|e| abort(target.label(), stats.deleted, e))?;
            // A page that matched but deleted nothing would be fetched again forever
            if removed == 0 {
                return Err(ResetError::batch(
                    target.label(),
                    stats.deleted,
                    format!("delete of {} fetched key(s) removed no rows", cursor.fetched),
                ));
            }
            stats.cycles += 1;
            stats.deleted += removed;
            tracing::trace!(target = %target.label(), removed, total = stats.deleted, "batch deleted");

            if cursor.fetched < self.batch_size {
                break;
            }
        }
        tracing::debug!(
            target = %target.label(),
            fetches = stats.fetches,
            cycles = stats.cycles,
            deleted = stats.deleted,
            "batched delete finished"
        );
        Ok(stats)
    }
}

/// Attach the loop's progress to a target failure.
fn abort(table: String, deleted: usize, error: ResetError) -> ResetError {
    match error {
        ResetError::BatchDelete { source, .. } => ResetError::BatchDelete {
            table,
            deleted,
            source,
        },
        other => ResetError::batch(table, deleted, other),
    }
}

/// [`BatchTarget`] over one catalog table: keys are the table's primary key
/// (or `rowid`), matching rows are those passing `filter`.
pub struct TableBatchTarget<'c> {
    conn: &'c Connection,
    name: String,
    table: Ident,
    keys: Vec<Ident>,
    filter: Filter,
}

impl<'c> TableBatchTarget<'c> {
    pub fn new(conn: &'c Connection, table: &TableInfo, filter: Filter) -> Self {
        Self {
            conn,
            name: table.name().to_string(),
            table: table.ident(),
            keys: table.key_idents(),
            filter,
        }
    }
}

impl BatchTarget for TableBatchTarget<'_> {
    type Key = Vec<Value>;

    fn label(&self) -> String {
        self.name.clone()
    }

    fn find(&mut self, limit: usize) -> Result<Vec<Vec<Value>>> {
        sql::select_keys(&self.table, &self.keys, &self.filter, limit)
            .query_rows(self.conn, self.keys.len())
            .map_err(|e| ResetError::batch(&self.name, 0, e))
    }

    /// Large pages are split into several statements of at most
    /// [`sql::MAX_KEYS_PER_DELETE`] keys each.
    fn delete(&mut self, keys: &[Vec<Value>]) -> Result<usize> {
        let mut removed = 0;
        for chunk in keys.chunks(sql::MAX_KEYS_PER_DELETE) {
            removed += sql::delete_by_keys(&self.table, &self.keys, chunk)
                .execute(self.conn)
                .map_err(|e| ResetError::batch(&self.name, removed, e))?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory target recording every call.
    struct FakeTarget {
        rows: Vec<u32>,
        fetch_sizes: Vec<usize>,
        fail_on_delete: Option<usize>,
    }

    impl FakeTarget {
        fn with_rows(n: u32) -> Self {
            Self {
                rows: (0..n).collect(),
                fetch_sizes: Vec::new(),
                fail_on_delete: None,
            }
        }
    }

    impl BatchTarget for FakeTarget {
        type Key = u32;

        fn label(&self) -> String {
            "fake".into()
        }

        fn find(&mut self, limit: usize) -> Result<Vec<u32>> {
            let page: Vec<u32> = self.rows.iter().take(limit).copied().collect();
            self.fetch_sizes.push(page.len());
            Ok(page)
        }

        fn delete(&mut self, keys: &[u32]) -> Result<usize> {
            if self.fail_on_delete == Some(self.fetch_sizes.len()) {
                return Err(ResetError::batch("fake", 0, "disk on fire"));
            }
            let before = self.rows.len();
            self.rows.retain(|r| !keys.contains(r));
            Ok(before - self.rows.len())
        }
    }

    #[test]
    fn drains_in_full_pages_then_a_short_one() {
        let mut target = FakeTarget::with_rows(1250);
        let stats = BatchedBulkDeleter::new(500).run(&mut target).unwrap();
        assert_eq!(target.fetch_sizes, [500, 500, 250]);
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.deleted, 1250);
        assert!(target.rows.is_empty());
    }

    #[test]
    fn empty_set_takes_one_fetch_and_no_deletes() {
        let mut target = FakeTarget::with_rows(0);
        let stats = BatchedBulkDeleter::default().run(&mut target).unwrap();
        assert_eq!(stats, BatchStats { fetches: 1, cycles: 0, deleted: 0 });
    }

    #[test]
    fn exact_multiple_needs_a_final_empty_fetch() {
        let mut target = FakeTarget::with_rows(1000);
        let stats = BatchedBulkDeleter::new(500).run(&mut target).unwrap();
        assert_eq!(target.fetch_sizes, [500, 500, 0]);
        assert_eq!(stats.cycles, 2);
    }

    #[test]
    fn failed_delete_aborts_without_further_fetches() {
        let mut target = FakeTarget::with_rows(1250);
        target.fail_on_delete = Some(2);
        let err = BatchedBulkDeleter::new(500).run(&mut target).unwrap_err();
        assert!(matches!(err, ResetError::BatchDelete { deleted: 500, .. }));
        assert_eq!(target.fetch_sizes.len(), 2);
        assert_eq!(target.rows.len(), 750);
    }

    #[test]
    fn batch_size_is_clamped_to_its_bounds() {
        assert_eq!(BatchedBulkDeleter::new(0).batch_size(), 1);
        assert_eq!(BatchedBulkDeleter::new(MAX_BATCH_SIZE).batch_size(), MAX_BATCH_SIZE);
        assert_eq!(BatchedBulkDeleter::new(usize::MAX).batch_size(), MAX_BATCH_SIZE);
    }
}
