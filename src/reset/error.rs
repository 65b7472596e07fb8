//! Error type shared by every reset operation.
//!
//! All variants are fatal. Nothing in the reset subsystem retries; the caller
//! logs and re-raises.

use crate::db::ddl::DdlError;
use crate::reset::types::{ForeignKeyConstraint, TableRef};

pub type Result<T, E = ResetError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// A catalog query failed. Raised before any mutation is attempted.
    #[error("catalog introspection failed: {0}")]
    Introspection(#[source] rusqlite::Error),

    #[error("failed to drop constraint {constraint} on {table}: {source}")]
    Drop {
        constraint: String,
        table: TableRef,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to recreate constraint {constraint} on {table}: {source}")]
    Recreate {
        constraint: String,
        table: TableRef,
        #[source]
        source: rusqlite::Error,
    },

    /// The drop target is not part of the owning table's live definition.
    #[error("constraint {constraint} not present on {table}")]
    ConstraintMissing { constraint: String, table: TableRef },

    #[error("constraint {constraint} already present on {table}")]
    ConstraintPresent { constraint: String, table: TableRef },

    #[error("{violations} row(s) of {table} violate {constraint} after recreate")]
    ForeignKeyViolation {
        constraint: String,
        table: TableRef,
        violations: usize,
    },

    #[error(
        "foreign keys differ after reset: {} missing, {} unexpected",
        missing.len(),
        unexpected.len()
    )]
    VerificationMismatch {
        missing: Vec<ForeignKeyConstraint>,
        unexpected: Vec<ForeignKeyConstraint>,
    },

    #[error("failed to truncate {table}: {source}")]
    Truncate {
        table: TableRef,
        #[source]
        source: rusqlite::Error,
    },

    /// A page fetch or delete failed. No resume state is kept.
    #[error("batched delete on {table} aborted after {deleted} row(s): {source}")]
    BatchDelete {
        table: String,
        deleted: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unknown table {0}")]
    UnknownTable(TableRef),

    #[error("unknown column {column} on {table}")]
    UnknownColumn { table: TableRef, column: String },

    #[error("cannot break foreign key cycle between {}: no nullable column", tables.join(", "))]
    UnbreakableCycle { tables: Vec<String> },

    #[error("plan deletes {parent} before its child {child} ({constraint})")]
    PlanOrder {
        child: String,
        parent: String,
        constraint: String,
    },

    #[error("table {0} has no single-column key; name the root column explicitly")]
    NoRootKey(TableRef),

    #[error("failed to resolve keys for {table}: {source}")]
    Resolve {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to null {columns:?} on {table}: {source}")]
    Nullify {
        table: String,
        columns: Vec<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("transaction failed: {0}")]
    Transaction(#[source] rusqlite::Error),

    #[error("cannot edit definition of {table}: {source}")]
    Ddl {
        table: TableRef,
        #[source]
        source: DdlError,
    },
}

impl ResetError {
    pub(crate) fn batch(
        table: impl Into<String>,
        deleted: usize,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::BatchDelete {
            table: table.into(),
            deleted,
            source: source.into(),
        }
    }
}
