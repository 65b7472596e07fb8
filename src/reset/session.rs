//! The full-reset sequence as a typestate machine.
//!
//! `FullReset<Idle>` can only drop constraints, `FullReset<ConstraintsDropped>`
//! can only truncate, and so on, so calling the phases out of order does
//! not compile:
//!
//! ```compile_fail
//! # use db_reset::reset::{FullReset, ResetOptions};
//! # fn demo(conn: &mut rusqlite::Connection) -> db_reset::reset::Result<()> {
//! let reset = FullReset::begin(conn, &ResetOptions::default())?;
//! reset.truncate()?; // constraints are still in place
//! # Ok(())
//! # }
//! ```
//!
//! A failed phase consumes the machine. Whatever the store looks like at
//! that point stays that way; the error names the phase that failed.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::db::catalog::Catalog;
use crate::reset::constraints::{self, ConstraintLifecycleManager};
use crate::reset::error::{ResetError, Result};
use crate::reset::graph::SchemaGraphReader;
use crate::reset::truncate::{TableTruncator, TruncateReport};
use crate::reset::types::ForeignKeyConstraint;

/// Tables every reset leaves alone: migration history.
pub const DEFAULT_BOOKKEEPING_TABLES: &[&str] = &["_schema_migrations", "_prisma_migrations"];

#[derive(Debug, Clone)]
pub struct ResetOptions {
    pub schema: String,
    pub bookkeeping_tables: Vec<String>,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            schema: "main".into(),
            bookkeeping_tables: DEFAULT_BOOKKEEPING_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPhase {
    Idle,
    ConstraintsDropped,
    Truncated,
    ConstraintsRestored,
    Verified,
    Failed,
}

impl std::fmt::Display for ResetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::ConstraintsDropped => "constraints_dropped",
            Self::Truncated => "truncated",
            Self::ConstraintsRestored => "constraints_restored",
            Self::Verified => "verified",
            Self::Failed => "failed",
        })
    }
}

pub struct Idle;
pub struct ConstraintsDropped;
pub struct Truncated;
pub struct ConstraintsRestored;

pub trait Phase {
    const PHASE: ResetPhase;
}

impl Phase for Idle {
    const PHASE: ResetPhase = ResetPhase::Idle;
}
impl Phase for ConstraintsDropped {
    const PHASE: ResetPhase = ResetPhase::ConstraintsDropped;
}
impl Phase for Truncated {
    const PHASE: ResetPhase = ResetPhase::Truncated;
}
impl Phase for ConstraintsRestored {
    const PHASE: ResetPhase = ResetPhase::ConstraintsRestored;
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub run_id: String,
    pub phase: ResetPhase,
    pub constraints: usize,
    pub truncated: TruncateReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct FullReset<'c, S> {
    conn: &'c mut Connection,
    options: ResetOptions,
    catalog: Catalog,
    captured: Vec<ForeignKeyConstraint>,
    truncated: TruncateReport,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    _phase: PhantomData<S>,
}

impl<'c, S: Phase> FullReset<'c, S> {
    pub fn phase(&self) -> ResetPhase {
        S::PHASE
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Constraints captured before anything was dropped.
    pub fn captured(&self) -> &[ForeignKeyConstraint] {
        &self.captured
    }

    fn advance<T>(self) -> FullReset<'c, T> {
        FullReset {
            conn: self.conn,
            options: self.options,
            catalog: self.catalog,
            captured: self.captured,
            truncated: self.truncated,
            run_id: self.run_id,
            started_at: self.started_at,
            _phase: PhantomData,
        }
    }

    fn failed(&self, error: ResetError) -> ResetError {
        tracing::error!(
            run_id = %self.run_id,
            phase = %S::PHASE,
            now = %ResetPhase::Failed,
            error = %error,
            "full reset failed"
        );
        error
    }
}

impl<'c> FullReset<'c, Idle> {
    /// Capture the foreign-key graph. Nothing is mutated; a catalog error
    /// here leaves the store untouched.
    pub fn begin(conn: &'c mut Connection, options: &ResetOptions) -> Result<Self> {
        let run_id = Uuid::now_v7();
        let reader = SchemaGraphReader::new(conn, options.schema.clone());
        let catalog = reader.catalog()?;
        let captured = reader.list_with(&catalog)?;
        tracing::info!(
            %run_id,
            tables = catalog.len(),
            constraints = captured.len(),
            "foreign keys captured"
        );
        Ok(Self {
            conn,
            options: options.clone(),
            catalog,
            captured,
            truncated: TruncateReport::default(),
            run_id,
            started_at: Utc::now(),
            _phase: PhantomData,
        })
    }

    pub fn drop_constraints(self) -> Result<FullReset<'c, ConstraintsDropped>> {
        let outcome =
            ConstraintLifecycleManager::new(&mut *self.conn, &self.catalog).drop_all(&self.captured);
        match outcome {
            Ok(()) => Ok(self.advance()),
            Err(e) => Err(self.failed(e)),
        }
    }
}

impl<'c> FullReset<'c, ConstraintsDropped> {
    pub fn truncate(mut self) -> Result<FullReset<'c, Truncated>> {
        let truncator = TableTruncator::new(&self.catalog, &self.options.bookkeeping_tables);
        match truncator.truncate_all(self.conn) {
            Ok(report) => {
                self.truncated = report;
                Ok(self.advance())
            }
            Err(e) => Err(self.failed(e)),
        }
    }
}

impl<'c> FullReset<'c, Truncated> {
    pub fn restore_constraints(self) -> Result<FullReset<'c, ConstraintsRestored>> {
        let outcome = ConstraintLifecycleManager::new(&mut *self.conn, &self.catalog)
            .recreate_all(&self.captured);
        match outcome {
            Ok(()) => Ok(self.advance()),
            Err(e) => Err(self.failed(e)),
        }
    }
}

impl<'c> FullReset<'c, ConstraintsRestored> {
    /// Re-read the graph and compare it with the captured one.
    pub fn verify(self) -> Result<ResetReport> {
        let reader = SchemaGraphReader::new(&*self.conn, self.options.schema.clone());
        let outcome = reader
            .list_foreign_keys()
            .and_then(|after| constraints::verify(&self.captured, &after));
        if let Err(e) = outcome {
            return Err(self.failed(e));
        }

        let report = ResetReport {
            run_id: self.run_id.to_string(),
            phase: ResetPhase::Verified,
            constraints: self.captured.len(),
            truncated: self.truncated,
            started_at: self.started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            run_id = %report.run_id,
            constraints = report.constraints,
            rows = report.truncated.rows(),
            "full reset verified"
        );
        Ok(report)
    }
}

/// Drop, truncate, restore and verify in one call, inside a span carrying
/// the run id.
pub fn run_full_reset(conn: &mut Connection, options: &ResetOptions) -> Result<ResetReport> {
    let reset = FullReset::begin(conn, options)?;
    let span = tracing::info_span!("full_reset", run_id = %reset.run_id());
    let _guard = span.enter();
    reset
        .drop_constraints()?
        .truncate()?
        .restore_constraints()?
        .verify()
}
