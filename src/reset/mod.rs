//! Reset engine: foreign-key discovery, constraint lifecycle, truncation,
//! batched deletes and cascade-ordered selective deletes.
//!
//! A full reset runs through [`FullReset`] (or [`run_full_reset`]); a
//! partial reset builds a [`DeletePlan`] with [`CascadingDeletePlanner`] and
//! runs it with [`SelectiveReset`].

pub mod batch;
pub mod constraints;
pub mod error;
pub mod graph;
pub mod planner;
pub mod selective;
pub mod session;
pub mod truncate;
pub mod types;

pub use batch::{
    BatchStats, BatchTarget, BatchedBulkDeleter, TableBatchTarget, DEFAULT_BATCH_SIZE,
    MAX_BATCH_SIZE,
};
pub use constraints::{verify, ConstraintLifecycleManager};
pub use error::{ResetError, Result};
pub use graph::{ForeignKeyGraph, SchemaGraphReader};
pub use planner::{CascadingDeletePlanner, DeletePlan, DeletePlanStep, StepAction, StepPredicate};
pub use selective::{SelectiveReport, SelectiveReset};
pub use session::{
    run_full_reset, FullReset, ResetOptions, ResetPhase, ResetReport, DEFAULT_BOOKKEEPING_TABLES,
};
pub use truncate::{TableTruncator, TruncateReport};
pub use types::{ForeignKeyConstraint, ReferentialAction, TableRef};
