//! Delete plans for partial resets.
//!
//! A plan is derived from the live foreign-key graph: starting at a root
//! table, every table that would block the root's deletion joins the plan,
//! and tables are ordered so a child is always deleted before any parent it
//! references. Cycles are broken by nulling one nullable reference first.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::db::catalog::Catalog;
use crate::reset::error::{ResetError, Result};
use crate::reset::graph::ForeignKeyGraph;
use crate::reset::types::{ForeignKeyConstraint, TableRef};

/// Which rows of a table a step touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPredicate {
    /// Root-table rows whose `column` is one of the root ids.
    RootIds { column: String },
    /// Rows reached from the root ids through the plan's references.
    ResolvedKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    Delete,
    /// Set `columns` to NULL so `constraint` no longer holds a cycle together.
    Nullify {
        columns: Vec<String>,
        constraint: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletePlanStep {
    pub table: TableRef,
    pub predicate: StepPredicate,
    pub action: StepAction,
}

impl DeletePlanStep {
    pub fn is_delete(&self) -> bool {
        self.action == StepAction::Delete
    }
}

impl std::fmt::Display for DeletePlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.action {
            StepAction::Delete => write!(f, "delete {}", self.table)?,
            StepAction::Nullify {
                columns,
                constraint,
            } => write!(
                f,
                "null {}.({}) to release {constraint}",
                self.table,
                columns.join(", ")
            )?,
        }
        match &self.predicate {
            StepPredicate::RootIds { column } => write!(f, " where {column} in root ids"),
            StepPredicate::ResolvedKeys => f.write_str(" in resolved keys"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletePlan {
    root: TableRef,
    root_column: String,
    steps: Vec<DeletePlanStep>,
    /// References between plan tables that key resolution follows.
    #[serde(skip)]
    edges: Vec<ForeignKeyConstraint>,
}

impl DeletePlan {
    /// Assemble a plan from explicit steps. No ordering check is made; see
    /// [`DeletePlan::check_order`].
    pub fn from_steps(
        root: TableRef,
        root_column: impl Into<String>,
        steps: Vec<DeletePlanStep>,
        constraints: &[ForeignKeyConstraint],
    ) -> Self {
        let tables: BTreeSet<&TableRef> = steps.iter().map(|s| &s.table).collect();
        let edges = constraints
            .iter()
            .filter(|fk| {
                !fk.on_delete.keeps_child()
                    && tables.contains(&fk.table)
                    && tables.contains(&fk.referenced_table)
            })
            .cloned()
            .collect();
        Self {
            root,
            root_column: root_column.into(),
            steps,
            edges,
        }
    }

    pub fn root(&self) -> &TableRef {
        &self.root
    }

    pub fn root_column(&self) -> &str {
        &self.root_column
    }

    pub fn steps(&self) -> &[DeletePlanStep] {
        &self.steps
    }

    pub fn edges(&self) -> &[ForeignKeyConstraint] {
        &self.edges
    }

    /// Distinct tables touched by the plan, in name order.
    pub fn tables(&self) -> BTreeSet<&TableRef> {
        self.steps.iter().map(|s| &s.table).collect()
    }

    pub fn nullify_steps(&self) -> impl Iterator<Item = &DeletePlanStep> {
        self.steps.iter().filter(|s| !s.is_delete())
    }

    pub fn delete_steps(&self) -> impl Iterator<Item = &DeletePlanStep> {
        self.steps.iter().filter(|s| s.is_delete())
    }

    /// Every child delete must come before the delete of a parent it
    /// references, unless the reference is nulled by the plan or cleared
    /// by the store on delete.
    pub fn check_order(&self, constraints: &[ForeignKeyConstraint]) -> Result<()> {
        let position: BTreeMap<&TableRef, usize> = self
            .delete_steps()
            .enumerate()
            .map(|(i, s)| (&s.table, i))
            .collect();
        let released: HashSet<(&TableRef, &str)> = self
            .nullify_steps()
            .filter_map(|s| match &s.action {
                StepAction::Nullify { constraint, .. } => Some((&s.table, constraint.as_str())),
                StepAction::Delete => None,
            })
            .collect();

        for fk in constraints {
            if fk.on_delete.keeps_child() || released.contains(&(&fk.table, fk.name.as_str())) {
                continue;
            }
            let (Some(child), Some(parent)) = (
                position.get(&fk.table),
                position.get(&fk.referenced_table),
            ) else {
                continue;
            };
            if fk.is_self_referencing() || child > parent {
                return Err(ResetError::PlanOrder {
                    child: fk.table.name.clone(),
                    parent: fk.referenced_table.name.clone(),
                    constraint: fk.name.clone(),
                });
            }
        }
        Ok(())
    }
}

pub struct CascadingDeletePlanner<'a> {
    constraints: &'a [ForeignKeyConstraint],
    catalog: &'a Catalog,
}

impl<'a> CascadingDeletePlanner<'a> {
    pub fn new(constraints: &'a [ForeignKeyConstraint], catalog: &'a Catalog) -> Self {
        Self {
            constraints,
            catalog,
        }
    }

    /// Plan the removal of `root` rows selected by `root_column` (the
    /// table's single key column when `None`) and of every row that would
    /// otherwise block it.
    pub fn plan(&self, root: &str, root_column: Option<&str>) -> Result<DeletePlan> {
        let root_info = self.catalog.table(root)?;
        let root_column = match root_column {
            Some(column) => root_info.canonical_column(column)?.to_string(),
            None => match root_info.key_columns().as_slice() {
                [only] => only.clone(),
                _ => return Err(ResetError::NoRootKey(root_info.table.clone())),
            },
        };

        let graph = ForeignKeyGraph::new(self.constraints);
        let tables = subtree(&graph, &root_info.table);
        let edges: Vec<&ForeignKeyConstraint> = self
            .constraints
            .iter()
            .filter(|fk| {
                !fk.on_delete.keeps_child()
                    && tables.contains(&fk.table)
                    && tables.contains(&fk.referenced_table)
            })
            .collect();

        let (order, broken) = self.order(&tables, &edges)?;

        let predicate_for = |table: &TableRef| {
            if *table == root_info.table {
                StepPredicate::RootIds {
                    column: root_column.clone(),
                }
            } else {
                StepPredicate::ResolvedKeys
            }
        };
        let mut steps = Vec::with_capacity(broken.len() + order.len());
        for (fk, columns) in broken {
            steps.push(DeletePlanStep {
                table: fk.table.clone(),
                predicate: predicate_for(&fk.table),
                action: StepAction::Nullify {
                    columns,
                    constraint: fk.name.clone(),
                },
            });
        }
        for table in order {
            steps.push(DeletePlanStep {
                predicate: predicate_for(&table),
                table,
                action: StepAction::Delete,
            });
        }

        tracing::info!(
            root = %root_info.table,
            column = %root_column,
            tables = tables.len(),
            steps = steps.len(),
            "delete plan built"
        );
        Ok(DeletePlan {
            root: root_info.table.clone(),
            root_column,
            steps,
            edges: edges.into_iter().cloned().collect(),
        })
    }

    /// Kahn's algorithm over child-before-parent edges, ties broken by
    /// table name. Returns the delete order and the edges nulled to break
    /// cycles, each with its nullable owning columns.
    #[allow(clippy::type_complexity)]
    fn order<'e>(
        &self,
        tables: &BTreeSet<TableRef>,
        edges: &[&'e ForeignKeyConstraint],
    ) -> Result<(Vec<TableRef>, Vec<(&'e ForeignKeyConstraint, Vec<String>)>)> {
        // Undeleted children still referencing each table
        let mut blockers: BTreeMap<&TableRef, usize> = tables.iter().map(|t| (t, 0)).collect();
        let mut active: Vec<bool> = vec![true; edges.len()];
        for fk in edges {
            if let Some(n) = blockers.get_mut(&fk.referenced_table) {
                *n += 1;
            }
        }

        let mut remaining: BTreeSet<&TableRef> = tables.iter().collect();
        let mut order = Vec::with_capacity(tables.len());
        let mut broken = Vec::new();

        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .copied()
                .find(|t| blockers.get(t).copied() == Some(0));
            let Some(table) = ready else {
                let (i, columns) = self.cycle_breaker(&remaining, edges, &active)?;
                active[i] = false;
                if let Some(n) = blockers.get_mut(&edges[i].referenced_table) {
                    *n -= 1;
                }
                tracing::debug!(
                    constraint = %edges[i].name,
                    table = %edges[i].table,
                    "cycle broken by nulling"
                );
                broken.push((edges[i], columns));
                continue;
            };

            remaining.remove(table);
            for (i, fk) in edges.iter().enumerate() {
                if active[i] && fk.table == *table {
                    active[i] = false;
                    if let Some(n) = blockers.get_mut(&fk.referenced_table) {
                        *n -= 1;
                    }
                }
            }
            order.push(table.clone());
        }
        Ok((order, broken))
    }

    /// First active edge, in constraint order, that lies on a cycle and owns
    /// a nullable column.
    fn cycle_breaker(
        &self,
        remaining: &BTreeSet<&TableRef>,
        edges: &[&ForeignKeyConstraint],
        active: &[bool],
    ) -> Result<(usize, Vec<String>)> {
        let live: Vec<usize> = (0..edges.len()).filter(|&i| active[i]).collect();
        for &i in &live {
            let fk = edges[i];
            if !on_cycle(fk, edges, &live) {
                continue;
            }
            let Some(owner) = self.catalog.get(&fk.table.name) else {
                continue;
            };
            let columns: Vec<String> = fk
                .columns
                .iter()
                .filter(|c| owner.is_nullable(c))
                .cloned()
                .collect();
            if !columns.is_empty() {
                return Ok((i, columns));
            }
        }
        Err(ResetError::UnbreakableCycle {
            tables: remaining.iter().map(|t| t.name.clone()).collect(),
        })
    }
}

/// Tables reachable from `root` through references the store will not
/// clear on its own.
fn subtree(graph: &ForeignKeyGraph<'_>, root: &TableRef) -> BTreeSet<TableRef> {
    let mut seen = BTreeSet::from([root.clone()]);
    let mut stack = vec![root.clone()];
    while let Some(parent) = stack.pop() {
        for fk in graph.children_of(&parent) {
            if fk.on_delete.keeps_child() {
                continue;
            }
            if seen.insert(fk.table.clone()) {
                stack.push(fk.table.clone());
            }
        }
    }
    seen
}

/// Whether `fk` closes a loop: its parent is reachable from its own table
/// by following live parent -> child edges.
fn on_cycle(fk: &ForeignKeyConstraint, edges: &[&ForeignKeyConstraint], live: &[usize]) -> bool {
    let mut seen = BTreeSet::from([&fk.table]);
    let mut stack = vec![&fk.table];
    while let Some(parent) = stack.pop() {
        if parent == &fk.referenced_table {
            return true;
        }
        for &i in live {
            let edge = edges[i];
            if &edge.referenced_table == parent && seen.insert(&edge.table) {
                stack.push(&edge.table);
            }
        }
    }
    false
}
