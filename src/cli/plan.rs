//! CLI `plan` command: show the delete plan for a root table without
//! touching any data.

use anyhow::{Context, Result};

use db_reset::config::ResetConfig;
use db_reset::reset::{CascadingDeletePlanner, DeletePlan, SchemaGraphReader};

/// Build the plan for `root` from the live foreign-key graph.
pub fn build_plan(
    conn: &rusqlite::Connection,
    config: &ResetConfig,
    root: &str,
    column: Option<&str>,
) -> Result<(db_reset::db::catalog::Catalog, DeletePlan)> {
    let reader = SchemaGraphReader::new(conn, config.storage.schema.clone());
    let catalog = reader.catalog().context("failed to read catalog")?;
    let constraints = reader
        .list_with(&catalog)
        .context("failed to list foreign keys")?;
    let plan = CascadingDeletePlanner::new(&constraints, &catalog)
        .plan(root, column)
        .with_context(|| format!("failed to plan deletes from {root}"))?;
    plan.check_order(&constraints)?;
    Ok((catalog, plan))
}

pub fn plan(config: &ResetConfig, root: &str, column: Option<&str>, json: bool) -> Result<()> {
    let conn = db_reset::db::open_database(config.resolved_db_path())?;
    let (_, plan) = build_plan(&conn, config, root, column)?;

    if json {
        return super::print_json(&plan);
    }
    println!("Delete plan for {} ({})", plan.root(), plan.root_column());
    println!("{}", "=".repeat(50));
    for (i, step) in plan.steps().iter().enumerate() {
        println!("  {:>2}. {step}", i + 1);
    }
    Ok(())
}
