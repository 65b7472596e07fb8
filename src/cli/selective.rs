//! CLI `selective` command: delete a set of root rows and everything that
//! depends on them.

use anyhow::{Context, Result};

use db_reset::config::ResetConfig;
use db_reset::reset::SelectiveReset;

pub fn selective(
    config: &ResetConfig,
    root: &str,
    column: Option<&str>,
    ids: &[String],
    yes: bool,
    json: bool,
) -> Result<()> {
    anyhow::ensure!(!ids.is_empty(), "no root ids given");

    let db_path = config.resolved_db_path();
    let mut conn = db_reset::db::open_database(&db_path)?;
    let (catalog, plan) = super::plan::build_plan(&conn, config, root, column)?;

    super::confirm(
        config,
        yes,
        &format!(
            "This will delete {} {root} row(s) and rows in {} dependent table(s).",
            ids.len(),
            plan.tables().len().saturating_sub(1)
        ),
    )?;

    let root_ids: Vec<_> = ids.iter().map(|id| super::parse_value(id)).collect();
    let run_id = uuid::Uuid::now_v7();
    let span = tracing::info_span!("selective_reset", %run_id, root);
    let _guard = span.enter();

    let report = SelectiveReset::new(&catalog, &plan, config.reset.batch_size)
        .execute(&mut conn, &root_ids)
        .context("selective reset failed")?;

    if json {
        return super::print_json(&report);
    }
    println!("Run:            {run_id}");
    for step in &report.steps {
        println!("  {:<8} {:<32} {} rows", step.action, step.table, step.rows);
    }
    println!("Rows deleted:   {}", report.deleted());
    Ok(())
}
