//! CLI `full` command: empty every table and restore its foreign keys after
//! user confirmation.

use anyhow::{Context, Result};

use db_reset::config::ResetConfig;
use db_reset::reset::run_full_reset;

/// Drop all foreign keys, truncate every non-bookkeeping table, recreate
/// and verify the foreign keys.
pub fn full(config: &ResetConfig, yes: bool, json: bool) -> Result<()> {
    super::confirm(
        config,
        yes,
        "This will permanently delete ALL rows except migration history.",
    )?;

    let db_path = config.resolved_db_path();
    let mut conn = db_reset::db::open_database(&db_path)?;

    let report =
        run_full_reset(&mut conn, &config.reset_options()).context("full reset failed")?;

    if json {
        return super::print_json(&report);
    }
    println!("Run:               {}", report.run_id);
    println!("Tables truncated:  {}", report.truncated.tables.len());
    println!("Rows deleted:      {}", report.truncated.rows());
    if !report.truncated.skipped.is_empty() {
        println!("Kept:              {}", report.truncated.skipped.join(", "));
    }
    println!("Foreign keys:      {} restored and verified", report.constraints);
    println!(
        "Took:              {} ms",
        (report.finished_at - report.started_at).num_milliseconds()
    );
    println!("Database reset complete.");
    Ok(())
}
