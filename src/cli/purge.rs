//! CLI `purge` command: page through one table deleting rows where a
//! column equals a value.

use anyhow::{Context, Result};

use db_reset::config::ResetConfig;
use db_reset::db::sql::Filter;
use db_reset::reset::{BatchedBulkDeleter, SchemaGraphReader, TableBatchTarget};

pub fn purge(
    config: &ResetConfig,
    table: &str,
    column: &str,
    value: &str,
    yes: bool,
    json: bool,
) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db_reset::db::open_database(&db_path)?;
    let catalog = SchemaGraphReader::new(&conn, config.storage.schema.clone())
        .catalog()
        .context("failed to read catalog")?;
    let info = catalog.table(table)?;
    let filter = Filter::Equals {
        column: info.column(column)?,
        value: super::parse_value(value),
    };

    super::confirm(
        config,
        yes,
        &format!("This will delete every {table} row where {column} = {value}."),
    )?;

    let mut target = TableBatchTarget::new(&conn, info, filter);
    let stats = BatchedBulkDeleter::new(config.reset.batch_size)
        .run(&mut target)
        .with_context(|| format!("purge of {table} failed"))?;

    if json {
        return super::print_json(&stats);
    }
    println!(
        "Deleted {} row(s) from {table} in {} batch(es).",
        stats.deleted, stats.cycles
    );
    Ok(())
}
