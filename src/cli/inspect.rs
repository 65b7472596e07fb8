//! CLI `inspect` command: list base tables and the live foreign-key graph.

use anyhow::{Context, Result};
use serde::Serialize;

use db_reset::config::ResetConfig;
use db_reset::db::{self, sql};
use db_reset::reset::{ForeignKeyConstraint, SchemaGraphReader};

#[derive(Serialize)]
struct TableSummary {
    name: String,
    rows: i64,
    key: Vec<String>,
}

#[derive(Serialize)]
struct InspectReport {
    schema: String,
    tables: Vec<TableSummary>,
    foreign_keys: Vec<ForeignKeyConstraint>,
}

/// Print every base table with its row count, then every foreign key.
pub fn inspect(config: &ResetConfig, json: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;

    let reader = SchemaGraphReader::new(&conn, config.storage.schema.clone());
    let catalog = reader.catalog().context("failed to read catalog")?;
    let foreign_keys = reader
        .list_with(&catalog)
        .context("failed to list foreign keys")?;

    let mut tables = Vec::with_capacity(catalog.len());
    for table in catalog.tables() {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.ident()), [], |r| r.get(0))
            .with_context(|| format!("failed to count rows of {}", table.table))?;
        tables.push(TableSummary {
            name: table.name().to_string(),
            rows,
            key: table.key_columns(),
        });
    }

    let report = InspectReport {
        schema: config.storage.schema.clone(),
        tables,
        foreign_keys,
    };
    if json {
        return super::print_json(&report);
    }

    println!("Schema: {} ({})", report.schema, db_path.display());
    println!("{}", "=".repeat(50));
    println!("Tables:");
    for t in &report.tables {
        println!("  {:<32} {:>8} rows  key ({})", t.name, t.rows, t.key.join(", "));
    }
    println!();
    println!("Foreign keys ({}):", report.foreign_keys.len());
    for fk in &report.foreign_keys {
        println!("  {:<40} {fk}", sql::quote_ident(&fk.name));
    }
    Ok(())
}
