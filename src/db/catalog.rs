//! Typed view of the base tables of one schema.
//!
//! The catalog is the only place [`Ident`]s come from: a table or column
//! name has to be found here before it can be rendered into a statement.

use rusqlite::{params, Connection};
use std::collections::BTreeMap;

use crate::db::sql::Ident;
use crate::reset::error::{ResetError, Result};
use crate::reset::types::TableRef;

/// Implicit key of a rowid table without a declared primary key.
pub const ROWID: &str = "rowid";

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 if not part of it.
    pub pk_position: usize,
    /// Generated columns cannot be written and are skipped when copying.
    pub generated: bool,
}

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
    pub without_rowid: bool,
}

impl TableInfo {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// Schema-qualified identifier of the table.
    pub fn ident(&self) -> Ident {
        Ident::qualified(&self.table.schema, &self.table.name)
    }

    fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Canonical spelling of a column name, or `rowid` for implicit keys.
    pub fn canonical_column(&self, name: &str) -> Result<&str> {
        if let Some(column) = self.find_column(name) {
            return Ok(&column.name);
        }
        if name.eq_ignore_ascii_case(ROWID) && !self.without_rowid {
            return Ok(ROWID);
        }
        Err(ResetError::UnknownColumn {
            table: self.table.clone(),
            column: name.to_string(),
        })
    }

    pub fn column(&self, name: &str) -> Result<Ident> {
        self.canonical_column(name).map(Ident::new)
    }

    pub fn columns_idents(&self, names: &[String]) -> Result<Vec<Ident>> {
        names.iter().map(|n| self.column(n)).collect()
    }

    /// Primary-key columns in key order; `rowid` when none is declared.
    pub fn key_columns(&self) -> Vec<String> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.pk_position > 0).collect();
        if pk.is_empty() {
            return vec![ROWID.to_string()];
        }
        pk.sort_by_key(|c| c.pk_position);
        pk.into_iter().map(|c| c.name.clone()).collect()
    }

    pub fn key_idents(&self) -> Vec<Ident> {
        self.key_columns().iter().map(|c| Ident::new(c)).collect()
    }

    /// Declared primary-key columns only (no implicit `rowid`).
    pub fn primary_key(&self) -> Vec<String> {
        let keys = self.key_columns();
        if keys == [ROWID] {
            Vec::new()
        } else {
            keys
        }
    }

    pub fn is_nullable(&self, column: &str) -> bool {
        self.find_column(column)
            .is_some_and(|c| !c.not_null && c.pk_position == 0)
    }

    /// Columns whose values are copied during a table rebuild.
    pub fn stored_columns(&self) -> Vec<Ident> {
        self.columns
            .iter()
            .filter(|c| !c.generated)
            .map(|c| Ident::new(&c.name))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    schema: String,
    /// Keyed by lowercased name; SQLite table names are case-insensitive.
    tables: BTreeMap<String, TableInfo>,
}

impl Catalog {
    /// Read every base table of `schema`, skipping `sqlite_%` internals.
    pub fn load(conn: &Connection, schema: &str) -> Result<Self> {
        let names: Vec<(String, bool)> = {
            let mut stmt = conn
                .prepare(
                    "SELECT name, wr FROM pragma_table_list \
                     WHERE schema = ?1 AND type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                     ORDER BY name",
                )
                .map_err(ResetError::Introspection)?;
            let rows = stmt
                .query_map(params![schema], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)))
                .map_err(ResetError::Introspection)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(ResetError::Introspection)?;
            rows
        };

        let mut tables = BTreeMap::new();
        for (name, without_rowid) in names {
            let columns = load_columns(conn, schema, &name).map_err(ResetError::Introspection)?;
            tables.insert(
                name.to_lowercase(),
                TableInfo {
                    table: TableRef::new(schema, name),
                    columns,
                    without_rowid,
                },
            );
        }

        tracing::debug!(schema, tables = tables.len(), "catalog loaded");
        Ok(Self {
            schema: schema.to_string(),
            tables,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Base tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn get(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table(&self, name: &str) -> Result<&TableInfo> {
        self.get(name)
            .ok_or_else(|| ResetError::UnknownTable(TableRef::new(&self.schema, name)))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn load_columns(conn: &Connection, schema: &str, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, \"notnull\", pk, hidden FROM pragma_table_xinfo(?1, ?2) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![table, schema], |row| {
            let hidden: i64 = row.get(3)?;
            Ok(ColumnInfo {
                name: row.get(0)?,
                not_null: row.get::<_, i64>(1)? != 0,
                pk_position: row.get::<_, i64>(2)? as usize,
                generated: hidden != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Stored `CREATE TABLE` text of a table.
pub fn table_sql(conn: &Connection, table: &TableRef) -> rusqlite::Result<String> {
    conn.query_row(
        &format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            crate::db::sql::quote_ident(&table.schema)
        ),
        params![table.name],
        |row| row.get(0),
    )
}

/// Stored DDL of the indexes and triggers attached to a table; these are
/// dropped along with the table and have to be replayed after a rebuild.
pub fn companion_sql(conn: &Connection, table: &TableRef) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT sql FROM {}.sqlite_master \
         WHERE type IN ('index', 'trigger') AND tbl_name = ?1 COLLATE NOCASE AND sql IS NOT NULL \
         ORDER BY type, name",
        crate::db::sql::quote_ident(&table.schema)
    ))?;
    let sql = stmt
        .query_map(params![table.name], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sql)
}

/// A trigger as stored in `sqlite_master`.
#[derive(Debug, Clone)]
pub struct StoredTrigger {
    pub name: String,
    /// Table the trigger is attached to.
    pub table: String,
    pub sql: String,
}

/// Every trigger of `schema`, in name order.
pub fn triggers(conn: &Connection, schema: &str) -> rusqlite::Result<Vec<StoredTrigger>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name, tbl_name, sql FROM {}.sqlite_master \
         WHERE type = 'trigger' AND sql IS NOT NULL ORDER BY name",
        crate::db::sql::quote_ident(schema)
    ))?;
    let triggers = stmt
        .query_map([], |row| {
            Ok(StoredTrigger {
                name: row.get(0)?,
                table: row.get(1)?,
                sql: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(triggers)
}
