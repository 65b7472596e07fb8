//! Foreign-key discovery.
//!
//! [`SchemaGraphReader`] turns the flat per-column rows of
//! `pragma_foreign_key_list` into composite [`ForeignKeyConstraint`]s,
//! resolving implicit referenced columns and recovering declared constraint
//! names from the stored DDL. [`ForeignKeyGraph`] indexes a constraint list
//! by parent table for the delete planner.

use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashSet};

use crate::db::catalog::{table_sql, Catalog, TableInfo};
use crate::db::ddl::CreateTable;
use crate::db::sql::quote_ident;
use crate::reset::error::{ResetError, Result};
use crate::reset::types::{ForeignKeyConstraint, ReferentialAction, TableRef};

/// One row of `pragma_foreign_key_list`, joined with its owning table.
struct CatalogRow {
    table: String,
    id: i64,
    parent: String,
    from: String,
    to: Option<String>,
    on_update: ReferentialAction,
    on_delete: ReferentialAction,
}

pub struct SchemaGraphReader<'c> {
    conn: &'c Connection,
    schema: String,
}

impl<'c> SchemaGraphReader<'c> {
    pub fn new(conn: &'c Connection, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::load(self.conn, &self.schema)
    }

    /// Every foreign key of the schema, sorted by (schema, table, name) with
    /// columns in ordinal order. Two calls against an unchanged schema
    /// return equal lists.
    pub fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyConstraint>> {
        let catalog = self.catalog()?;
        self.list_with(&catalog)
    }

    pub fn list_with(&self, catalog: &Catalog) -> Result<Vec<ForeignKeyConstraint>> {
        let rows = self.read_rows().map_err(ResetError::Introspection)?;

        // Rows arrive ordered by (table, id, seq); consecutive rows with the
        // same (table, id) form one constraint.
        let mut grouped: Vec<Vec<CatalogRow>> = Vec::new();
        for row in rows {
            match grouped.last_mut() {
                Some(group) if group[0].table == row.table && group[0].id == row.id => group.push(row),
                _ => grouped.push(vec![row]),
            }
        }

        let mut by_table: BTreeMap<String, Vec<ForeignKeyConstraint>> = BTreeMap::new();
        for group in grouped {
            let fk = self.assemble(catalog, &group)?;
            by_table.entry(fk.table.name.clone()).or_default().push(fk);
        }

        let mut constraints = Vec::new();
        for (table, mut fks) in by_table {
            let owner = catalog.table(&table)?;
            self.assign_names(owner, &mut fks)?;
            constraints.extend(fks);
        }
        constraints.sort();

        tracing::debug!(schema = %self.schema, constraints = constraints.len(), "foreign keys listed");
        Ok(constraints)
    }

    fn read_rows(&self) -> rusqlite::Result<Vec<CatalogRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT m.name, f.id, f.\"table\", f.\"from\", f.\"to\", f.on_update, f.on_delete \
             FROM {}.sqlite_master AS m \
             JOIN pragma_foreign_key_list(m.name, ?1) AS f \
             WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY m.name, f.id, f.seq",
            quote_ident(&self.schema)
        ))?;
        let rows = stmt
            .query_map(params![self.schema], |row| {
                Ok(CatalogRow {
                    table: row.get(0)?,
                    id: row.get(1)?,
                    parent: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                    on_update: action(row, 5)?,
                    on_delete: action(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Build one constraint from its per-column rows, canonicalizing table
    /// and column spelling against the catalog.
    fn assemble(&self, catalog: &Catalog, group: &[CatalogRow]) -> Result<ForeignKeyConstraint> {
        let first = &group[0];
        let owner = catalog.table(&first.table)?;
        let parent = catalog.table(&first.parent)?;

        let columns = group
            .iter()
            .map(|r| owner.canonical_column(&r.from).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        let referenced_columns = if group.iter().all(|r| r.to.is_some()) {
            group
                .iter()
                .filter_map(|r| r.to.as_deref())
                .map(|c| parent.canonical_column(c).map(str::to_string))
                .collect::<Result<Vec<_>>>()?
        } else {
            // `REFERENCES parent` without a column list targets the primary key
            parent.primary_key()
        };
        if referenced_columns.len() != columns.len() {
            return Err(ResetError::UnknownColumn {
                table: parent.table.clone(),
                column: format!("primary key matching ({})", columns.join(", ")),
            });
        }

        Ok(ForeignKeyConstraint {
            table: owner.table.clone(),
            name: String::new(),
            columns,
            referenced_table: parent.table.clone(),
            referenced_columns,
            on_delete: first.on_delete,
            on_update: first.on_update,
        })
    }

    /// Take declared names from the DDL; derive the rest. Declared names are
    /// reserved first and kept verbatim, so a derived name never shadows one.
    fn assign_names(&self, owner: &TableInfo, fks: &mut [ForeignKeyConstraint]) -> Result<()> {
        let sql = table_sql(self.conn, &owner.table).map_err(ResetError::Introspection)?;
        let ddl_error = |source| ResetError::Ddl {
            table: owner.table.clone(),
            source,
        };
        let clauses = CreateTable::parse(&sql)
            .and_then(|t| t.foreign_keys())
            .map_err(ddl_error)?;

        let mut used = HashSet::new();
        let mut declared: Vec<Option<String>> = Vec::with_capacity(fks.len());
        for fk in fks.iter() {
            let clause = clauses
                .iter()
                .enumerate()
                .find(|(i, c)| !used.contains(i) && c.matches_shape(fk));
            declared.push(clause.and_then(|(i, c)| {
                used.insert(i);
                c.name.clone()
            }));
        }

        let mut taken: HashSet<String> = declared
            .iter()
            .flatten()
            .map(|name| name.to_lowercase())
            .collect();
        for (fk, name) in fks.iter_mut().zip(declared) {
            fk.name = match name {
                Some(name) => name,
                None => unique_name(derived_name(fk), &mut taken),
            };
        }
        Ok(())
    }
}

fn action(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<ReferentialAction> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn derived_name(fk: &ForeignKeyConstraint) -> String {
    format!(
        "fk_{}_{}_{}",
        fk.table.name,
        fk.columns.join("_"),
        fk.referenced_table.name
    )
}

fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = format!("{name}_{n}");
        n += 1;
    }
    candidate
}

/// Constraints indexed by the table they reference.
#[derive(Debug)]
pub struct ForeignKeyGraph<'a> {
    children: BTreeMap<TableRef, Vec<&'a ForeignKeyConstraint>>,
}

impl<'a> ForeignKeyGraph<'a> {
    pub fn new(constraints: &'a [ForeignKeyConstraint]) -> Self {
        let mut children: BTreeMap<TableRef, Vec<&ForeignKeyConstraint>> = BTreeMap::new();
        for fk in constraints {
            children.entry(fk.referenced_table.clone()).or_default().push(fk);
        }
        Self { children }
    }

    /// Constraints whose referenced table is `parent`, in list order.
    pub fn children_of(&self, parent: &TableRef) -> &[&'a ForeignKeyConstraint] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }
}
