//! Typed statement builder.
//!
//! Identifiers are rendered only through [`Ident`], which is handed out by
//! [`Catalog`](super::catalog::Catalog) lookups after the name has been
//! checked against the live schema. Values are always bound parameters.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Quote an SQLite identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A quoted identifier that has been checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub(crate) fn new(name: &str) -> Self {
        Self(quote_ident(name))
    }

    pub(crate) fn qualified(schema: &str, name: &str) -> Self {
        Self(format!("{}.{}", quote_ident(schema), quote_ident(name)))
    }

    pub fn as_sql(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    pub fn execute(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(&self.sql, params_from_iter(self.params.iter()))
    }

    /// Run a query and collect the first `width` columns of every row.
    pub fn query_rows(&self, conn: &Connection, width: usize) -> rusqlite::Result<Vec<Vec<Value>>> {
        let mut stmt = conn.prepare(&self.sql)?;
        let rows = stmt
            .query_map(params_from_iter(self.params.iter()), |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Row filter rendered into a `WHERE` clause.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    /// `column = value`
    Equals { column: Ident, value: Value },
    /// `(columns) IN (SELECT * FROM set)`, where `set` is a key table with
    /// the same arity as `columns`.
    InKeySet { columns: Vec<Ident>, set: Ident },
}

impl Filter {
    fn render(&self, params: &mut Vec<Value>) -> String {
        match self {
            Filter::All => "1".to_string(),
            Filter::Equals { column, value } => {
                params.push(value.clone());
                format!("{column} = ?")
            }
            Filter::InKeySet { columns, set } => {
                format!("{} IN (SELECT * FROM {set})", row_value(columns))
            }
        }
    }
}

/// Render `a` for one column and `(a, b)` for several.
pub fn row_value(columns: &[Ident]) -> String {
    let joined = join(columns);
    if columns.len() == 1 {
        joined
    } else {
        format!("({joined})")
    }
}

pub fn join(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::as_sql)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT keys FROM table WHERE filter LIMIT n`
pub fn select_keys(table: &Ident, keys: &[Ident], filter: &Filter, limit: usize) -> Statement {
    let mut params = Vec::new();
    let predicate = filter.render(&mut params);
    params.push(Value::Integer(limit as i64));
    Statement {
        sql: format!(
            "SELECT {} FROM {table} WHERE {predicate} LIMIT ?",
            join(keys)
        ),
        params,
    }
}

/// Most key tuples one [`delete_by_keys`] statement may carry. The `OR`
/// chain nests one level per tuple and SQLite rejects expression trees
/// deeper than 1000.
pub const MAX_KEYS_PER_DELETE: usize = 250;

/// Delete exactly the given key tuples: `(k1 IS ? AND k2 IS ?) OR (...)`.
/// Callers keep `rows` at or below [`MAX_KEYS_PER_DELETE`].
pub fn delete_by_keys(table: &Ident, keys: &[Ident], rows: &[Vec<Value>]) -> Statement {
    let mut params = Vec::with_capacity(rows.len() * keys.len());
    let mut disjuncts = Vec::with_capacity(rows.len());
    for row in rows {
        let conjuncts: Vec<String> = keys.iter().map(|k| format!("{k} IS ?")).collect();
        disjuncts.push(format!("({})", conjuncts.join(" AND ")));
        params.extend(row.iter().cloned());
    }
    Statement {
        sql: format!("DELETE FROM {table} WHERE {}", disjuncts.join(" OR ")),
        params,
    }
}

pub fn delete_all(table: &Ident) -> Statement {
    Statement::new(format!("DELETE FROM {table}"))
}

/// `UPDATE table SET c1 = NULL, ... WHERE filter`
pub fn set_null(table: &Ident, columns: &[Ident], filter: &Filter) -> Statement {
    let mut params = Vec::new();
    let predicate = filter.render(&mut params);
    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = NULL")).collect();
    Statement {
        sql: format!(
            "UPDATE {table} SET {} WHERE {predicate}",
            assignments.join(", ")
        ),
        params,
    }
}
