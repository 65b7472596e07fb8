//! Value types describing the foreign-key topology of a schema.
//!
//! [`ForeignKeyConstraint`] is the unit that gets captured before a reset,
//! dropped, recreated, and compared afterwards. [`TableRef`] names a base
//! table in one attached schema.

use serde::Serialize;

/// A `(schema, table)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Table in the `main` schema.
    pub fn main(name: impl Into<String>) -> Self {
        Self::new("main", name)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword form, as used in `ON DELETE <action>`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Whether the store itself resolves references to a deleted parent
    /// without removing the child row.
    pub fn keeps_child(&self) -> bool {
        matches!(self, Self::SetNull | Self::SetDefault)
    }
}

impl std::fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for ReferentialAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" | "" => Ok(Self::NoAction),
            "RESTRICT" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            other => Err(format!("unknown referential action: {other}")),
        }
    }
}

/// One (possibly composite) foreign key.
///
/// `columns[i]` references `referenced_columns[i]`; both lists always have
/// the same length. Field order doubles as the deterministic sort order used
/// when listing constraints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ForeignKeyConstraint {
    pub table: TableRef,
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: TableRef,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKeyConstraint {
    pub fn is_self_referencing(&self) -> bool {
        self.table == self.referenced_table
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}

impl std::fmt::Display for ForeignKeyConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}({}) -> {}({}) ON DELETE {} ON UPDATE {}",
            self.name,
            self.table.name,
            self.columns.join(", "),
            self.referenced_table.name,
            self.referenced_columns.join(", "),
            self.on_delete,
            self.on_update,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pragma_action_strings() {
        assert_eq!("NO ACTION".parse::<ReferentialAction>().unwrap(), ReferentialAction::NoAction);
        assert_eq!("set null".parse::<ReferentialAction>().unwrap(), ReferentialAction::SetNull);
        assert_eq!("CASCADE".parse::<ReferentialAction>().unwrap(), ReferentialAction::Cascade);
        assert!("EXPLODE".parse::<ReferentialAction>().is_err());
    }

    #[test]
    fn action_round_trips_through_sql_keyword() {
        for action in [
            ReferentialAction::NoAction,
            ReferentialAction::Restrict,
            ReferentialAction::Cascade,
            ReferentialAction::SetNull,
            ReferentialAction::SetDefault,
        ] {
            assert_eq!(action.as_sql().parse::<ReferentialAction>().unwrap(), action);
        }
    }

    #[test]
    fn ordering_is_by_table_then_name() {
        let fk = |table: &str, name: &str| ForeignKeyConstraint {
            table: TableRef::main(table),
            name: name.into(),
            columns: vec!["a".into()],
            referenced_table: TableRef::main("p"),
            referenced_columns: vec!["id".into()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        };
        let mut list = vec![fk("b", "x"), fk("a", "z"), fk("a", "y")];
        list.sort();
        let names: Vec<_> = list.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["y", "z", "x"]);
    }
}
