//! Editing of stored `CREATE TABLE` text.
//!
//! SQLite cannot drop or add a foreign key in place, so a constraint change
//! means rebuilding the table from edited DDL. The edits here work on byte
//! spans of the original statement: the one foreign-key clause being removed
//! or appended changes and every other byte of the definition (checks,
//! defaults, collations, comments, table options) is carried over unchanged.

use crate::db::sql::quote_ident;
use crate::reset::types::ForeignKeyConstraint;

#[derive(Debug, thiserror::Error)]
pub enum DdlError {
    #[error("unterminated {what} starting at byte {at}")]
    Unterminated { what: &'static str, at: usize },
    #[error("not a CREATE TABLE statement")]
    NotCreateTable,
    #[error("table definition has no column list")]
    NoColumnList,
    #[error("malformed foreign key clause near byte {0}")]
    MalformedForeignKey(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Quoted,
    Str,
    Punct(char),
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

fn tokenize(sql: &str) -> Result<Vec<Token>, DdlError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut chars = sql.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        // Line comment
        if c == '-' && bytes.get(start + 1) == Some(&b'-') {
            while let Some(&(_, c)) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }
        // Block comment; an unterminated one runs to the end, as in SQLite
        if c == '/' && bytes.get(start + 1) == Some(&b'*') {
            let end = sql[start + 2..]
                .find("*/")
                .map(|i| start + 2 + i + 2)
                .unwrap_or(sql.len());
            while chars.peek().is_some_and(|&(i, _)| i < end) {
                chars.next();
            }
            continue;
        }
        let (kind, close) = match c {
            '"' => (Kind::Quoted, Some('"')),
            '`' => (Kind::Quoted, Some('`')),
            '[' => (Kind::Quoted, Some(']')),
            '\'' => (Kind::Str, Some('\'')),
            _ => (Kind::Other, None),
        };
        if let Some(close) = close {
            chars.next();
            let mut end = None;
            while let Some((i, c)) = chars.next() {
                if c == close {
                    // Doubled delimiter is an escape, except for brackets
                    if close != ']' && chars.peek().is_some_and(|&(_, n)| n == close) {
                        chars.next();
                        continue;
                    }
                    end = Some(i + c.len_utf8());
                    break;
                }
            }
            let end = end.ok_or(DdlError::Unterminated {
                what: if kind == Kind::Str { "string" } else { "identifier" },
                at: start,
            })?;
            tokens.push(Token { kind, start, end });
            continue;
        }
        if is_ident_char(c) {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !is_ident_char(c) {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push(Token {
                kind: Kind::Word,
                start,
                end,
            });
            continue;
        }
        chars.next();
        let kind = match c {
            '(' | ')' | ',' | '.' | ';' => Kind::Punct(c),
            _ => Kind::Other,
        };
        tokens.push(Token {
            kind,
            start,
            end: start + c.len_utf8(),
        });
    }

    Ok(tokens)
}

/// Unquote an identifier token.
fn ident_value(sql: &str, token: &Token) -> String {
    let text = &sql[token.start..token.end];
    match token.kind {
        Kind::Quoted | Kind::Str => {
            let inner = &text[1..text.len() - 1];
            match text.as_bytes()[0] {
                b'"' => inner.replace("\"\"", "\""),
                b'`' => inner.replace("``", "`"),
                b'\'' => inner.replace("''", "'"),
                _ => inner.to_string(),
            }
        }
        _ => text.to_string(),
    }
}

/// Where a clause lives in the statement, for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    /// A whole table-constraint item, by item index.
    Item(usize),
    /// An inline column constraint, by inclusive token range.
    Inline { first: usize, last: usize },
}

/// A `REFERENCES` clause as written in the DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyClause {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Empty when the DDL relies on the parent's primary key.
    pub referenced_columns: Vec<String>,
    location: Location,
}

impl ForeignKeyClause {
    /// Whether this clause describes `fk`.
    ///
    /// A declared name decides on its own; an unnamed clause matches on
    /// shape.
    pub fn matches(&self, fk: &ForeignKeyConstraint) -> bool {
        match &self.name {
            Some(name) => name.eq_ignore_ascii_case(&fk.name),
            None => self.matches_shape(fk),
        }
    }

    /// Structural match only: owning columns, referenced table and, when
    /// written, referenced columns.
    pub fn matches_shape(&self, fk: &ForeignKeyConstraint) -> bool {
        same_names(&self.columns, &fk.columns)
            && self
                .referenced_table
                .eq_ignore_ascii_case(&fk.referenced_table.name)
            && (self.referenced_columns.is_empty()
                || same_names(&self.referenced_columns, &fk.referenced_columns))
    }
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// A tokenized `CREATE TABLE` statement.
#[derive(Debug)]
pub struct CreateTable<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
    /// Byte span of the (possibly schema-qualified) table name.
    name_span: (usize, usize),
    /// Token index of the closing parenthesis of the column list.
    close: usize,
    /// Inclusive token ranges of the comma-separated items.
    items: Vec<(usize, usize)>,
}

impl<'a> CreateTable<'a> {
    pub fn parse(sql: &'a str) -> Result<Self, DdlError> {
        let tokens = tokenize(sql)?;
        let word = |i: usize, kw: &str| {
            tokens
                .get(i)
                .is_some_and(|t| t.kind == Kind::Word && sql[t.start..t.end].eq_ignore_ascii_case(kw))
        };

        if !word(0, "CREATE") {
            return Err(DdlError::NotCreateTable);
        }
        let mut i = 1;
        if word(i, "TEMP") || word(i, "TEMPORARY") {
            i += 1;
        }
        if !word(i, "TABLE") {
            return Err(DdlError::NotCreateTable);
        }
        i += 1;
        if word(i, "IF") && word(i + 1, "NOT") && word(i + 2, "EXISTS") {
            i += 3;
        }
        let name_start = tokens.get(i).ok_or(DdlError::NotCreateTable)?.start;
        if tokens.get(i + 1).is_some_and(|t| t.kind == Kind::Punct('.')) {
            i += 2;
        }
        let name_end = tokens.get(i).ok_or(DdlError::NotCreateTable)?.end;
        i += 1;

        if tokens.get(i).map(|t| t.kind) != Some(Kind::Punct('(')) {
            return Err(DdlError::NoColumnList);
        }
        let open = i;

        let mut depth = 0usize;
        let mut items = Vec::new();
        let mut item_start = open + 1;
        let mut close = None;
        for (j, token) in tokens.iter().enumerate().skip(open) {
            match token.kind {
                Kind::Punct('(') => depth += 1,
                Kind::Punct(')') => {
                    depth -= 1;
                    if depth == 0 {
                        if j > item_start {
                            items.push((item_start, j - 1));
                        }
                        close = Some(j);
                        break;
                    }
                }
                Kind::Punct(',') if depth == 1 => {
                    items.push((item_start, j - 1));
                    item_start = j + 1;
                }
                _ => {}
            }
        }
        let close = close.ok_or(DdlError::Unterminated {
            what: "column list",
            at: tokens[open].start,
        })?;

        Ok(Self {
            sql,
            tokens,
            name_span: (name_start, name_end),
            close,
            items,
        })
    }

    fn text(&self, i: usize) -> &'a str {
        let t = &self.tokens[i];
        &self.sql[t.start..t.end]
    }

    fn is_word(&self, i: usize, kw: &str) -> bool {
        self.tokens
            .get(i)
            .is_some_and(|t| t.kind == Kind::Word && self.text(i).eq_ignore_ascii_case(kw))
    }

    fn is_punct(&self, i: usize, c: char) -> bool {
        self.tokens.get(i).is_some_and(|t| t.kind == Kind::Punct(c))
    }

    fn ident(&self, i: usize) -> Result<String, DdlError> {
        match self.tokens.get(i) {
            Some(t) if matches!(t.kind, Kind::Word | Kind::Quoted | Kind::Str) => {
                Ok(ident_value(self.sql, t))
            }
            _ => Err(self.malformed(i)),
        }
    }

    fn malformed(&self, i: usize) -> DdlError {
        let at = self
            .tokens
            .get(i)
            .map(|t| t.start)
            .unwrap_or(self.sql.len());
        DdlError::MalformedForeignKey(at)
    }

    /// Parse `( a, b, ... )` starting at the open parenthesis.
    fn ident_list(&self, mut i: usize) -> Result<(Vec<String>, usize), DdlError> {
        if !self.is_punct(i, '(') {
            return Err(self.malformed(i));
        }
        i += 1;
        let mut names = Vec::new();
        loop {
            names.push(self.ident(i)?);
            i += 1;
            // Tolerate `COLLATE x` / `ASC` / `DESC` after an indexed column
            while i < self.close && !self.is_punct(i, ',') && !self.is_punct(i, ')') {
                i += 1;
            }
            if self.is_punct(i, ',') {
                i += 1;
                continue;
            }
            if self.is_punct(i, ')') {
                return Ok((names, i + 1));
            }
            return Err(self.malformed(i));
        }
    }

    /// Parse from `REFERENCES` to the end of the clause. Returns the
    /// referenced table, its columns, and the index just past the clause.
    fn references(&self, mut i: usize, end: usize) -> Result<(String, Vec<String>, usize), DdlError> {
        if !self.is_word(i, "REFERENCES") {
            return Err(self.malformed(i));
        }
        let table = self.ident(i + 1)?;
        i += 2;
        let mut columns = Vec::new();
        if i <= end && self.is_punct(i, '(') {
            let (cols, next) = self.ident_list(i)?;
            columns = cols;
            i = next;
        }
        while i <= end {
            if self.is_word(i, "ON") {
                i += 2; // ON DELETE | ON UPDATE
                if self.is_word(i, "SET") || self.is_word(i, "NO") {
                    i += 2;
                } else {
                    i += 1;
                }
            } else if self.is_word(i, "MATCH") {
                i += 2;
            } else if self.is_word(i, "NOT") && self.is_word(i + 1, "DEFERRABLE") {
                i += 2;
                if self.is_word(i, "INITIALLY") {
                    i += 2;
                }
            } else if self.is_word(i, "DEFERRABLE") {
                i += 1;
                if self.is_word(i, "INITIALLY") {
                    i += 2;
                }
            } else {
                break;
            }
        }
        if i > end + 1 {
            return Err(self.malformed(end));
        }
        Ok((table, columns, i))
    }

    /// Every foreign-key clause in declaration order.
    pub fn foreign_keys(&self) -> Result<Vec<ForeignKeyClause>, DdlError> {
        let mut clauses = Vec::new();
        for (index, &(first, last)) in self.items.iter().enumerate() {
            let named = self.is_word(first, "CONSTRAINT");
            let head = if named { first + 2 } else { first };
            let is_table_constraint = named
                || ["PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]
                    .iter()
                    .any(|kw| self.is_word(first, kw));

            if is_table_constraint {
                if !(self.is_word(head, "FOREIGN") && self.is_word(head + 1, "KEY")) {
                    continue;
                }
                let (columns, next) = self.ident_list(head + 2)?;
                let (referenced_table, referenced_columns, _) = self.references(next, last)?;
                clauses.push(ForeignKeyClause {
                    name: if named { Some(self.ident(first + 1)?) } else { None },
                    columns,
                    referenced_table,
                    referenced_columns,
                    location: Location::Item(index),
                });
                continue;
            }

            // Column definition; look for inline REFERENCES outside parens
            let column = self.ident(first)?;
            let mut depth = 0usize;
            let mut i = first + 1;
            while i <= last {
                match self.tokens[i].kind {
                    Kind::Punct('(') => depth += 1,
                    Kind::Punct(')') => depth = depth.saturating_sub(1),
                    _ if depth == 0 && self.is_word(i, "REFERENCES") => {
                        let (start, name) = if i >= first + 3 && self.is_word(i - 2, "CONSTRAINT") {
                            (i - 2, Some(self.ident(i - 1)?))
                        } else {
                            (i, None)
                        };
                        let (referenced_table, referenced_columns, next) = self.references(i, last)?;
                        clauses.push(ForeignKeyClause {
                            name,
                            columns: vec![column.clone()],
                            referenced_table,
                            referenced_columns,
                            location: Location::Inline {
                                first: start,
                                last: next - 1,
                            },
                        });
                        i = next;
                        continue;
                    }
                    _ => {}
                }
                i += 1;
            }
        }
        Ok(clauses)
    }

    /// The statement with `clause` removed.
    pub fn without(&self, clause: &ForeignKeyClause) -> String {
        let (from, to) = match clause.location {
            Location::Item(index) => {
                let (first, last) = self.items[index];
                if index > 0 {
                    // Take the preceding comma along with the item
                    let (_, prev_last) = self.items[index - 1];
                    (self.tokens[prev_last].end, self.tokens[last].end)
                } else if let Some(&(next_first, _)) = self.items.get(1) {
                    (self.tokens[first].start, self.tokens[next_first].start)
                } else {
                    (self.tokens[first].start, self.tokens[last].end)
                }
            }
            Location::Inline { first, last } => {
                (self.tokens[first - 1].end, self.tokens[last].end)
            }
        };
        format!("{}{}", &self.sql[..from], &self.sql[to..])
    }

    /// The statement with a table constraint appended after the last item.
    pub fn with_constraint(&self, constraint: &str) -> String {
        let at = match self.items.last() {
            Some(&(_, last)) => self.tokens[last].end,
            None => self.tokens[self.close].start,
        };
        format!("{},\n  {}{}", &self.sql[..at], constraint, &self.sql[at..])
    }

    /// The statement with the table name replaced by `new_name` (already
    /// quoted and, if needed, schema-qualified).
    pub fn renamed(&self, new_name: &str) -> String {
        let (from, to) = self.name_span;
        format!("{}{}{}", &self.sql[..from], new_name, &self.sql[to..])
    }
}

/// Render a table-level constraint clause for `fk`.
pub fn render_foreign_key(fk: &ForeignKeyConstraint) -> String {
    let list = |cols: &[String]| {
        cols.iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        quote_ident(&fk.name),
        list(&fk.columns),
        quote_ident(&fk.referenced_table.name),
        list(&fk.referenced_columns),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql(),
    )
}
