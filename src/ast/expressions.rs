use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::ast::{BinOp, UnaryOp};
use crate::lexer::Position;

/// A `database.table` path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TablePath {
    pub database: String,
    pub table: String,
}

impl TablePath {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        TablePath {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Identifier segments joined by `.`, with an optional `->member` tail.
///
/// # Examples
/// ```text
/// age                      // path ["age"], no member
/// database.table           // table path
/// database.table->column   // column of a table
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub path: Vec<String>,
    pub member: Option<String>,
}

impl QualifiedName {
    pub fn simple(name: impl Into<String>) -> Self {
        QualifiedName {
            path: vec![name.into()],
            member: None,
        }
    }

    /// The single identifier, if this name is not qualified.
    pub fn as_simple(&self) -> Option<&str> {
        match (self.path.as_slice(), &self.member) {
            ([name], None) => Some(name),
            _ => None,
        }
    }

    /// The `database.table` part, if the path has exactly two segments.
    pub fn table_path(&self) -> Option<TablePath> {
        match self.path.as_slice() {
            [database, table] => Some(TablePath::new(database, table)),
            _ => None,
        }
    }

    /// Dotted path without the member.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())?;
        if let Some(member) = &self.member {
            write!(f, "->{member}")?;
        }
        Ok(())
    }
}

/// Literal values as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    /// `empty`
    Empty,
}

/// Expression node. Each node owns its children.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    ///
    /// # Examples
    /// ```text
    /// 42
    /// "John"
    /// date"2024-01-31"
    /// empty
    /// ```
    Literal(Literal),

    /// Column or variable reference
    ///
    /// A bare identifier names a column of the row being filtered or a
    /// variable in scope; `db.t->col` always names a column.
    ColumnRef {
        name: QualifiedName,
        position: Position,
    },

    /// Function call, builtin or user-defined
    ///
    /// # Examples
    /// ```text
    /// regexp(name) = "^J"
    /// database.add(1, 2)
    /// ```
    FunctionCall {
        name: QualifiedName,
        args: Vec<Expr>,
        position: Position,
    },

    /// Binary operation (comparison, arithmetic, logical)
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: Position,
    },

    /// Prefix operation (`not`, `!`, `-`)
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
        position: Position,
    },

    /// Set literal
    ///
    /// # Example
    /// ```text
    /// {"red", "green"}
    /// ```
    Set {
        items: Vec<Expr>,
        position: Position,
    },
}

impl Expr {
    /// Source position of the node, where one was recorded.
    pub fn position(&self) -> Option<Position> {
        match self {
            Expr::Literal(_) => None,
            Expr::ColumnRef { position, .. }
            | Expr::FunctionCall { position, .. }
            | Expr::BinaryOp { position, .. }
            | Expr::UnaryOp { position, .. }
            | Expr::Set { position, .. } => Some(*position),
        }
    }

    /// Visit every column/variable reference in the expression.
    pub fn walk_refs<'a>(&'a self, visit: &mut dyn FnMut(&'a QualifiedName)) {
        match self {
            Expr::Literal(_) => {}
            Expr::ColumnRef { name, .. } => visit(name),
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk_refs(visit);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.walk_refs(visit);
                right.walk_refs(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk_refs(visit),
            Expr::Set { items, .. } => {
                for item in items {
                    item.walk_refs(visit);
                }
            }
        }
    }
}
