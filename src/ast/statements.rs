use crate::ast::{Expr, FunctionDecl, TablePath};
use crate::lexer::Position;
use crate::value::DataType;

/// Column definition in `generate db.t (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    /// `key` modifier: the column is the table's primary key
    pub key: bool,
    pub position: Position,
}

/// What `delete` removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    /// `delete db.t`: the table itself (or, inside a row filter, the
    /// matching rows)
    Table,
    /// `delete db.t->col`
    Column(String),
    /// `delete db.t (cond)`
    Rows(Expr),
}

/// Columns a table `get` returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `->*`
    Wildcard,
    /// `->col` or `-> (a, b)`
    Columns(Vec<String>),
}

/// What `get` reads.
#[derive(Debug, Clone, PartialEq)]
pub enum GetTarget {
    /// Rows of a table
    Table {
        table: TablePath,
        projection: Projection,
    },
    /// A single value, e.g. `get db.f(1, 2)`
    Expr(Expr),
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Table creation
    ///
    /// # Example
    /// ```text
    /// generate database.table (id int key, name string, age int)
    /// ```
    Generate {
        table: TablePath,
        columns: Vec<ColumnSpec>,
    },

    /// Function declaration
    ///
    /// # Example
    /// ```text
    /// generate database.add(a int, b int) -> int begin
    ///     c int = a + b
    ///     return c
    /// end
    /// ```
    FunctionDecl(FunctionDecl),

    /// Row insertion
    ///
    /// # Example
    /// ```text
    /// append database.table (id, name, age) -> (1, "John", 30)
    /// ```
    Append {
        table: TablePath,
        columns: Vec<String>,
        values: Vec<Expr>,
    },

    /// Table, column, or row removal
    ///
    /// # Examples
    /// ```text
    /// delete database.table
    /// delete database.table->name
    /// delete database.table (id = 1)
    /// ```
    Delete {
        table: TablePath,
        target: DeleteTarget,
    },

    /// Row update; rows are selected by the enclosing `if` filters
    ///
    /// # Example
    /// ```text
    /// change database.table (name = "John", age = 30)
    /// ```
    Change {
        table: TablePath,
        assignments: Vec<(String, Expr)>,
    },

    /// Row or value retrieval
    ///
    /// # Examples
    /// ```text
    /// get database.table->*
    /// get database.table -> (name, age)
    /// get database.add(1, 2)
    /// ```
    Get(GetTarget),

    /// `if cond then: ... end`
    ///
    /// Nested conditionals narrow the same row stream (their conditions are
    /// AND-ed); there is no else branch.
    Conditional {
        condition: Expr,
        body: Vec<Statement>,
    },

    /// `return expr`
    Return(Expr),

    /// Variable declaration (`c int = a + b`) or reassignment (`c = c + 1`)
    Assignment {
        name: String,
        declared_type: Option<DataType>,
        value: Expr,
    },
}

/// A statement and where it starts in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub position: Position,
}

impl Statement {
    pub fn new(kind: StatementKind, position: Position) -> Self {
        Statement { kind, position }
    }

    /// Keyword-ish label for diagnostics.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            StatementKind::Generate { .. } => "generate",
            StatementKind::FunctionDecl(_) => "function declaration",
            StatementKind::Append { .. } => "append",
            StatementKind::Delete { .. } => "delete",
            StatementKind::Change { .. } => "change",
            StatementKind::Get(_) => "get",
            StatementKind::Conditional { .. } => "if",
            StatementKind::Return(_) => "return",
            StatementKind::Assignment { .. } => "assignment",
        }
    }
}
