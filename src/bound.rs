//! Bound program: the binder's output and the executor's input.
//!
//! Every name is resolved here. Columns carry their position in the row,
//! functions are identified by name and arity, literals are already coerced to
//! the type of the slot they flow into, and row filters collected from
//! enclosing `if` blocks are folded into the statements they narrow.
//!
//! Statements and expressions display in normalized QQL, which is what the
//! driver echoes for every executed statement.

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::ast::{BinOp, TablePath};
use crate::lexer::Position;
use crate::schema::{ColumnDef, FunctionDef};
use crate::value::{DataType, Value};

/// Builtin scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `regexp(text, pattern)`; the one-argument form only appears compared
    /// with a pattern and binds to [`BoundExpr::RegexMatch`]
    Regexp,
    Upper,
    Lower,
    Trim,
    Length,
    Abs,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Regexp,
        Builtin::Upper,
        Builtin::Lower,
        Builtin::Trim,
        Builtin::Length,
        Builtin::Abs,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Regexp => "regexp",
            Builtin::Upper => "upper",
            Builtin::Lower => "lower",
            Builtin::Trim => "trim",
            Builtin::Length => "length",
            Builtin::Abs => "abs",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Builtin::Regexp => 2,
            _ => 1,
        }
    }
}

/// Pattern side of a regular-expression match.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal pattern compiled once at bind time
    Compiled(Regex),
    /// Pattern computed at run time (or a literal that failed to compile,
    /// which then reports the error when evaluated)
    Dynamic(Box<BoundExpr>),
}

/// Resolved expression.
#[derive(Debug, Clone)]
pub enum BoundExpr {
    Literal(Value),

    /// Cell of the row being filtered or changed
    Column {
        name: String,
        index: usize,
        data_type: DataType,
    },

    /// Parameter, local or global variable; `None` when the type is only
    /// known at run time
    Variable {
        name: String,
        data_type: Option<DataType>,
    },

    /// User-defined function call, looked up by name and arity when run
    Call {
        name: String,
        args: Vec<BoundExpr>,
        return_type: Option<DataType>,
        pure: bool,
    },

    Builtin {
        func: Builtin,
        args: Vec<BoundExpr>,
    },

    /// `regexp(subject) = pattern`, `regexp(subject) != pattern`,
    /// `regexp(subject, pattern)`
    RegexMatch {
        subject: Box<BoundExpr>,
        pattern: Pattern,
        negated: bool,
    },

    Binary {
        op: BinOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },

    Not(Box<BoundExpr>),

    Negate(Box<BoundExpr>),

    Set(Vec<BoundExpr>),
}

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Add | BinOp::Subtract => 4,
        BinOp::Multiply | BinOp::Divide | BinOp::Modulo => 5,
        _ => 3,
    }
}

impl BoundExpr {
    /// Static type, when the binder can know it.
    pub fn static_type(&self) -> Option<DataType> {
        match self {
            BoundExpr::Literal(value) => Some(value.data_type()),
            BoundExpr::Column { data_type, .. } => Some(*data_type),
            BoundExpr::Variable { data_type, .. } => *data_type,
            BoundExpr::Call { return_type, .. } => *return_type,
            BoundExpr::Builtin { func, args } => match func {
                Builtin::Regexp => Some(DataType::Bool),
                Builtin::Upper | Builtin::Lower | Builtin::Trim => Some(DataType::String),
                Builtin::Length => Some(DataType::Int),
                Builtin::Abs => args.first().and_then(BoundExpr::static_type),
            },
            BoundExpr::RegexMatch { .. } | BoundExpr::Not(_) => Some(DataType::Bool),
            BoundExpr::Binary { op, left, right } => {
                if op.is_comparison() || op.is_logical() {
                    return Some(DataType::Bool);
                }
                arithmetic_type(*op, left.static_type()?, right.static_type()?)
            }
            BoundExpr::Negate(operand) => operand.static_type(),
            BoundExpr::Set(_) => Some(DataType::Set),
        }
    }

    /// True when evaluating the expression can't touch the store.
    pub fn is_pure(&self) -> bool {
        match self {
            BoundExpr::Literal(_) | BoundExpr::Column { .. } | BoundExpr::Variable { .. } => true,
            BoundExpr::Call { args, pure, .. } => *pure && args.iter().all(BoundExpr::is_pure),
            BoundExpr::Builtin { args, .. } | BoundExpr::Set(args) => args.iter().all(BoundExpr::is_pure),
            BoundExpr::RegexMatch { subject, pattern, .. } => {
                subject.is_pure()
                    && match pattern {
                        Pattern::Compiled(_) => true,
                        Pattern::Dynamic(expr) => expr.is_pure(),
                    }
            }
            BoundExpr::Binary { left, right, .. } => left.is_pure() && right.is_pure(),
            BoundExpr::Not(operand) | BoundExpr::Negate(operand) => operand.is_pure(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BoundExpr::Binary { op, .. } => precedence(*op),
            BoundExpr::RegexMatch { negated: _, .. } => 3,
            _ => u8::MAX,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

/// Result type of an arithmetic operator over two known operand types.
pub fn arithmetic_type(op: BinOp, left: DataType, right: DataType) -> Option<DataType> {
    use DataType::*;
    match (left, right) {
        (Empty, other) | (other, Empty) => Some(other),
        (String, String) if op == BinOp::Add => Some(String),
        (Float, r) if r.is_numeric() => Some(Float),
        (l, Float) if l.is_numeric() => Some(Float),
        // Exact int division may still produce a float
        (l, r) if l.is_numeric() && r.is_numeric() && op == BinOp::Divide => None,
        (l, r) if l.is_numeric() && r.is_numeric() => Some(Int),
        _ => None,
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Literal(value) => write!(f, "{value}"),
            BoundExpr::Column { name, .. } | BoundExpr::Variable { name, .. } => f.write_str(name),
            BoundExpr::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            BoundExpr::Builtin { func, args } => {
                write!(f, "{}(", func.name())?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            BoundExpr::RegexMatch {
                subject,
                pattern,
                negated,
            } => {
                let op = if *negated { "!=" } else { "=" };
                write!(f, "regexp({subject}) {op} ")?;
                match pattern {
                    Pattern::Compiled(re) => write!(f, "{}", Value::String(re.as_str().to_string())),
                    Pattern::Dynamic(expr) => expr.fmt_operand(f, expr.precedence() <= 4),
                }
            }
            BoundExpr::Binary { op, left, right } => {
                let prec = precedence(*op);
                // Comparisons don't chain, so an equal-precedence left operand
                // needs parentheses too.
                let left_parens = left.precedence() < prec || (prec == 3 && left.precedence() == 3);
                left.fmt_operand(f, left_parens)?;
                write!(f, " {op} ")?;
                right.fmt_operand(f, right.precedence() <= prec)
            }
            BoundExpr::Not(operand) => {
                f.write_str("not ")?;
                operand.fmt_operand(f, operand.precedence() != u8::MAX)
            }
            BoundExpr::Negate(operand) => {
                f.write_str("-")?;
                operand.fmt_operand(f, operand.precedence() != u8::MAX)
            }
            BoundExpr::Set(items) => {
                f.write_str("{")?;
                write_list(f, items, ", ")?;
                f.write_str("}")
            }
        }
    }
}

/// Column written by `append` or `change`.
#[derive(Debug, Clone)]
pub struct ColumnWrite {
    pub name: String,
    /// Position of the column in the row
    pub index: usize,
    pub data_type: DataType,
    pub value: BoundExpr,
}

/// Resolved statement variants.
#[derive(Debug, Clone)]
pub enum BoundStatementKind {
    CreateTable {
        table: TablePath,
        columns: Vec<ColumnDef>,
    },

    CreateFunction(Rc<FunctionDef>),

    /// One row; columns not listed are stored as `empty`
    Append {
        table: TablePath,
        writes: Vec<ColumnWrite>,
        width: usize,
    },

    DropTable(TablePath),

    DropColumn {
        table: TablePath,
        column: String,
    },

    DeleteRows {
        table: TablePath,
        filter: BoundExpr,
    },

    /// Rewrites every row matching `filter` (all rows when `None`)
    Change {
        table: TablePath,
        writes: Vec<ColumnWrite>,
        filter: Option<BoundExpr>,
    },

    GetRows {
        table: TablePath,
        /// `(index, name)` of each projected column
        columns: Vec<(usize, String)>,
        wildcard: bool,
        filter: Option<BoundExpr>,
    },

    GetValue(BoundExpr),

    Assign {
        name: String,
        /// Slot type the value is coerced to, if known
        target_type: Option<DataType>,
        /// Type written in the source (`c int = ...`)
        declared_type: Option<DataType>,
        /// Introduces a new variable in the innermost frame
        declare: bool,
        value: BoundExpr,
    },

    Return(BoundExpr),

    /// Conditional over variables only: the body runs once, in its own
    /// variable frame, when the condition holds
    Guard {
        condition: BoundExpr,
        body: Rc<[BoundStatement]>,
    },
}

#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub kind: BoundStatementKind,
    pub position: Position,
}

impl BoundStatement {
    pub fn new(kind: BoundStatementKind, position: Position) -> Self {
        BoundStatement { kind, position }
    }

    /// True for `append`, `change` and row deletion.
    pub fn mutates_rows(&self) -> bool {
        matches!(
            self.kind,
            BoundStatementKind::Append { .. }
                | BoundStatementKind::Change { .. }
                | BoundStatementKind::DeleteRows { .. }
        )
    }

    /// Row filter folded into this statement, if any.
    pub fn filter(&self) -> Option<&BoundExpr> {
        match &self.kind {
            BoundStatementKind::DeleteRows { filter, .. } => Some(filter),
            BoundStatementKind::Change { filter, .. } | BoundStatementKind::GetRows { filter, .. } => {
                filter.as_ref()
            }
            _ => None,
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, body: &[BoundStatement]) -> fmt::Result {
    for statement in body {
        write!(f, " {statement};")?;
    }
    Ok(())
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Filtered row statements print as the equivalent single `if`
        let filter = match &self.kind {
            BoundStatementKind::Change { filter, .. } | BoundStatementKind::GetRows { filter, .. } => {
                filter.as_ref()
            }
            _ => None,
        };
        if let Some(filter) = filter {
            write!(f, "if {filter} then: ")?;
        }

        match &self.kind {
            BoundStatementKind::CreateTable { table, columns } => {
                write!(f, "generate {table} (")?;
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", column.name, column.data_type)?;
                    if column.key {
                        f.write_str(" key")?;
                    }
                }
                f.write_str(")")?;
            }
            BoundStatementKind::CreateFunction(function) => {
                write!(f, "generate {} begin", function.signature())?;
                write_block(f, &function.body)?;
                f.write_str(" end")?;
            }
            BoundStatementKind::Append { table, writes, .. } => {
                write!(f, "append {table} (")?;
                let names: Vec<&str> = writes.iter().map(|w| w.name.as_str()).collect();
                write_list(f, &names, ", ")?;
                f.write_str(") -> (")?;
                let values: Vec<&BoundExpr> = writes.iter().map(|w| &w.value).collect();
                write_list(f, &values, ", ")?;
                f.write_str(")")?;
            }
            BoundStatementKind::DropTable(table) => write!(f, "delete {table}")?,
            BoundStatementKind::DropColumn { table, column } => write!(f, "delete {table}->{column}")?,
            BoundStatementKind::DeleteRows { table, filter } => write!(f, "delete {table} ({filter})")?,
            BoundStatementKind::Change { table, writes, .. } => {
                write!(f, "change {table} (")?;
                for (i, write) in writes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", write.name, write.value)?;
                }
                f.write_str(")")?;
            }
            BoundStatementKind::GetRows {
                table,
                columns,
                wildcard,
                ..
            } => {
                if *wildcard {
                    write!(f, "get {table}->*")?;
                } else {
                    let names: Vec<&str> = columns.iter().map(|(_, name)| name.as_str()).collect();
                    write!(f, "get {table} -> (")?;
                    write_list(f, &names, ", ")?;
                    f.write_str(")")?;
                }
            }
            BoundStatementKind::GetValue(expr) => write!(f, "get {expr}")?,
            BoundStatementKind::Assign {
                name,
                declared_type,
                value,
                ..
            } => match declared_type {
                Some(ty) => write!(f, "{name} {ty} = {value}")?,
                None => write!(f, "{name} = {value}")?,
            },
            BoundStatementKind::Return(expr) => write!(f, "return {expr}")?,
            BoundStatementKind::Guard { condition, body } => {
                write!(f, "if {condition} then:")?;
                write_block(f, body)?;
                f.write_str(" end")?;
            }
        }

        if filter.is_some() {
            f.write_str(" end")?;
        }
        Ok(())
    }
}

/// A fully bound program, ready to execute.
#[derive(Debug, Clone, Default)]
pub struct BoundProgram {
    pub statements: Vec<BoundStatement>,
}

impl BoundProgram {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }
}
