use crate::ast::{QualifiedName, Statement};
use crate::lexer::Position;
use crate::value::DataType;

/// A typed parameter, or a column definition inside `generate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub data_type: DataType,
    pub position: Position,
}

/// `generate db.f(a int, b int) [-> type] begin ... end`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// Function name, usually `database.function`
    pub name: QualifiedName,

    pub params: Vec<Param>,

    /// Declared result type; `None` means the result is not checked
    pub return_type: Option<DataType>,

    /// Body statements, run in order until a `return`
    pub body: Vec<Statement>,
}
