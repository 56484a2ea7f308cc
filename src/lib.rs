pub mod ast;
pub mod binder;
pub mod bound;
pub mod cli;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod output;
pub mod parser;
pub mod schema;
pub mod storage;
pub mod value;

pub use ast::{BinOp, Expr, Program, Statement, TablePath, Token, TokenKind};
pub use binder::{BindError, BindErrorKind, Binder, bind};
pub use bound::{BoundProgram, BoundStatement};
pub use error::QqlError;
pub use evaluator::{Evaluator, RuntimeError};
pub use executor::{ErrorPolicy, ExecOptions, ExecResult, Execution, Outcome, Report, RowStream, Session};
pub use lexer::{LexError, Lexer, Position, tokenize};
pub use parser::{ParseError, Parser, parse};
pub use schema::{ColumnDef, FunctionDef, Schema, TableDef};
pub use storage::{MemoryStore, Row, RowId, Storage, StoreError};
pub use value::{DataType, Value};
