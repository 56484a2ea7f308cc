//! # QQL - Abstract Syntax Tree
//!
//! This module defines the syntax tree produced by the [parser](crate::parser)
//! for QQL, a small query language for CRUD over `database.table` stores with
//! user-defined functions and conditional row filters.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, references, calls, operations)
//! - **[operators]** - Binary and unary operators
//! - **[statements]** - Statements (`generate`, `append`, `delete`, `change`, `get`, `if`, ...)
//! - **[function]** - User-defined function declarations
//! - **[program]** - A whole parsed source file
//!
//! ## Quick Start
//!
//! ```text
//! generate shop.users (id int key, name string, age int)
//! append shop.users (id, name, age) -> (1, "John", 30)
//! if age > 18 then:
//!     get shop.users->name
//! end
//! ```
//!
//! ## Core Concepts
//!
//! ### Qualified names
//!
//! `database.table` names a table, `database.table->column` a column of it.
//! `->*` selects every column.
//!
//! ### Conditionals are filters
//!
//! `if` does not branch. A condition over columns narrows the rows seen by
//! the row statements in its body, and nested conditions combine with AND:
//!
//! ```text
//! # rows with age > 18 whose name matches ^J
//! if age > 18 then:
//!     if regexp(name) = "^J" then:
//!         get shop.users->name
//!     end
//! end
//! ```
//!
//! ### Functions
//!
//! ```text
//! generate shop.add(a int, b int) begin
//!     c int = a + b
//!     return c
//! end
//! get shop.add(1, 2)
//! ```
pub mod expressions;
pub mod function;
pub mod operators;
pub mod program;
pub mod statements;
pub mod tokens;

pub use expressions::{Expr, Literal, QualifiedName, TablePath};
pub use function::{FunctionDecl, Param};
pub use operators::{BinOp, UnaryOp};
pub use program::Program;
pub use statements::{ColumnSpec, DeleteTarget, GetTarget, Projection, Statement, StatementKind};
pub use tokens::{Keyword, Token, TokenKind};
