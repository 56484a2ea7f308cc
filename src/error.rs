use thiserror::Error;

use crate::binder::BindError;
use crate::evaluator::{ExecError, RuntimeError};
use crate::lexer::{LexError, Position};
use crate::parser::ParseError;
use crate::storage::StoreError;

/// Any failure of the lex → parse → bind → execute pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QqlError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("bind error: {0}")]
    Bind(#[from] BindError),

    #[error("{position}: runtime error: {source}")]
    Runtime { position: Position, source: RuntimeError },

    #[error("{position}: store error: {source}")]
    Store { position: Position, source: StoreError },
}

impl QqlError {
    /// Attach the position of the failing statement to an execution error.
    pub fn exec(position: Position, error: ExecError) -> Self {
        match error {
            ExecError::Runtime(source) => QqlError::Runtime { position, source },
            ExecError::Store(source) => QqlError::Store { position, source },
        }
    }

    pub fn position(&self) -> Position {
        match self {
            QqlError::Lex(e) => e.position,
            QqlError::Parse(e) => e.position,
            QqlError::Bind(e) => e.position,
            QqlError::Runtime { position, .. } | QqlError::Store { position, .. } => *position,
        }
    }

    /// Single-line `line:column: stage error: message` form.
    pub fn diagnostic(&self) -> String {
        match self {
            QqlError::Lex(e) => format!("{}: lex error: {}", e.position, e.message),
            QqlError::Parse(e) => format!(
                "{}: parse error: expected {}, found {}",
                e.position, e.expected, e.found
            ),
            QqlError::Bind(e) => format!("{}: bind error: {}: {}", e.position, e.kind, e.message),
            other => other.to_string(),
        }
        .replace('\n', " ")
    }
}
