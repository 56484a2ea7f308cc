//! Validate QQL sources without executing them

use tracing::debug;

use super::CliError;
use crate::ast::TokenKind;
use crate::{Session, tokenize};

/// Result of a check operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Top-level statements after binding (row filters are folded away)
    pub statements: usize,
}

/// Lex, parse and bind `source` against an empty catalog.
pub fn execute_check(source: &str) -> Result<CheckResult, CliError> {
    let statements = Session::new().prepare(source)?;
    debug!(statements = statements.len(), "source checked");
    Ok(CheckResult {
        statements: statements.len(),
    })
}

/// One line per token: position, kind and source text.
pub fn dump_tokens(source: &str) -> Result<String, CliError> {
    let tokens = tokenize(source).map_err(crate::QqlError::from)?;
    let mut out = String::new();
    for token in tokens.iter().filter(|t| t.kind != TokenKind::Eof) {
        out.push_str(token.to_string().trim_end());
        out.push('\n');
    }
    Ok(out)
}
