//! CLI support for qql-lang
//!
//! Provides programmatic access to the `qql` subcommands so the driver can
//! be exercised without spawning a process.

mod check;
mod docs;
mod run;

pub use check::{CheckResult, dump_tokens, execute_check};
pub use docs::{DocCategory, get_doc_category, get_docs_overview};
pub use run::{RunOptions, RunSummary, execute_run};

use std::io;

use thiserror::Error;

use crate::QqlError;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    /// Lex, parse, bind or execution failure
    #[error("{}", .0.diagnostic())]
    Qql(#[from] QqlError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Nothing to read: no file given and stdin is a terminal
    #[error("No input provided. Pass a FILE or pipe QQL source to stdin.")]
    NoInput,

    #[error("Unknown category: '{0}'\nRun 'qql docs' to see available categories.")]
    UnknownCategory(String),

    /// `run` finished with failing statements, already reported
    #[error("{0} statement(s) failed")]
    Failed(usize),
}
