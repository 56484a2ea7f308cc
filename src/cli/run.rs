//! Execute QQL sources and render their results

use std::io::Write;

use tracing::warn;

use super::CliError;
use crate::executor::{DEFAULT_MAX_CALL_DEPTH, ErrorPolicy, ExecOptions, ExecResult};
use crate::output::{Format, render};
use crate::Session;

/// Options for the run command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub format: Format,
    /// Report failing statements and go on
    pub keep_going: bool,
    pub max_call_depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            format: Format::Text,
            keep_going: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RunOptions {
    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            error_policy: if self.keep_going {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::Abort
            },
            max_call_depth: self.max_call_depth,
        }
    }
}

/// Counts of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Execute `source` in a fresh session.
///
/// Results go to `out` in the requested format and every failure goes to
/// `err` as a one-line diagnostic. Without `keep_going` the run stops at
/// the first failure.
pub fn execute_run(
    source: &str,
    options: &RunOptions,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<RunSummary, CliError> {
    let mut session = Session::new().with_options(options.exec_options());
    let mut summary = RunSummary::default();

    let mut execution = match session.execute_source(source) {
        Ok(execution) => execution,
        Err(error) => {
            writeln!(err, "{}", error.diagnostic())?;
            summary.failed += 1;
            return Ok(summary);
        }
    };

    while let Some(result) = execution.next_result() {
        match result.and_then(ExecResult::materialize) {
            Ok(report) => {
                out.write_all(render(&report, options.format).as_bytes())?;
                summary.succeeded += 1;
            }
            Err(error) => {
                warn!(position = %error.position(), "statement failed");
                writeln!(err, "{}", error.diagnostic())?;
                summary.failed += 1;
                if !options.keep_going {
                    break;
                }
            }
        }
    }
    Ok(summary)
}
