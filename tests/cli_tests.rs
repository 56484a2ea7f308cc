// tests/cli_tests.rs

use std::io::Write;
use std::process::Command;

use qql_lang::cli::{self, CliError, RunOptions, RunSummary};
use qql_lang::output::Format;
use tempfile::NamedTempFile;

const SOURCE: &str = r#"# Hi
generate shop.users (id int key, name string)
append shop.users (id, name) -> (1, "John")
get shop.users->name
"#;

fn run_capture(source: &str, options: &RunOptions) -> (RunSummary, String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let summary = cli::execute_run(source, options, &mut out, &mut err).unwrap();
    (
        summary,
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

fn source_file(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(source.as_bytes()).unwrap();
    file
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_text_output() {
    let (summary, out, err) = run_capture(SOURCE, &RunOptions::default());
    assert_eq!(summary, RunSummary { succeeded: 3, failed: 0 });
    assert_eq!(
        out,
        "generate shop.users (id int key, name string) => created table shop.users\n\
         append shop.users (id, name) -> (1, \"John\") => appended 1 row\n\
         get shop.users -> (name) => 1 row(s)\n  name: \"John\"\n"
    );
    assert!(err.is_empty());
}

#[test]
fn test_run_json_output() {
    let options = RunOptions {
        format: Format::Json,
        ..RunOptions::default()
    };
    let (_, out, _) = run_capture(SOURCE, &options);
    let last = out.lines().last().unwrap();
    let json: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(json["result"], "1 row(s)");
    assert_eq!(json["rows"][0]["name"], "John");
}

#[test]
fn test_run_stops_at_first_failure() {
    let (summary, out, err) = run_capture("get 1\nget 1 / 0\nget 2", &RunOptions::default());
    assert_eq!(summary, RunSummary { succeeded: 1, failed: 1 });
    assert_eq!(out, "get 1 => 1\n");
    assert_eq!(err, "2:1: runtime error: division by zero\n");
}

#[test]
fn test_run_keep_going() {
    let options = RunOptions {
        keep_going: true,
        ..RunOptions::default()
    };
    let (summary, out, err) = run_capture("get 1 / 0\nget nope\nget 2", &options);
    assert_eq!(summary, RunSummary { succeeded: 1, failed: 2 });
    assert_eq!(out, "get 2 => 2\n");
    assert_eq!(err.lines().count(), 2);
}

#[test]
fn test_run_reports_syntax_errors_once() {
    let (summary, out, err) = run_capture("get 1\nget (1", &RunOptions::default());
    assert_eq!(summary, RunSummary { succeeded: 0, failed: 1 });
    assert!(out.is_empty());
    assert!(err.starts_with("2:") && err.contains("parse error: expected"), "got: {}", err);
}

#[test]
fn test_run_call_depth_option() {
    let options = RunOptions {
        max_call_depth: 3,
        ..RunOptions::default()
    };
    let source = "generate db.down(n int) -> int begin\n  if n = 0 then:\n    return 0\n  end\n  return db.down(n - 1)\nend\nget db.down(2)\nget db.down(5)";
    let (summary, out, err) = run_capture(source, &options);
    assert_eq!(summary, RunSummary { succeeded: 2, failed: 1 });
    assert!(out.ends_with("get db.down(2) => 0\n"));
    assert!(err.contains("call depth exceeded 3"));
}

#[test]
fn test_run_empty_source() {
    let (summary, out, err) = run_capture("", &RunOptions::default());
    assert_eq!(summary, RunSummary::default());
    assert!(out.is_empty() && err.is_empty());
}

// ============================================================================
// check, tokens, docs
// ============================================================================

#[test]
fn test_check_counts_statements() {
    let result = cli::execute_check(SOURCE).unwrap();
    assert_eq!(result.statements, 3);
}

#[test]
fn test_check_folds_filters() {
    let source = "generate shop.t (a int)\nif a > 1 then:\n  if a < 5 then:\n    get shop.t\n  end\nend";
    assert_eq!(cli::execute_check(source).unwrap().statements, 2);
}

#[test]
fn test_check_reports_bind_errors() {
    let err = cli::execute_check("get shop.users").unwrap_err();
    assert!(matches!(err, CliError::Qql(_)));
    assert_eq!(
        err.to_string(),
        "1:1: bind error: unknown table: table `shop.users` doesn't exist"
    );
}

#[test]
fn test_dump_tokens() {
    let dump = cli::dump_tokens("get db.t->a").unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("1:1 Keyword(Get)"));
    assert!(lines[1].starts_with("1:5 QualifiedName"));
    assert!(lines[1].ends_with("db.t->a"));
}

#[test]
fn test_docs() {
    assert!(cli::get_docs_overview().contains("qql doc"));
    assert!(cli::get_doc_category("conditionals").unwrap().contains("if"));
    let err = cli::get_doc_category("nope").unwrap_err();
    assert!(err.to_string().starts_with("Unknown category: 'nope'"));
}

// ============================================================================
// Binary
// ============================================================================

fn qql() -> Command {
    Command::new(env!("CARGO_BIN_EXE_qql"))
}

#[test]
fn test_binary_runs_a_file() {
    let file = source_file(SOURCE);
    let output = qql().arg("run").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.ends_with("  name: \"John\"\n"));
}

#[test]
fn test_binary_exit_code_on_failure() {
    let file = source_file("get 1 / 0\n");
    let output = qql().arg("run").arg(file.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("1:1: runtime error: division by zero"));
}

#[test]
fn test_binary_check() {
    let file = source_file(SOURCE);
    let output = qql().arg("check").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "OK: 3 statement(s)\n");
}

#[test]
fn test_binary_missing_file() {
    let output = qql().args(["run", "/nonexistent/source.qql"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8(output.stderr).unwrap().starts_with("IO error"));
}
