//! Rendering of execution reports.
//!
//! Two formats are supported:
//!
//! - **Text** via [`render_text()`] - the normalized statement, `=>`, a short
//!   summary, then one indented line per row in QQL literal syntax
//! - **JSON** via [`to_json()`] / [`to_json_pretty()`] - one object per
//!   statement with `statement`, `result` and `rows` keys
//!
//! Object keys are sorted, so the output is deterministic.
//!
//! # Examples
//!
//! ```
//! use qql_lang::Session;
//! use qql_lang::output::{render_text, to_json};
//!
//! let mut session = Session::new();
//! let reports = session.run("get 1 + 2");
//! let report = reports[0].as_ref().unwrap();
//!
//! assert_eq!(render_text(report), "get 1 + 2 => 3\n");
//! assert_eq!(to_json(report), r#"{"result":"3","rows":null,"statement":"get 1 + 2"}"#);
//! ```

use std::str::FromStr;

use serde_json::{Map, Number};

use crate::executor::Report;
use crate::value::Value;

/// Output format of the `run` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format `{other}` (expected text or json)")),
        }
    }
}

/// Convert a QQL value to JSON.
///
/// Temporal values become ISO-8601 strings, `object` payloads become hex
/// strings, sets become arrays, and non-finite floats become `null`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Empty => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Year(y) => serde_json::Value::Number((*y).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) | Value::Enum(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => serde_json::Value::String(t.format("%H:%M:%S").to_string()),
        Value::DateTime(dt) => serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        Value::Object(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            serde_json::Value::String(hex)
        }
        Value::Set(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| serde_json::Value::String(item.clone()))
                .collect(),
        ),
        Value::Json(json) => json.clone(),
    }
}

/// Text rendering of one report, newline-terminated.
pub fn render_text(report: &Report) -> String {
    let mut out = format!("{} => {}\n", report.statement, report.summary);
    if let Some(rows) = &report.rows {
        for row in rows {
            let cells: Vec<String> = report
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| format!("{column}: {value}"))
                .collect();
            out.push_str("  ");
            out.push_str(&cells.join(", "));
            out.push('\n');
        }
    }
    out
}

/// JSON object for one report.
///
/// Rows are objects keyed by column name.
pub fn report_to_json(report: &Report) -> serde_json::Value {
    let rows = match &report.rows {
        Some(rows) => serde_json::Value::Array(
            rows.iter()
                .map(|row| {
                    let object: Map<String, serde_json::Value> = report
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(column, value)| (column.clone(), value_to_json(value)))
                        .collect();
                    serde_json::Value::Object(object)
                })
                .collect(),
        ),
        None => serde_json::Value::Null,
    };

    let mut object = Map::new();
    object.insert("statement".to_string(), serde_json::Value::String(report.statement.clone()));
    object.insert("result".to_string(), serde_json::Value::String(report.summary.clone()));
    object.insert("rows".to_string(), rows);
    serde_json::Value::Object(object)
}

/// Compact single-line JSON for one report.
pub fn to_json(report: &Report) -> String {
    report_to_json(report).to_string()
}

/// Indented JSON for one report.
pub fn to_json_pretty(report: &Report) -> String {
    // Serializing a `serde_json::Value` cannot fail
    serde_json::to_string_pretty(&report_to_json(report)).unwrap_or_default()
}

/// Render a report in the given format, newline-terminated.
pub fn render(report: &Report, format: Format) -> String {
    match format {
        Format::Text => render_text(report),
        Format::Json => {
            let mut line = to_json(report);
            line.push('\n');
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Position;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn users_report() -> Report {
        Report {
            statement: "get shop.users->*".to_string(),
            position: Position::new(3, 1),
            summary: "2 row(s)".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            rows: Some(vec![
                vec![Value::Int(1), Value::String("John".to_string())],
                vec![Value::Int(2), Value::Empty],
            ]),
        }
    }

    #[test]
    fn test_text_rows_are_indented() {
        let text = render_text(&users_report());
        assert_eq!(
            text,
            "get shop.users->* => 2 row(s)\n  id: 1, name: \"John\"\n  id: 2, name: empty\n"
        );
    }

    #[test]
    fn test_json_rows_are_objects() {
        let json = report_to_json(&users_report());
        assert_eq!(json["result"], "2 row(s)");
        assert_eq!(json["rows"][0]["name"], "John");
        assert!(json["rows"][1]["name"].is_null());
    }

    #[test]
    fn test_value_to_json_temporal_and_sets() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(value_to_json(&Value::Date(date)), serde_json::json!("2024-01-31"));

        let set: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(value_to_json(&Value::Set(set)), serde_json::json!(["a", "b"]));
        assert_eq!(value_to_json(&Value::Float(f64::NAN)), serde_json::Value::Null);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert!("yaml".parse::<Format>().is_err());
    }
}
