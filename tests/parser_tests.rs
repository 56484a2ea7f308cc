// tests/parser_tests.rs

use qql_lang::ast::{
    BinOp, ColumnSpec, DeleteTarget, Expr, GetTarget, Literal, Program, Projection, QualifiedName, Statement,
    StatementKind, TablePath, UnaryOp,
};
use qql_lang::{DataType, ParseError, parse, tokenize};

fn parse_source(source: &str) -> Result<Program, ParseError> {
    parse(tokenize(source).expect("source should lex"))
}

fn parse_one(source: &str) -> Statement {
    let program = parse_source(source).unwrap();
    assert_eq!(program.len(), 1, "expected a single statement in: {}", source);
    program.statements.into_iter().next().unwrap()
}

fn parse_get_expr(source: &str) -> Expr {
    match parse_one(&format!("get {source}")).kind {
        StatementKind::Get(GetTarget::Expr(expr)) => expr,
        other => panic!("expected an expression get, got {:?}", other),
    }
}

fn users() -> TablePath {
    TablePath::new("shop", "users")
}

fn int(n: i64) -> Expr {
    Expr::Literal(Literal::Integer(n))
}

// ============================================================================
// Table Statements
// ============================================================================

#[test]
fn test_generate_table() {
    let statement = parse_one("generate shop.users (id int key, name string, age int)");
    let StatementKind::Generate { table, columns } = statement.kind else {
        panic!("expected generate");
    };
    assert_eq!(table, users());
    let summary: Vec<(&str, DataType, bool)> = columns
        .iter()
        .map(|c: &ColumnSpec| (c.name.as_str(), c.data_type, c.key))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("id", DataType::Int, true),
            ("name", DataType::String, false),
            ("age", DataType::Int, false),
        ]
    );
}

#[test]
fn test_generate_spanning_lines() {
    let statement = parse_one("generate shop.users (\n    id int,\n    name string\n)");
    assert!(matches!(statement.kind, StatementKind::Generate { ref columns, .. } if columns.len() == 2));
}

#[test]
fn test_generate_requires_columns() {
    let err = parse_source("generate shop.users ()").unwrap_err();
    assert_eq!(err.expected, "column definition");
}

#[test]
fn test_append() {
    let statement = parse_one(r#"append shop.users (id, name, age) -> (1, "John", 30)"#);
    let StatementKind::Append { table, columns, values } = statement.kind else {
        panic!("expected append");
    };
    assert_eq!(table, users());
    assert_eq!(columns, vec!["id", "name", "age"]);
    assert_eq!(
        values,
        vec![int(1), Expr::Literal(Literal::String("John".into())), int(30)]
    );
}

#[test]
fn test_append_without_arrow() {
    assert!(parse_source(r#"append shop.users (id) (1)"#).is_err());
}

#[test]
fn test_delete_forms() {
    let targets: Vec<DeleteTarget> = [
        "delete shop.users",
        "delete shop.users->name",
        "delete shop.users (id = 1)",
    ]
    .iter()
    .map(|source| match parse_one(source).kind {
        StatementKind::Delete { target, .. } => target,
        other => panic!("expected delete, got {:?}", other),
    })
    .collect();

    assert_eq!(targets[0], DeleteTarget::Table);
    assert_eq!(targets[1], DeleteTarget::Column("name".into()));
    assert!(matches!(
        &targets[2],
        DeleteTarget::Rows(Expr::BinaryOp { op: BinOp::Equal, .. })
    ));
}

#[test]
fn test_change() {
    let statement = parse_one(r#"change shop.users (name = "Jane", age = age + 1)"#);
    let StatementKind::Change { table, assignments } = statement.kind else {
        panic!("expected change");
    };
    assert_eq!(table, users());
    let names: Vec<&str> = assignments.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["name", "age"]);
    assert!(matches!(assignments[1].1, Expr::BinaryOp { op: BinOp::Add, .. }));
}

#[test]
fn test_get_projections() {
    let projection = |source: &str| match parse_one(source).kind {
        StatementKind::Get(GetTarget::Table { projection, .. }) => projection,
        other => panic!("expected table get, got {:?}", other),
    };

    assert_eq!(projection("get shop.users"), Projection::Wildcard);
    assert_eq!(projection("get shop.users->*"), Projection::Wildcard);
    assert_eq!(projection("get shop.users->name"), Projection::Columns(vec!["name".into()]));
    assert_eq!(
        projection("get shop.users -> (name, age)"),
        Projection::Columns(vec!["name".into(), "age".into()])
    );
}

#[test]
fn test_get_function_call_is_an_expression() {
    let expr = parse_get_expr("shop.add(1, 2)");
    assert_eq!(
        expr,
        Expr::FunctionCall {
            name: QualifiedName {
                path: vec!["shop".into(), "add".into()],
                member: None,
            },
            args: vec![int(1), int(2)],
            position: qql_lang::Position::new(1, 5),
        }
    );
}

#[test]
fn test_trailing_comma_is_rejected() {
    for source in [
        "generate shop.users (id int,)",
        "append shop.users (id,) -> (1)",
        "append shop.users (id) -> (1,)",
        "get shop.users -> (name,)",
        "get shop.add(1,)",
        "generate shop.f(a int,) begin\nend",
        "change shop.users (name = \"x\",)",
    ] {
        assert!(parse_source(source).is_err(), "Expected error for source: {}", source);
    }
}

// ============================================================================
// Blocks
// ============================================================================

#[test]
fn test_conditional_block() {
    let statement = parse_one("if id = 1 then:\n    get shop.users->*\nend");
    let StatementKind::Conditional { condition, body } = statement.kind else {
        panic!("expected conditional");
    };
    assert!(matches!(condition, Expr::BinaryOp { op: BinOp::Equal, .. }));
    assert_eq!(body.len(), 1);
}

#[test]
fn test_colon_after_then_is_optional() {
    assert!(parse_source("if id = 1 then get shop.users end").is_ok());
}

#[test]
fn test_nested_conditionals() {
    let statement = parse_one(
        "if regexp(name) = \"^J.*\" then:\n  if id > 20 then:\n    get shop.users->age\n  end\nend",
    );
    let StatementKind::Conditional { body, .. } = statement.kind else {
        panic!("expected conditional");
    };
    assert!(matches!(
        &body[0].kind,
        StatementKind::Conditional { body, .. } if body.len() == 1
    ));
}

#[test]
fn test_function_declaration() {
    let statement = parse_one("generate shop.add(a int, b int) -> int begin\n  c int = a + b\n  return c\nend");
    let StatementKind::FunctionDecl(decl) = statement.kind else {
        panic!("expected function declaration");
    };
    assert_eq!(decl.name.to_string(), "shop.add");
    assert_eq!(decl.params.len(), 2);
    assert_eq!(decl.return_type, Some(DataType::Int));
    assert!(matches!(
        &decl.body[0].kind,
        StatementKind::Assignment { name, declared_type: Some(DataType::Int), .. } if name == "c"
    ));
    assert!(matches!(decl.body[1].kind, StatementKind::Return(_)));
}

#[test]
fn test_function_without_return_type() {
    let statement = parse_one("generate shop.noop() begin\nend");
    assert!(matches!(
        statement.kind,
        StatementKind::FunctionDecl(ref decl) if decl.return_type.is_none() && decl.body.is_empty()
    ));
}

#[test]
fn test_unclosed_block() {
    let err = parse_source("if id = 1 then:\n  get shop.users").unwrap_err();
    assert!(err.expected.contains("`end`"));
}

#[test]
fn test_stray_end() {
    let err = parse_source("get shop.users\nend").unwrap_err();
    assert_eq!(err.position, qql_lang::Position::new(2, 1));
}

#[test]
fn test_key_modifier_rejected_on_parameters() {
    assert!(parse_source("generate shop.f(a int key) begin\nend").is_err());
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_precedence_multiplication_over_addition() {
    let expr = parse_get_expr("1 + 2 * 3");
    let Expr::BinaryOp { op: BinOp::Add, right, .. } = expr else {
        panic!("expected addition at the root");
    };
    assert!(matches!(*right, Expr::BinaryOp { op: BinOp::Multiply, .. }));
}

#[test]
fn test_precedence_and_over_or() {
    let expr = parse_get_expr("a = 1 or b = 2 and c = 3");
    let Expr::BinaryOp { op: BinOp::Or, right, .. } = expr else {
        panic!("expected or at the root");
    };
    assert!(matches!(*right, Expr::BinaryOp { op: BinOp::And, .. }));
}

#[test]
fn test_parentheses_override_precedence() {
    let expr = parse_get_expr("(1 + 2) * 3");
    assert!(matches!(expr, Expr::BinaryOp { op: BinOp::Multiply, .. }));
}

#[test]
fn test_comparisons_do_not_chain() {
    assert!(parse_source("get 1 < 2 < 3").is_err());
}

#[test]
fn test_unary_operators() {
    assert!(matches!(parse_get_expr("not x"), Expr::UnaryOp { op: UnaryOp::Not, .. }));
    assert!(matches!(parse_get_expr("!x"), Expr::UnaryOp { op: UnaryOp::Not, .. }));
    assert!(matches!(parse_get_expr("-x"), Expr::UnaryOp { op: UnaryOp::Negate, .. }));
    assert_eq!(parse_get_expr("-5"), int(-5));
}

#[test]
fn test_set_literal() {
    let expr = parse_get_expr(r#"{"a", "b"}"#);
    assert!(matches!(expr, Expr::Set { ref items, .. } if items.len() == 2));
}

#[test]
fn test_typed_and_empty_literals() {
    assert!(matches!(parse_get_expr(r#"date"2024-01-31""#), Expr::Literal(Literal::Date(_))));
    assert_eq!(parse_get_expr("empty"), Expr::Literal(Literal::Empty));
}

// ============================================================================
// Program Structure
// ============================================================================

#[test]
fn test_comments_and_semicolons_are_skipped() {
    let program = parse_source("# Hi\n# This is a comment\nget 1; get 2;\nget 3").unwrap();
    assert_eq!(program.len(), 3);
}

#[test]
fn test_empty_program() {
    assert!(parse_source("").unwrap().is_empty());
}

#[test]
fn test_statement_positions() {
    let program = parse_source("get 1\n\n  get 2").unwrap();
    assert_eq!(program.statements[1].position, qql_lang::Position::new(3, 3));
}

#[test]
fn test_reparsing_tokens_is_deterministic() {
    let source = r#"
generate shop.users (id int key, name string, age int)
append shop.users (id, name, age) -> (1, "John", 30)
if regexp(name) = "^J.*" then:
    if id > 20 then:
        get shop.users->age
    end
end
generate shop.add(a int, b int) begin
    c int = a + b
    return c
end
get shop.add(1, 2)
"#;
    let tokens = tokenize(source).unwrap();
    let first = parse(tokens.clone()).unwrap();
    let second = parse(tokens).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unexpected_token_reports_what_was_found() {
    let err = parse_source("get shop.users -> name").unwrap_err();
    assert_eq!(err.expected, "`*` or `(`");
    assert_eq!(err.found, "identifier `name`");
}
