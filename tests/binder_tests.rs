// tests/binder_tests.rs

use qql_lang::bound::{BoundExpr, BoundStatementKind, Pattern};
use qql_lang::{BindError, BindErrorKind, BoundProgram, DataType, Schema, Value, bind, parse, tokenize};

const USERS: &str = "generate shop.users (id int key, name string, age int, born date)\n";

fn bind_source(source: &str) -> Result<BoundProgram, BindError> {
    let program = parse(tokenize(source).expect("source should lex")).expect("source should parse");
    bind(&program, &Schema::new())
}

fn bind_users(source: &str) -> Result<BoundProgram, BindError> {
    bind_source(&format!("{USERS}{source}"))
}

fn bind_error(source: &str) -> BindErrorKind {
    match bind_source(source) {
        Ok(program) => panic!("expected a bind error, bound {} statement(s)", program.len()),
        Err(err) => err.kind,
    }
}

fn users_error(source: &str) -> BindErrorKind {
    bind_error(&format!("{USERS}{source}"))
}

// ============================================================================
// Names
// ============================================================================

#[test]
fn test_unknown_table() {
    assert_eq!(bind_error(r#"append db.table (id, name) -> (1, "test")"#), BindErrorKind::UnknownTable);
    assert_eq!(bind_error("get db.table->*"), BindErrorKind::UnknownTable);
    assert_eq!(bind_error("change db.table (id = 1)"), BindErrorKind::UnknownTable);
    assert_eq!(bind_error("delete db.table"), BindErrorKind::UnknownTable);
}

#[test]
fn test_unknown_table_message() {
    let err = bind_source(r#"append db.table (id, name) -> (1, "test")"#).unwrap_err();
    assert_eq!(err.message, "table `db.table` doesn't exist");
    assert_eq!(err.position, qql_lang::Position::new(1, 1));
}

#[test]
fn test_unknown_column() {
    assert_eq!(users_error("get shop.users->email"), BindErrorKind::UnknownColumn);
    assert_eq!(users_error("append shop.users (email) -> (\"x\")"), BindErrorKind::UnknownColumn);
    assert_eq!(users_error("if email = \"x\" then:\n get shop.users\nend"), BindErrorKind::UnknownColumn);
}

#[test]
fn test_unknown_variable() {
    assert_eq!(bind_error("get missing + 1"), BindErrorKind::UnknownVariable);
}

#[test]
fn test_table_is_visible_to_later_statements() {
    let program = bind_users("get shop.users->name").unwrap();
    assert_eq!(program.len(), 2);
}

#[test]
fn test_duplicate_table_is_rejected() {
    assert_eq!(users_error("generate shop.users (id int)"), BindErrorKind::DuplicateTable);
}

#[test]
fn test_duplicate_column() {
    assert_eq!(bind_error("generate shop.t (a int, a string)"), BindErrorKind::DuplicateColumn);
    assert_eq!(bind_error("generate shop.t (a int key, b int key)"), BindErrorKind::DuplicateColumn);
    assert_eq!(users_error("change shop.users (age = 1, age = 2)"), BindErrorKind::DuplicateColumn);
}

#[test]
fn test_dropped_column_is_unknown_afterwards() {
    let kind = users_error("delete shop.users->name\nappend shop.users (id, name) -> (1, \"John\")");
    assert_eq!(kind, BindErrorKind::UnknownColumn);
}

#[test]
fn test_dropped_table_is_unknown_afterwards() {
    assert_eq!(users_error("delete shop.users\nget shop.users"), BindErrorKind::UnknownTable);
}

#[test]
fn test_binding_leaves_caller_schema_untouched() {
    let schema = Schema::new();
    let program = parse(tokenize(USERS).unwrap()).unwrap();
    bind(&program, &schema).unwrap();
    assert!(schema.tables().next().is_none());
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_string_into_int_column() {
    assert_eq!(users_error(r#"append shop.users (id, age) -> (1, "old")"#), BindErrorKind::TypeMismatch);
    assert_eq!(users_error(r#"change shop.users (age = "old")"#), BindErrorKind::TypeMismatch);
}

#[test]
fn test_append_arity() {
    assert_eq!(users_error("append shop.users (id, name) -> (1)"), BindErrorKind::ArityMismatch);
}

#[test]
fn test_append_literals_are_coerced() {
    let program = bind_users(r#"append shop.users (id, born) -> (1, "2001-02-03")"#).unwrap();
    let BoundStatementKind::Append { writes, width, .. } = &program.statements[1].kind else {
        panic!("expected append");
    };
    assert_eq!(*width, 4);
    assert!(matches!(writes[1].value, BoundExpr::Literal(Value::Date(_))));
}

#[test]
fn test_comparison_literal_takes_column_type() {
    let program = bind_users("if born = \"2001-02-03\" then:\n get shop.users\nend").unwrap();
    let filter = program.statements[1].filter().expect("filtered get");
    let BoundExpr::Binary { right, .. } = filter else {
        panic!("expected a comparison");
    };
    assert!(matches!(**right, BoundExpr::Literal(Value::Date(_))));
}

#[test]
fn test_incomparable_types() {
    assert_eq!(users_error("if age = true then:\n get shop.users\nend"), BindErrorKind::TypeMismatch);
}

#[test]
fn test_condition_must_be_bool() {
    assert_eq!(users_error("if age + 1 then:\n get shop.users\nend"), BindErrorKind::TypeMismatch);
}

#[test]
fn test_declared_variable_type() {
    assert_eq!(bind_error(r#"c int = "three""#), BindErrorKind::TypeMismatch);
    assert_eq!(bind_error("c int = 1\nc int = 2"), BindErrorKind::DuplicateVariable);
    assert!(bind_source("c int = 1\nc = c + 1").is_ok());
}

// ============================================================================
// Row Filters and Guards
// ============================================================================

#[test]
fn test_nested_filters_fold_into_one_conjunction() {
    let program = bind_users("if age > 18 then:\n if regexp(name) = \"^J\" then:\n  get shop.users->name\n end\nend").unwrap();
    assert_eq!(program.len(), 2);
    let statement = &program.statements[1];
    let BoundStatementKind::GetRows { filter: Some(filter), columns, .. } = &statement.kind else {
        panic!("expected a filtered get");
    };
    assert_eq!(columns, &vec![(1, "name".to_string())]);
    assert_eq!(filter.to_string(), "age > 18 and regexp(name) = \"^J\"");
}

#[test]
fn test_regexp_comparison_binds_to_match() {
    let program = bind_users("if regexp(name) != \"^J\" then:\n get shop.users\nend").unwrap();
    let filter = program.statements[1].filter().unwrap();
    assert!(matches!(
        filter,
        BoundExpr::RegexMatch { pattern: Pattern::Compiled(_), negated: true, .. }
    ));
}

#[test]
fn test_lone_regexp_probe_is_rejected() {
    assert_eq!(users_error("if regexp(name) then:\n get shop.users\nend"), BindErrorKind::ArityMismatch);
}

#[test]
fn test_delete_inside_filter_deletes_rows() {
    let program = bind_users("if age < 18 then:\n delete shop.users\nend").unwrap();
    assert!(matches!(program.statements[1].kind, BoundStatementKind::DeleteRows { .. }));
}

#[test]
fn test_filter_applies_to_change_and_delete() {
    let program = bind_users(
        "if id = 1 then:\n change shop.users (age = age + 1)\n delete shop.users (age > 99)\nend",
    )
    .unwrap();
    assert_eq!(program.len(), 3);
    assert!(program.statements[1].filter().is_some());
    let BoundStatementKind::DeleteRows { filter, .. } = &program.statements[2].kind else {
        panic!("expected row delete");
    };
    assert_eq!(filter.to_string(), "id = 1 and age > 99");
}

#[test]
fn test_append_inside_filter_is_misplaced() {
    let kind = users_error("if id = 1 then:\n append shop.users (id) -> (2)\nend");
    assert_eq!(kind, BindErrorKind::MisplacedStatement);
}

#[test]
fn test_filter_member_must_name_the_filtered_table() {
    let source = "generate shop.orders (id int)\nif shop.orders->id = 1 then:\n get shop.users\nend";
    assert_eq!(users_error(source), BindErrorKind::UnknownColumn);
    assert!(bind_users("if shop.users->id = 1 then:\n get shop.users\nend").is_ok());
}

#[test]
fn test_variable_condition_is_a_guard() {
    let program = bind_users("limit int = 18\nif limit > 10 then:\n get shop.users\nend").unwrap();
    let BoundStatementKind::Guard { body, .. } = &program.statements[2].kind else {
        panic!("expected guard");
    };
    assert_eq!(body.len(), 1);
    assert!(body[0].filter().is_none());
}

#[test]
fn test_row_context_prefers_columns() {
    let program = bind_users("age int = 5\nif age > 18 then:\n get shop.users\nend").unwrap();
    // `age` is a variable, so the `if` is a guard; inside the get no filter applies
    assert!(matches!(program.statements[2].kind, BoundStatementKind::Guard { .. }));

    let program = bind_users("age int = 5\nif id > age then:\n get shop.users\nend").unwrap();
    let filter = program.statements[2].filter().unwrap();
    assert_eq!(filter.to_string(), "id > age");
    let BoundExpr::Binary { right, .. } = filter else {
        panic!("expected comparison");
    };
    assert!(matches!(**right, BoundExpr::Column { .. }));
}

#[test]
fn test_generate_inside_block_is_misplaced() {
    assert_eq!(
        bind_error("x int = 1\nif x = 1 then:\n generate shop.t (a int)\nend"),
        BindErrorKind::MisplacedStatement
    );
}

#[test]
fn test_return_outside_function_is_misplaced() {
    assert_eq!(bind_error("return 1"), BindErrorKind::MisplacedStatement);
}

// ============================================================================
// Functions
// ============================================================================

const ADD: &str = "generate shop.add(a int, b int) begin\n c int = a + b\n return c\nend\n";

#[test]
fn test_function_call_binds() {
    let program = bind_source(&format!("{ADD}get shop.add(1, 2)")).unwrap();
    let BoundStatementKind::GetValue(BoundExpr::Call { name, args, pure, .. }) = &program.statements[1].kind else {
        panic!("expected a call");
    };
    assert_eq!(name, "shop.add");
    assert_eq!(args.len(), 2);
    assert!(*pure);
}

#[test]
fn test_wrong_arity_is_a_bind_error() {
    assert_eq!(bind_error(&format!("{ADD}get shop.add(1)")), BindErrorKind::ArityMismatch);
}

#[test]
fn test_unknown_function() {
    assert_eq!(bind_error("get shop.mul(1, 2)"), BindErrorKind::UnknownFunction);
}

#[test]
fn test_argument_type_mismatch() {
    assert_eq!(bind_error(&format!("{ADD}get shop.add(1, \"two\")")), BindErrorKind::TypeMismatch);
}

#[test]
fn test_overloads_by_arity() {
    let source = format!("{ADD}generate shop.add(a int) begin\n return a\nend\nget shop.add(1)\nget shop.add(1, 2)");
    assert!(bind_source(&source).is_ok());
}

#[test]
fn test_duplicate_function() {
    assert_eq!(bind_error(&format!("{ADD}{ADD}")), BindErrorKind::DuplicateFunction);
}

#[test]
fn test_body_cannot_see_globals() {
    let source = "x int = 1\ngenerate shop.f() begin\n return x\nend";
    assert_eq!(bind_error(source), BindErrorKind::UnknownVariable);
}

#[test]
fn test_get_inside_function_is_misplaced() {
    let source = format!("{USERS}generate shop.f() begin\n get shop.users\nend");
    assert_eq!(bind_error(&source), BindErrorKind::MisplacedStatement);
}

#[test]
fn test_recursive_function_binds() {
    let source = "generate shop.fact(n int) -> int begin\n if n <= 1 then:\n  return 1\n end\n return n * shop.fact(n - 1)\nend";
    assert!(bind_source(source).is_ok());
}

#[test]
fn test_return_is_coerced_to_declared_type() {
    assert_eq!(
        bind_error("generate shop.f() -> int begin\n return \"x\"\nend"),
        BindErrorKind::TypeMismatch
    );
}

#[test]
fn test_impure_function_in_row_context() {
    let source = format!(
        "{USERS}generate shop.log(n int) -> bool begin\n append shop.users (id) -> (n)\n return true\nend\n\
         if shop.log(id) then:\n get shop.users\nend"
    );
    assert_eq!(bind_error(&source), BindErrorKind::SideEffectInRowContext);
}

#[test]
fn test_impure_function_is_marked() {
    let source = format!("{USERS}generate shop.touch() begin\n change shop.users (age = 0)\nend");
    let program = bind_source(&source).unwrap();
    let BoundStatementKind::CreateFunction(function) = &program.statements[1].kind else {
        panic!("expected function");
    };
    assert!(!function.pure);
    assert_eq!(function.return_type, None::<DataType>);
}

#[test]
fn test_failed_function_is_not_registered() {
    let source = "generate shop.f() begin\n return nope\nend\nget shop.f()";
    let program = parse(tokenize(source).unwrap()).unwrap();
    let results = qql_lang::Binder::new(&Schema::new()).bind_each(&program);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap_err().kind, BindErrorKind::UnknownVariable);
    assert_eq!(results[1].as_ref().unwrap_err().kind, BindErrorKind::UnknownFunction);
}

// ============================================================================
// Builtins
// ============================================================================

#[test]
fn test_builtin_arity_and_types() {
    assert!(bind_source(r#"get upper("a")"#).is_ok());
    assert_eq!(bind_error(r#"get upper("a", "b")"#), BindErrorKind::ArityMismatch);
    assert_eq!(bind_error("get upper(1)"), BindErrorKind::TypeMismatch);
    assert_eq!(bind_error(r#"get abs("x")"#), BindErrorKind::TypeMismatch);
}

#[test]
fn test_two_argument_regexp() {
    let program = bind_source(r#"get regexp("John", "^J")"#).unwrap();
    assert!(matches!(
        program.statements[0].kind,
        BoundStatementKind::GetValue(BoundExpr::RegexMatch { negated: false, .. })
    ));
}

#[test]
fn test_normalized_statement_text() {
    let program = bind_users(r#"append shop.users (id, name) -> (1, "John")"#).unwrap();
    assert_eq!(program.statements[0].to_string(), "generate shop.users (id int key, name string, age int, born date)");
    assert_eq!(program.statements[1].to_string(), r#"append shop.users (id, name) -> (1, "John")"#);
}
