// tests/lexer_tests.rs

use chrono::{NaiveDate, NaiveTime};
use qql_lang::ast::{Keyword, TokenKind};
use qql_lang::lexer::{Lexer, Position, tokenize};
use qql_lang::DataType;

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source)
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .filter(|k| *k != TokenKind::Eof)
        .collect()
}

fn qualified(path: &[&str], member: Option<&str>) -> TokenKind {
    TokenKind::QualifiedName {
        path: path.iter().map(|s| s.to_string()).collect(),
        member: member.map(String::from),
    }
}

// ============================================================================
// Operators and Punctuation
// ============================================================================

#[test]
fn test_single_char_tokens() {
    let test_cases = vec![
        ("=", TokenKind::Eq),
        ("<", TokenKind::Lt),
        (">", TokenKind::Gt),
        ("+", TokenKind::Plus),
        ("-", TokenKind::Minus),
        ("*", TokenKind::Star),
        ("/", TokenKind::Slash),
        ("%", TokenKind::Percent),
        ("!", TokenKind::Bang),
        ("(", TokenKind::LParen),
        (")", TokenKind::RParen),
        ("[", TokenKind::LBracket),
        ("]", TokenKind::RBracket),
        ("{", TokenKind::LBrace),
        ("}", TokenKind::RBrace),
        (",", TokenKind::Comma),
        (";", TokenKind::Semicolon),
        (":", TokenKind::Colon),
        (".", TokenKind::Dot),
    ];

    for (input, expected) in test_cases {
        let mut lexer = Lexer::new(input);
        assert_eq!(lexer.next_token().unwrap().kind, expected, "Failed for input: {}", input);
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    }
}

#[test]
fn test_two_char_tokens() {
    let test_cases = vec![
        ("!=", TokenKind::NotEq),
        ("<=", TokenKind::LtEq),
        (">=", TokenKind::GtEq),
        ("->", TokenKind::Arrow),
    ];

    for (input, expected) in test_cases {
        assert_eq!(kinds(input), vec![expected], "Failed for input: {}", input);
    }
}

#[test]
fn test_unrecognized_symbol() {
    let err = tokenize("get 1 @ 2").unwrap_err();
    assert_eq!(err.position, Position::new(1, 7));
    assert!(err.message.contains('@'));
}

// ============================================================================
// Keywords, Types and Identifiers
// ============================================================================

#[test]
fn test_keywords() {
    assert_eq!(
        kinds("generate append delete change get if then end begin return and or not"),
        vec![
            TokenKind::Keyword(Keyword::Generate),
            TokenKind::Keyword(Keyword::Append),
            TokenKind::Keyword(Keyword::Delete),
            TokenKind::Keyword(Keyword::Change),
            TokenKind::Keyword(Keyword::Get),
            TokenKind::Keyword(Keyword::If),
            TokenKind::Keyword(Keyword::Then),
            TokenKind::Keyword(Keyword::End),
            TokenKind::Keyword(Keyword::Begin),
            TokenKind::Keyword(Keyword::Return),
            TokenKind::Keyword(Keyword::And),
            TokenKind::Keyword(Keyword::Or),
            TokenKind::Keyword(Keyword::Not),
        ]
    );
}

#[test]
fn test_type_keywords() {
    assert_eq!(
        kinds("int float string bool boolean date time datetime year object enum set json"),
        vec![
            TokenKind::Type(DataType::Int),
            TokenKind::Type(DataType::Float),
            TokenKind::Type(DataType::String),
            TokenKind::Type(DataType::Bool),
            TokenKind::Type(DataType::Bool),
            TokenKind::Type(DataType::Date),
            TokenKind::Type(DataType::Time),
            TokenKind::Type(DataType::DateTime),
            TokenKind::Type(DataType::Year),
            TokenKind::Type(DataType::Object),
            TokenKind::Type(DataType::Enum),
            TokenKind::Type(DataType::Set),
            TokenKind::Type(DataType::Json),
        ]
    );
}

#[test]
fn test_empty_is_a_literal() {
    assert_eq!(kinds("empty"), vec![TokenKind::Empty]);
}

#[test]
fn test_identifiers() {
    assert_eq!(
        kinds("name _private age2"),
        vec![
            TokenKind::Identifier("name".into()),
            TokenKind::Identifier("_private".into()),
            TokenKind::Identifier("age2".into()),
        ]
    );
}

// ============================================================================
// Qualified Names
// ============================================================================

#[test]
fn test_table_path_is_one_token() {
    assert_eq!(kinds("shop.users"), vec![qualified(&["shop", "users"], None)]);
}

#[test]
fn test_column_member_is_one_token() {
    assert_eq!(kinds("shop.users->name"), vec![qualified(&["shop", "users"], Some("name"))]);
}

#[test]
fn test_arrow_star_and_arrow_list() {
    assert_eq!(
        kinds("shop.users->*"),
        vec![qualified(&["shop", "users"], None), TokenKind::Arrow, TokenKind::Star]
    );
    assert_eq!(
        kinds("shop.users -> (a)"),
        vec![
            qualified(&["shop", "users"], None),
            TokenKind::Arrow,
            TokenKind::LParen,
            TokenKind::Identifier("a".into()),
            TokenKind::RParen,
        ]
    );
}

#[test]
fn test_spaced_dot_is_not_merged() {
    assert_eq!(
        kinds("shop . users"),
        vec![
            TokenKind::Identifier("shop".into()),
            TokenKind::Dot,
            TokenKind::Identifier("users".into()),
        ]
    );
}

#[test]
fn test_member_must_be_last() {
    assert!(tokenize("a->b.c").is_err());
    assert!(tokenize("db.t->a->b").is_err());
}

#[test]
fn test_function_name_followed_by_paren() {
    assert_eq!(
        kinds("shop.add(1)"),
        vec![
            qualified(&["shop", "add"], None),
            TokenKind::LParen,
            TokenKind::Integer(1),
            TokenKind::RParen,
        ]
    );
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_numbers() {
    assert_eq!(
        kinds("0 42 2.5"),
        vec![TokenKind::Integer(0), TokenKind::Integer(42), TokenKind::Float(2.5)]
    );
}

#[test]
fn test_malformed_numbers() {
    for input in ["1.", "1.2.3", "12ab", "99999999999999999999"] {
        assert!(tokenize(input).is_err(), "Expected error for input: {}", input);
    }
}

#[test]
fn test_strings_with_either_quote() {
    assert_eq!(
        kinds(r#""John" 'test'"#),
        vec![TokenKind::String("John".into()), TokenKind::String("test".into())]
    );
}

#[test]
fn test_escaped_quote() {
    assert_eq!(kinds(r#""say \"hi\"""#), vec![TokenKind::String("say \"hi\"".into())]);
}

#[test]
fn test_unterminated_string() {
    let err = tokenize("get \"open").unwrap_err();
    assert_eq!(err.position, Position::new(1, 5));
}

#[test]
fn test_booleans() {
    assert_eq!(kinds("true false"), vec![TokenKind::Boolean(true), TokenKind::Boolean(false)]);
}

#[test]
fn test_typed_literals() {
    assert_eq!(
        kinds(r#"date"2024-01-31" time"12:30:00""#),
        vec![
            TokenKind::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            TokenKind::Time(NaiveTime::from_hms_opt(12, 30, 0).unwrap()),
        ]
    );
    let datetime = kinds(r#"datetime"2024-01-31 12:30:00""#);
    assert!(matches!(datetime.as_slice(), [TokenKind::DateTime(_)]));
}

#[test]
fn test_invalid_typed_literal() {
    assert!(tokenize(r#"date"2024-13-45""#).is_err());
}

#[test]
fn test_spaced_type_keyword_is_not_a_literal() {
    assert_eq!(
        kinds(r#"date "2024-01-31""#),
        vec![TokenKind::Type(DataType::Date), TokenKind::String("2024-01-31".into())]
    );
}

// ============================================================================
// Comments and Positions
// ============================================================================

#[test]
fn test_comment_at_line_start() {
    assert_eq!(
        kinds("# Hi\n  # indented\nget 1"),
        vec![
            TokenKind::Comment("Hi".into()),
            TokenKind::Comment("indented".into()),
            TokenKind::Keyword(Keyword::Get),
            TokenKind::Integer(1),
        ]
    );
}

#[test]
fn test_hash_after_code_is_an_error() {
    assert!(tokenize("get 1 # trailing").is_err());
}

#[test]
fn test_token_sequence_ends_with_eof() {
    let tokens = tokenize("").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn test_lexemes_keep_source_text() {
    let tokens = tokenize("append shop.users (id) -> (1)").unwrap();
    let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
    assert_eq!(lexemes, vec!["append", "shop.users", "(", "id", ")", "->", "(", "1", ")", ""]);
}
