use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::lexer::Position;
use crate::value::DataType;

/// Reserved words. Matching is case-sensitive: `Generate` is an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Generate,
    Append,
    Delete,
    Change,
    Get,
    If,
    Then,
    End,
    Begin,
    Return,
    And,
    Or,
    Not,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "generate" => Keyword::Generate,
            "append" => Keyword::Append,
            "delete" => Keyword::Delete,
            "change" => Keyword::Change,
            "get" => Keyword::Get,
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "end" => Keyword::End,
            "begin" => Keyword::Begin,
            "return" => Keyword::Return,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Generate => "generate",
            Keyword::Append => "append",
            Keyword::Delete => "delete",
            Keyword::Change => "change",
            Keyword::Get => "get",
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::End => "end",
            Keyword::Begin => "begin",
            Keyword::Return => "return",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
        }
    }
}

/// The kind of a lexical token, with its decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 0
    /// ```
    Integer(i64),

    /// Float literal; always contains a decimal point
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// 0.5
    /// ```
    Float(f64),

    /// String literal in double or single quotes
    ///
    /// # Examples
    /// ```text
    /// "John"
    /// 'it\'s'
    /// ```
    String(String),

    /// `true` / `false`
    Boolean(bool),

    /// `date"2024-01-31"`
    Date(NaiveDate),

    /// `time"12:30:00"`
    Time(NaiveTime),

    /// `datetime"2024-01-31 12:30:00"`
    DateTime(NaiveDateTime),

    /// `empty`, the null literal. Also accepted where a type is expected.
    Empty,

    // Names
    /// Plain identifier: `[A-Za-z_][A-Za-z0-9_]*`
    Identifier(String),

    /// Adjacent identifiers joined by `.` and optionally one trailing `->member`
    ///
    /// # Examples
    /// ```text
    /// database.table
    /// database.table->column
    /// ```
    QualifiedName {
        path: Vec<String>,
        member: Option<String>,
    },

    /// Reserved word
    Keyword(Keyword),

    /// Column / parameter type name (`int`, `string`, `datetime`, ...)
    Type(DataType),

    // Operators
    /// `=` (comparison, and assignment inside `change` / declarations)
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `->` when not part of a qualified name (`->*`, `-> (`, `) -> (`)
    Arrow,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `!` (logical not)
    Bang,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    /// A `.` that is not part of a qualified name
    Dot,

    /// `#` line comment, text after the marker
    Comment(String),

    /// End of input
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, TokenKind::Keyword(k) if *k == keyword)
    }

    /// Short human-readable description used in parse diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(n) => format!("integer {n}"),
            TokenKind::Float(n) => format!("float {n}"),
            TokenKind::String(s) => format!("string {s:?}"),
            TokenKind::Boolean(b) => b.to_string(),
            TokenKind::Date(d) => format!("date {d}"),
            TokenKind::Time(t) => format!("time {t}"),
            TokenKind::DateTime(dt) => format!("datetime {dt}"),
            TokenKind::Empty => "`empty`".to_string(),
            TokenKind::Identifier(name) => format!("identifier `{name}`"),
            TokenKind::QualifiedName { path, member } => match member {
                Some(m) => format!("`{}->{}`", path.join("."), m),
                None => format!("`{}`", path.join(".")),
            },
            TokenKind::Keyword(k) => format!("`{}`", k.as_str()),
            TokenKind::Type(t) => format!("type `{t}`"),
            TokenKind::Comment(_) => "comment".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Eq => "=",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Arrow => "->",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            _ => "?",
        }
    }
}

/// A token together with the exact source text it was read from and where it
/// starts. Tokens are never mutated after the lexer produces them.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            position,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {}", self.position, self.kind, self.lexeme)
    }
}
