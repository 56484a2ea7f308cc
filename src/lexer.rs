use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Keyword, Token, TokenKind};
use crate::value::{DataType, parse_date, parse_datetime, parse_time};

/// 1-based line and column of a character in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Malformed token: unterminated string, bad number, unknown symbol.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {message}")]
pub struct LexError {
    pub position: Position,
    pub message: String,
}

impl LexError {
    fn new(position: Position, message: impl Into<String>) -> Self {
        LexError {
            position,
            message: message.into(),
        }
    }
}

/// Turns QQL source into tokens on demand.
///
/// Qualified names are merged here: `db.table` and `db.table->column` become a
/// single [`TokenKind::QualifiedName`] as long as no whitespace separates the
/// parts. `db . table` stays three tokens.
///
/// The lexer is also an [`Iterator`] that ends after yielding `Eof` or the
/// first error.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
    finished: bool,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            finished: false,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
                self.at_line_start = true;
            } else {
                self.column += 1;
                if !ch.is_whitespace() {
                    self.at_line_start = false;
                }
            }
            self.position += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lexeme_from(&self, start: usize) -> String {
        self.input[start..self.position].iter().collect()
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if is_ident_char(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn at_dot_segment(&self) -> bool {
        self.current_char() == Some('.') && self.peek_char(1).is_some_and(is_ident_start)
    }

    fn at_arrow_member(&self) -> bool {
        self.current_char() == Some('-')
            && self.peek_char(1) == Some('>')
            && self.peek_char(2).is_some_and(is_ident_start)
    }

    /// Only a backslash directly before the closing quote character is an
    /// escape; every other backslash is kept as-is.
    fn read_string(&mut self, start: Position) -> Result<String, LexError> {
        let quote = self.current_char().unwrap_or('"');
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            if ch == '\\' && self.peek_char(1) == Some(quote) {
                result.push(quote);
                self.advance();
                self.advance();
            } else if ch == quote {
                self.advance();
                return Ok(result);
            } else {
                result.push(ch);
                self.advance();
            }
        }

        Err(LexError::new(start, "unterminated string literal"))
    }

    fn read_number(&mut self, start: Position, start_index: usize) -> Result<TokenKind, LexError> {
        let mut is_float = false;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !is_float {
                if !self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                    return Err(LexError::new(
                        start,
                        format!(
                            "invalid numeric literal `{}`: expected a digit after the decimal point",
                            self.lexeme_from(start_index)
                        ),
                    ));
                }
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        if self.current_char().is_some_and(|c| is_ident_char(c) || c == '.') {
            while self.current_char().is_some_and(|c| is_ident_char(c) || c == '.') {
                self.advance();
            }
            return Err(LexError::new(
                start,
                format!("invalid numeric literal `{}`", self.lexeme_from(start_index)),
            ));
        }

        let text = self.lexeme_from(start_index);
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| LexError::new(start, format!("invalid float literal `{text}`")))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| LexError::new(start, format!("integer literal `{text}` is out of range")))
        }
    }

    /// `date"..."`, `time"..."`, `datetime"..."`
    fn read_typed_literal(&mut self, ty: &str, start: Position) -> Result<TokenKind, LexError> {
        let body = self.read_string(start)?;
        let kind = match ty {
            "date" => parse_date(&body).map(TokenKind::Date),
            "time" => parse_time(&body).map(TokenKind::Time),
            _ => parse_datetime(&body).map(TokenKind::DateTime),
        };
        kind.ok_or_else(|| LexError::new(start, format!("invalid {ty} literal \"{body}\"")))
    }

    fn read_word(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let word = self.read_identifier();

        if matches!(word.as_str(), "date" | "time" | "datetime")
            && matches!(self.current_char(), Some('"') | Some('\''))
        {
            return self.read_typed_literal(&word, start);
        }

        let mut path = vec![word];
        while self.at_dot_segment() {
            self.advance(); // '.'
            path.push(self.read_identifier());
        }

        let mut member = None;
        if self.at_arrow_member() {
            self.advance();
            self.advance();
            member = Some(self.read_identifier());
            if self.at_dot_segment() || self.at_arrow_member() {
                return Err(LexError::new(
                    self.here(),
                    "member access `->` must be the last part of a qualified name",
                ));
            }
        }

        if path.len() > 1 || member.is_some() {
            return Ok(TokenKind::QualifiedName { path, member });
        }

        let word = path.remove(0);
        let kind = match word.as_str() {
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            "empty" => TokenKind::Empty,
            w => {
                if let Some(keyword) = Keyword::from_word(w) {
                    TokenKind::Keyword(keyword)
                } else if let Some(ty) = DataType::from_name(w) {
                    TokenKind::Type(ty)
                } else {
                    TokenKind::Identifier(word)
                }
            }
        };
        Ok(kind)
    }

    fn read_comment(&mut self) -> TokenKind {
        self.advance(); // '#'
        let mut text = String::new();
        while let Some(ch) = self.current_char() {
            if ch == '\n' {
                break;
            }
            text.push(ch);
            self.advance();
        }
        TokenKind::Comment(text.trim().to_string())
    }

    /// Consume one char and return `single`, or two chars and return `double`
    /// when the second char is `second`.
    fn one_or_two(&mut self, second: char, double: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek_char(1) == Some(second) {
            self.advance();
            self.advance();
            double
        } else {
            self.advance();
            single
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Read the next token. Returns `Eof` forever once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start = self.here();
        let start_index = self.position;
        let line_start = self.at_line_start;

        let kind = match self.current_char() {
            None => TokenKind::Eof,
            Some('#') if line_start => self.read_comment(),
            Some('"') | Some('\'') => TokenKind::String(self.read_string(start)?),
            Some(ch) if is_ident_start(ch) => self.read_word(start)?,
            Some(ch) if ch.is_ascii_digit() => self.read_number(start, start_index)?,
            Some('=') => self.single(TokenKind::Eq),
            Some('!') => self.one_or_two('=', TokenKind::NotEq, TokenKind::Bang),
            Some('<') => self.one_or_two('=', TokenKind::LtEq, TokenKind::Lt),
            Some('>') => self.one_or_two('=', TokenKind::GtEq, TokenKind::Gt),
            Some('-') => self.one_or_two('>', TokenKind::Arrow, TokenKind::Minus),
            Some('+') => self.single(TokenKind::Plus),
            Some('*') => self.single(TokenKind::Star),
            Some('/') => self.single(TokenKind::Slash),
            Some('%') => self.single(TokenKind::Percent),
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('[') => self.single(TokenKind::LBracket),
            Some(']') => self.single(TokenKind::RBracket),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some(',') => self.single(TokenKind::Comma),
            Some(';') => self.single(TokenKind::Semicolon),
            Some(':') => self.single(TokenKind::Colon),
            Some('.') => self.single(TokenKind::Dot),
            Some(ch) => {
                return Err(LexError::new(start, format!("unrecognized symbol '{ch}'")));
            }
        };

        Ok(Token::new(kind, self.lexeme_from(start_index), start))
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(token) if token.kind == TokenKind::Eof => self.finished = true,
            Err(_) => self.finished = true,
            Ok(_) => {}
        }
        Some(result)
    }
}

/// Lex a whole source text. The returned sequence always ends with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let tokens = Lexer::new(source).collect::<Result<Vec<_>, _>>()?;
    debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

#[test]
fn test_keywords_are_case_sensitive() {
    let mut lexer = Lexer::new("get Get GET");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Keyword(Keyword::Get));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier("Get".into()));
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier("GET".into()));
}

#[test]
fn test_positions_track_lines() {
    let mut lexer = Lexer::new("get\n  db.t");
    assert_eq!(lexer.next_token().unwrap().position, Position::new(1, 1));
    let name = lexer.next_token().unwrap();
    assert_eq!(name.position, Position::new(2, 3));
    assert_eq!(name.lexeme, "db.t");
}
