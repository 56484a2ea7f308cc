use std::mem;

use thiserror::Error;
use tracing::debug;

use crate::{
    ast::{
        BinOp, ColumnSpec, DeleteTarget, Expr, FunctionDecl, GetTarget, Keyword, Literal, Param,
        Program, Projection, QualifiedName, Statement, StatementKind, TablePath, Token, TokenKind,
        UnaryOp,
    },
    lexer::Position,
    value::DataType,
};

/// Grammar violation: what the parser wanted and what it got instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: expected {expected}, found {found}")]
pub struct ParseError {
    pub position: Position,
    pub expected: String,
    pub found: String,
}

/// A block whose `end` has not been seen yet.
enum OpenBlock {
    Conditional {
        condition: Expr,
        position: Position,
        body: Vec<Statement>,
    },
    Function {
        decl: FunctionDecl,
        position: Position,
    },
}

impl OpenBlock {
    fn body_mut(&mut self) -> &mut Vec<Statement> {
        match self {
            OpenBlock::Conditional { body, .. } => body,
            OpenBlock::Function { decl, .. } => &mut decl.body,
        }
    }

    fn opener(&self) -> (&'static str, Position) {
        match self {
            OpenBlock::Conditional { position, .. } => ("if", *position),
            OpenBlock::Function { position, .. } => ("begin", *position),
        }
    }

    fn close(self) -> Statement {
        match self {
            OpenBlock::Conditional {
                condition,
                position,
                body,
            } => Statement::new(StatementKind::Conditional { condition, body }, position),
            OpenBlock::Function { decl, position } => {
                Statement::new(StatementKind::FunctionDecl(decl), position)
            }
        }
    }
}

/// One step of the statement grammar: either a complete statement, the header
/// of a block, or the `end` closing the innermost block.
enum Item {
    Statement(Statement),
    Open(OpenBlock),
    Close(Position),
}

/// Recursive-descent parser over a token sequence. Block nesting (`if`/`end`,
/// `begin`/`end`) is tracked on an explicit stack rather than by recursion.
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    /// Comment tokens are dropped; an `Eof` token is appended if missing.
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Comment(_)))
            .collect();
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let position = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", position));
        }
        Parser { tokens, index: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let i = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn position(&self) -> Position {
        self.current().position
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.current().kind) == mem::discriminant(kind)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.current().kind.is_keyword(keyword)
    }

    fn error(&self, expected: impl Into<String>) -> ParseError {
        ParseError {
            position: self.position(),
            expected: expected.into(),
            found: self.current().kind.describe(),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        if self.check_keyword(keyword) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("`{}`", keyword.as_str())))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn parse_type(&mut self) -> Result<DataType, ParseError> {
        let ty = match self.current().kind {
            TokenKind::Type(ty) => ty,
            TokenKind::Empty => DataType::Empty,
            _ => return Err(self.error("type name")),
        };
        self.advance();
        Ok(ty)
    }

    /// `database.table`, optionally followed by `->member`
    fn parse_table_ref(&mut self) -> Result<(TablePath, Option<String>), ParseError> {
        let found = match &self.current().kind {
            TokenKind::QualifiedName { path, member } => match path.as_slice() {
                [database, table] => Some((TablePath::new(database, table), member.clone())),
                _ => None,
            },
            _ => None,
        };
        match found {
            Some(result) => {
                self.advance();
                Ok(result)
            }
            None => Err(self.error("table name (database.table)")),
        }
    }

    fn parse_table_path(&mut self) -> Result<TablePath, ParseError> {
        let position = self.position();
        let found = self.current().kind.describe();
        match self.parse_table_ref()? {
            (table, None) => Ok(table),
            (_, Some(_)) => Err(ParseError {
                position,
                expected: "table name (database.table)".to_string(),
                found,
            }),
        }
    }

    /// `( a, b, c )` with at least one identifier and no trailing comma
    fn parse_identifier_list(&mut self, what: &str) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut names = vec![self.expect_identifier(what)?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            names.push(self.expect_identifier(what)?);
        }
        self.expect(TokenKind::RParen, "`,` or `)`")?;
        Ok(names)
    }

    /// Comma-separated expressions up to `)`, the `(` already consumed.
    fn parse_expression_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.check(&TokenKind::RParen) {
            self.advance();
            return Ok(items);
        }
        items.push(self.parse_expression()?);
        while self.check(&TokenKind::Comma) {
            self.advance();
            items.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RParen, "`,` or `)`")?;
        Ok(items)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Parse primary expressions: literals, references, calls, `( ... )`, `{ ... }`
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Integer(n) => Expr::Literal(Literal::Integer(n)),
            TokenKind::Float(n) => Expr::Literal(Literal::Float(n)),
            TokenKind::String(s) => Expr::Literal(Literal::String(s)),
            TokenKind::Boolean(b) => Expr::Literal(Literal::Boolean(b)),
            TokenKind::Date(d) => Expr::Literal(Literal::Date(d)),
            TokenKind::Time(t) => Expr::Literal(Literal::Time(t)),
            TokenKind::DateTime(dt) => Expr::Literal(Literal::DateTime(dt)),
            TokenKind::Empty => Expr::Literal(Literal::Empty),

            TokenKind::Identifier(name) => {
                self.parse_reference_or_call(QualifiedName::simple(name), position)?
            }
            TokenKind::QualifiedName { path, member } => {
                self.parse_reference_or_call(QualifiedName { path, member }, position)?
            }

            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                expr
            }

            TokenKind::LBrace => {
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    items.push(self.parse_expression()?);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        items.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenKind::RBrace, "`,` or `}`")?;
                Expr::Set { items, position }
            }

            kind => {
                return Err(ParseError {
                    position,
                    expected: "expression".to_string(),
                    found: kind.describe(),
                });
            }
        };
        Ok(expr)
    }

    fn parse_reference_or_call(
        &mut self,
        name: QualifiedName,
        position: Position,
    ) -> Result<Expr, ParseError> {
        if name.member.is_none() && self.check(&TokenKind::LParen) {
            self.advance();
            let args = self.parse_expression_list()?;
            Ok(Expr::FunctionCall {
                name,
                args,
                position,
            })
        } else {
            Ok(Expr::ColumnRef { name, position })
        }
    }

    /// `not`, `!` and unary minus bind tighter than every binary operator.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        if self.check_keyword(Keyword::Not) || self.check(&TokenKind::Bang) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                position,
            });
        }
        if self.check(&TokenKind::Minus) {
            self.advance();
            // Fold negative numeric literals
            match self.current().kind {
                TokenKind::Integer(n) => {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Integer(-n)));
                }
                TokenKind::Float(n) => {
                    self.advance();
                    return Ok(Expr::Literal(Literal::Float(-n)));
                }
                _ => {}
            }
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
                position,
            });
        }
        self.parse_primary()
    }

    fn binary(op: BinOp, left: Expr, right: Expr, position: Position) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            position,
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Multiply,
                TokenKind::Slash => BinOp::Divide,
                TokenKind::Percent => BinOp::Modulo,
                _ => break,
            };
            let position = self.advance().position;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right, position);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Subtract,
                _ => break,
            };
            let position = self.advance().position;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right, position);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        let op = match self.current().kind {
            TokenKind::Eq => BinOp::Equal,
            TokenKind::NotEq => BinOp::NotEqual,
            TokenKind::Lt => BinOp::LessThan,
            TokenKind::Gt => BinOp::GreaterThan,
            TokenKind::LtEq => BinOp::LessEqual,
            TokenKind::GtEq => BinOp::GreaterEqual,
            _ => return Ok(left),
        };
        let position = self.advance().position;
        let right = self.parse_additive()?;
        Ok(Self::binary(op, left, right, position))
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;

        while self.check_keyword(Keyword::And) {
            let position = self.advance().position;
            let right = self.parse_comparison()?;
            left = Self::binary(BinOp::And, left, right, position);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;

        while self.check_keyword(Keyword::Or) {
            let position = self.advance().position;
            let right = self.parse_and()?;
            left = Self::binary(BinOp::Or, left, right, position);
        }
        Ok(left)
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse a complete program.
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        let mut blocks: Vec<OpenBlock> = Vec::new();

        loop {
            while self.check(&TokenKind::Semicolon) {
                self.advance();
            }
            if self.check(&TokenKind::Eof) {
                break;
            }

            let statement = match self.parse_item()? {
                Item::Statement(statement) => statement,
                Item::Open(block) => {
                    blocks.push(block);
                    continue;
                }
                Item::Close(position) => match blocks.pop() {
                    Some(block) => block.close(),
                    None => {
                        return Err(ParseError {
                            position,
                            expected: "statement".to_string(),
                            found: "`end` without a matching `if` or `begin`".to_string(),
                        });
                    }
                },
            };

            match blocks.last_mut() {
                Some(block) => block.body_mut().push(statement),
                None => statements.push(statement),
            }
        }

        if let Some(block) = blocks.last() {
            let (opener, position) = block.opener();
            return Err(self.error(format!("`end` closing the `{opener}` at {position}")));
        }

        debug!(statements = statements.len(), "parsed program");
        Ok(Program { statements })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let position = self.position();
        let kind = match &self.current().kind {
            TokenKind::Keyword(Keyword::Generate) => return self.parse_generate(),
            TokenKind::Keyword(Keyword::If) => return self.parse_conditional_header(),
            TokenKind::Keyword(Keyword::End) => {
                self.advance();
                return Ok(Item::Close(position));
            }
            TokenKind::Keyword(Keyword::Append) => self.parse_append()?,
            TokenKind::Keyword(Keyword::Delete) => self.parse_delete()?,
            TokenKind::Keyword(Keyword::Change) => self.parse_change()?,
            TokenKind::Keyword(Keyword::Get) => self.parse_get()?,
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                StatementKind::Return(self.parse_expression()?)
            }
            TokenKind::Identifier(_) => self.parse_assignment()?,
            _ => return Err(self.error("statement")),
        };
        Ok(Item::Statement(Statement::new(kind, position)))
    }

    /// `if <expr> then [:]`
    fn parse_conditional_header(&mut self) -> Result<Item, ParseError> {
        let position = self.advance().position;
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Then)?;
        if self.check(&TokenKind::Colon) {
            self.advance();
        }
        Ok(Item::Open(OpenBlock::Conditional {
            condition,
            position,
            body: Vec::new(),
        }))
    }

    /// `generate db.t (col type [key], ...)` or
    /// `generate db.f(param type, ...) [-> type] begin`
    fn parse_generate(&mut self) -> Result<Item, ParseError> {
        let position = self.advance().position;

        let name = match &self.current().kind {
            TokenKind::QualifiedName { path, member: None } => QualifiedName {
                path: path.clone(),
                member: None,
            },
            _ => return Err(self.error("table or function name (database.name)")),
        };
        let name_position = self.position();
        let name_found = self.current().kind.describe();
        self.advance();

        self.expect(TokenKind::LParen, "`(`")?;
        let mut columns = Vec::new();
        if !self.check(&TokenKind::RParen) {
            columns.push(self.parse_column_spec()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                columns.push(self.parse_column_spec()?);
            }
        }
        let close_position = self.position();
        self.expect(TokenKind::RParen, "`,` or `)`")?;

        if self.check(&TokenKind::Arrow) || self.check_keyword(Keyword::Begin) {
            let return_type = if self.check(&TokenKind::Arrow) {
                self.advance();
                Some(self.parse_type()?)
            } else {
                None
            };
            self.expect_keyword(Keyword::Begin)?;

            let mut params = Vec::with_capacity(columns.len());
            for column in columns {
                if column.key {
                    return Err(ParseError {
                        position: column.position,
                        expected: "parameter".to_string(),
                        found: "`key` modifier".to_string(),
                    });
                }
                params.push(Param {
                    name: column.name,
                    data_type: column.data_type,
                    position: column.position,
                });
            }

            return Ok(Item::Open(OpenBlock::Function {
                decl: FunctionDecl {
                    name,
                    params,
                    return_type,
                    body: Vec::new(),
                },
                position,
            }));
        }

        let Some(table) = name.table_path() else {
            return Err(ParseError {
                position: name_position,
                expected: "table name (database.table)".to_string(),
                found: name_found,
            });
        };
        if columns.is_empty() {
            return Err(ParseError {
                position: close_position,
                expected: "column definition".to_string(),
                found: "`)`".to_string(),
            });
        }

        Ok(Item::Statement(Statement::new(
            StatementKind::Generate { table, columns },
            position,
        )))
    }

    fn parse_column_spec(&mut self) -> Result<ColumnSpec, ParseError> {
        let position = self.position();
        let name = self.expect_identifier("column name")?;
        let data_type = self.parse_type()?;
        let key = matches!(&self.current().kind, TokenKind::Identifier(m) if m == "key");
        if key {
            self.advance();
        }
        Ok(ColumnSpec {
            name,
            data_type,
            key,
            position,
        })
    }

    /// `append db.t (cols) -> (values)`
    fn parse_append(&mut self) -> Result<StatementKind, ParseError> {
        self.advance();
        let table = self.parse_table_path()?;
        let columns = self.parse_identifier_list("column name")?;
        self.expect(TokenKind::Arrow, "`->`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        if self.check(&TokenKind::RParen) {
            return Err(self.error("value"));
        }
        let values = self.parse_expression_list()?;
        Ok(StatementKind::Append {
            table,
            columns,
            values,
        })
    }

    /// `delete db.t`, `delete db.t->col`, `delete db.t (cond)`
    fn parse_delete(&mut self) -> Result<StatementKind, ParseError> {
        self.advance();
        let (table, member) = self.parse_table_ref()?;
        let target = match member {
            Some(column) => DeleteTarget::Column(column),
            None if self.check(&TokenKind::LParen) => {
                self.advance();
                let condition = self.parse_expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                DeleteTarget::Rows(condition)
            }
            None => DeleteTarget::Table,
        };
        Ok(StatementKind::Delete { table, target })
    }

    /// `change db.t (col = expr, ...)`
    fn parse_change(&mut self) -> Result<StatementKind, ParseError> {
        self.advance();
        let table = self.parse_table_path()?;
        self.expect(TokenKind::LParen, "`(`")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier("column name")?;
            self.expect(TokenKind::Eq, "`=`")?;
            assignments.push((column, self.parse_expression()?));
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`,` or `)`")?;
        Ok(StatementKind::Change { table, assignments })
    }

    /// `get db.t`, `get db.t->*`, `get db.t->col`, `get db.t -> (a, b)`,
    /// or `get <expression>`
    fn parse_get(&mut self) -> Result<StatementKind, ParseError> {
        self.advance();

        let is_table = matches!(
            &self.current().kind,
            TokenKind::QualifiedName { path, .. } if path.len() == 2
        ) && !matches!(self.peek_kind(1), TokenKind::LParen);

        if !is_table {
            return Ok(StatementKind::Get(GetTarget::Expr(self.parse_expression()?)));
        }

        let (table, member) = self.parse_table_ref()?;
        let projection = match member {
            Some(column) => Projection::Columns(vec![column]),
            None if self.check(&TokenKind::Arrow) => {
                self.advance();
                if self.check(&TokenKind::Star) {
                    self.advance();
                    Projection::Wildcard
                } else if self.check(&TokenKind::LParen) {
                    Projection::Columns(self.parse_identifier_list("column name")?)
                } else {
                    return Err(self.error("`*` or `(`"));
                }
            }
            None => Projection::Wildcard,
        };
        Ok(StatementKind::Get(GetTarget::Table { table, projection }))
    }

    /// `name [type] = expr`
    fn parse_assignment(&mut self) -> Result<StatementKind, ParseError> {
        let name = self.expect_identifier("variable name")?;
        let declared_type = if matches!(self.current().kind, TokenKind::Type(_) | TokenKind::Empty) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq, "`=`")?;
        let value = self.parse_expression()?;
        Ok(StatementKind::Assignment {
            name,
            declared_type,
            value,
        })
    }
}

/// Parse a token sequence into a program. Pure: the same tokens always give
/// the same tree.
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}
