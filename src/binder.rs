//! Name and type resolution.
//!
//! The binder walks a parsed [`Program`] in order over a working copy of the
//! catalog, applying each `generate` / `delete` as it goes so later statements
//! see earlier definitions. Its output is a [`BoundProgram`].
//!
//! Conditionals come in two flavours:
//! - a **row filter** mentions a column (any identifier that isn't a visible
//!   variable, or any `db.t->col`). Its condition is AND-ed into every row
//!   statement of its body and the block disappears; nested filters narrow
//!   the same rows.
//! - a **guard** only reads variables and literals. It stays a block that runs
//!   once when the condition holds.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::ast::{
    BinOp, ColumnSpec, DeleteTarget, Expr, FunctionDecl, GetTarget, Literal, Program, Projection, QualifiedName,
    Statement, StatementKind, TablePath, UnaryOp,
};
use crate::bound::{
    Builtin, BoundExpr, BoundProgram, BoundStatement, BoundStatementKind, ColumnWrite, Pattern,
    arithmetic_type,
};
use crate::lexer::Position;
use crate::schema::{ColumnDef, FunctionDef, ParamDef, Schema, TableDef};
use crate::value::{DataType, Value};

/// What went wrong while resolving a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindErrorKind {
    UnknownTable,
    UnknownColumn,
    UnknownFunction,
    ArityMismatch,
    TypeMismatch,
    DuplicateColumn,
    DuplicateFunction,
    UnknownVariable,
    /// `generate` of a table that already exists
    DuplicateTable,
    DuplicateVariable,
    /// Statement used where it has no meaning (`return` outside a function,
    /// `generate` inside a block, `get` inside a function body, ...)
    MisplacedStatement,
    /// Store-mutating function called from a row predicate or assignment
    SideEffectInRowContext,
}

impl fmt::Display for BindErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindErrorKind::UnknownTable => "unknown table",
            BindErrorKind::UnknownColumn => "unknown column",
            BindErrorKind::UnknownFunction => "unknown function",
            BindErrorKind::ArityMismatch => "arity mismatch",
            BindErrorKind::TypeMismatch => "type mismatch",
            BindErrorKind::DuplicateColumn => "duplicate column",
            BindErrorKind::DuplicateFunction => "duplicate function",
            BindErrorKind::UnknownVariable => "unknown variable",
            BindErrorKind::DuplicateTable => "duplicate table",
            BindErrorKind::DuplicateVariable => "duplicate variable",
            BindErrorKind::MisplacedStatement => "misplaced statement",
            BindErrorKind::SideEffectInRowContext => "side effect in row context",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {kind}: {message}")]
pub struct BindError {
    pub kind: BindErrorKind,
    pub position: Position,
    pub message: String,
}

impl BindError {
    fn new(kind: BindErrorKind, position: Position, message: impl Into<String>) -> Self {
        BindError {
            kind,
            position,
            message: message.into(),
        }
    }
}

type BindResult<T> = Result<T, BindError>;

/// Kind of block a statement sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    TopLevel,
    Guard,
    Function,
}

/// Function whose body is being bound.
#[derive(Debug, Clone)]
struct FunctionContext {
    return_type: Option<DataType>,
}

/// Resolves a program against a catalog.
pub struct Binder {
    schema: Schema,
    /// Variable frames, innermost last; `None` when the type is only known at
    /// run time
    scopes: Vec<HashMap<String, Option<DataType>>>,
    function: Option<FunctionContext>,
    /// Conditions of the enclosing row filters, outermost first
    filters: Vec<Expr>,
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(n) => Value::Int(*n),
        Literal::Float(n) => Value::Float(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Date(d) => Value::Date(*d),
        Literal::Time(t) => Value::Time(*t),
        Literal::DateTime(dt) => Value::DateTime(*dt),
        Literal::Empty => Value::Empty,
    }
}

fn is_regexp_probe(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::FunctionCall { name, args, .. } if name.as_simple() == Some("regexp") && args.len() == 1
    )
}

fn regex_pattern(expr: BoundExpr) -> Pattern {
    if let BoundExpr::Literal(Value::String(text)) = &expr {
        if let Ok(re) = Regex::new(text) {
            return Pattern::Compiled(re);
        }
    }
    Pattern::Dynamic(Box::new(expr))
}

fn and(left: BoundExpr, right: BoundExpr) -> BoundExpr {
    BoundExpr::Binary {
        op: BinOp::And,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// True when running the statement can't mutate the store.
fn statement_is_pure(statement: &BoundStatement) -> bool {
    match &statement.kind {
        _ if statement.mutates_rows() => false,
        BoundStatementKind::Assign { value, .. } => value.is_pure(),
        BoundStatementKind::Return(expr) | BoundStatementKind::GetValue(expr) => expr.is_pure(),
        BoundStatementKind::Guard { condition, body } => {
            condition.is_pure() && body.iter().all(statement_is_pure)
        }
        _ => false,
    }
}

impl Binder {
    /// Binder over a copy of `schema`; the original is never modified.
    pub fn new(schema: &Schema) -> Self {
        Binder {
            schema: schema.clone(),
            scopes: vec![HashMap::new()],
            function: None,
            filters: Vec::new(),
        }
    }

    /// Make already-defined session variables visible to the program.
    pub fn with_globals<'v>(mut self, globals: impl IntoIterator<Item = (&'v str, &'v Value)>) -> Self {
        if let Some(frame) = self.scopes.first_mut() {
            for (name, value) in globals {
                let ty = Some(value.data_type()).filter(|ty| *ty != DataType::Empty);
                frame.insert(name.to_string(), ty);
            }
        }
        self
    }

    /// The working catalog, with the DDL bound so far applied.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Bind a whole program, stopping at the first error.
    pub fn bind_program(mut self, program: &Program) -> BindResult<BoundProgram> {
        let mut statements = Vec::with_capacity(program.len());
        for statement in &program.statements {
            statements.extend(self.bind_statement(statement)?);
        }
        info!(statements = statements.len(), "bound program");
        Ok(BoundProgram { statements })
    }

    /// Bind every top-level statement independently. A statement that fails
    /// leaves the working catalog untouched, so later statements are bound as
    /// if it were absent.
    pub fn bind_each(mut self, program: &Program) -> Vec<BindResult<BoundStatement>> {
        let mut results = Vec::with_capacity(program.len());
        for statement in &program.statements {
            match self.bind_statement(statement) {
                Ok(bound) => results.extend(bound.into_iter().map(Ok)),
                Err(error) => {
                    debug!(%error, "statement rejected");
                    results.push(Err(error));
                }
            }
        }
        results
    }

    /// Bind one top-level statement. A row-filter conditional expands into
    /// the filtered statements of its body.
    pub fn bind_statement(&mut self, statement: &Statement) -> BindResult<Vec<BoundStatement>> {
        let bound = self.bind_in(statement, Block::TopLevel)?;
        debug!(position = %statement.position, count = bound.len(), "bound statement");
        Ok(bound)
    }

    fn bind_in(&mut self, statement: &Statement, block: Block) -> BindResult<Vec<BoundStatement>> {
        let position = statement.position;
        let in_filter = !self.filters.is_empty();
        let misplaced = |what: &str| {
            Err(BindError::new(
                BindErrorKind::MisplacedStatement,
                position,
                format!("{} cannot appear {what}", statement.label()),
            ))
        };

        let kind = match &statement.kind {
            StatementKind::Generate { table, columns } => {
                if block != Block::TopLevel || in_filter {
                    return misplaced("inside a block");
                }
                self.bind_generate(table, columns, position)?
            }
            StatementKind::FunctionDecl(decl) => {
                if block != Block::TopLevel || in_filter {
                    return misplaced("inside a block");
                }
                self.bind_function(decl, position)?
            }
            StatementKind::Append {
                table,
                columns,
                values,
            } => {
                if in_filter {
                    return misplaced("inside a row filter");
                }
                self.bind_append(table, columns, values, position)?
            }
            StatementKind::Delete { table, target } => {
                let def = self.table(table, position)?;
                match target {
                    DeleteTarget::Table if in_filter => BoundStatementKind::DeleteRows {
                        table: table.clone(),
                        filter: self.row_filter(&def, None, position)?.unwrap_or(BoundExpr::Literal(Value::Bool(true))),
                    },
                    DeleteTarget::Rows(condition) => BoundStatementKind::DeleteRows {
                        table: table.clone(),
                        filter: self
                            .row_filter(&def, Some(condition), position)?
                            .unwrap_or(BoundExpr::Literal(Value::Bool(true))),
                    },
                    _ if block != Block::TopLevel || in_filter => return misplaced("inside a block"),
                    DeleteTarget::Table => {
                        self.schema.drop_table(table);
                        self.rebind_functions();
                        BoundStatementKind::DropTable(table.clone())
                    }
                    DeleteTarget::Column(column) => {
                        if self.schema.drop_column(table, column).is_none() {
                            return Err(unknown_column(&def, column, position));
                        }
                        self.rebind_functions();
                        BoundStatementKind::DropColumn {
                            table: table.clone(),
                            column: column.clone(),
                        }
                    }
                }
            }
            StatementKind::Change { table, assignments } => self.bind_change(table, assignments, position)?,
            StatementKind::Get(GetTarget::Table { table, projection }) => {
                if block == Block::Function {
                    return misplaced("inside a function body");
                }
                self.bind_get_rows(table, projection, position)?
            }
            StatementKind::Get(GetTarget::Expr(expr)) => {
                if block == Block::Function {
                    return misplaced("inside a function body");
                }
                if in_filter {
                    return misplaced("inside a row filter");
                }
                BoundStatementKind::GetValue(self.bind_expr(expr, None, position)?)
            }
            StatementKind::Conditional { condition, body } => {
                return self.bind_conditional(condition, body, block, position);
            }
            StatementKind::Return(expr) => {
                if self.function.is_none() {
                    return misplaced("outside a function body");
                }
                if in_filter {
                    return misplaced("inside a row filter");
                }
                let value = self.bind_expr(expr, None, position)?;
                let return_type = self.function.as_ref().and_then(|f| f.return_type);
                match return_type {
                    Some(ty) => BoundStatementKind::Return(coerce_to(value, ty, "the function result", position)?),
                    None => BoundStatementKind::Return(value),
                }
            }
            StatementKind::Assignment {
                name,
                declared_type,
                value,
            } => {
                if in_filter {
                    return misplaced("inside a row filter");
                }
                self.bind_assignment(name, *declared_type, value, position)?
            }
        };

        Ok(vec![BoundStatement::new(kind, position)])
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn table(&self, path: &TablePath, position: Position) -> BindResult<TableDef> {
        self.schema.table(path).cloned().ok_or_else(|| {
            BindError::new(
                BindErrorKind::UnknownTable,
                position,
                format!("table `{path}` doesn't exist"),
            )
        })
    }

    fn bind_generate(
        &mut self,
        table: &TablePath,
        specs: &[ColumnSpec],
        position: Position,
    ) -> BindResult<BoundStatementKind> {
        if self.schema.has_table(table) {
            return Err(BindError::new(
                BindErrorKind::DuplicateTable,
                position,
                format!("table `{table}` already exists"),
            ));
        }

        let mut columns: Vec<ColumnDef> = Vec::with_capacity(specs.len());
        for spec in specs {
            if columns.iter().any(|c| c.name == spec.name) {
                return Err(BindError::new(
                    BindErrorKind::DuplicateColumn,
                    spec.position,
                    format!("column `{}` is defined twice in `{table}`", spec.name),
                ));
            }
            if spec.key && columns.iter().any(|c| c.key) {
                return Err(BindError::new(
                    BindErrorKind::DuplicateColumn,
                    spec.position,
                    format!("`{table}` already has a key column"),
                ));
            }
            columns.push(ColumnDef {
                name: spec.name.clone(),
                data_type: spec.data_type,
                key: spec.key,
            });
        }

        self.schema.create_table(TableDef {
            path: table.clone(),
            columns: columns.clone(),
        });
        self.rebind_functions();
        Ok(BoundStatementKind::CreateTable {
            table: table.clone(),
            columns,
        })
    }

    fn bind_function(&mut self, decl: &FunctionDecl, position: Position) -> BindResult<BoundStatementKind> {
        let name = decl.name.to_string();
        let arity = decl.params.len();
        if self.schema.function(&name, arity).is_some() {
            return Err(BindError::new(
                BindErrorKind::DuplicateFunction,
                position,
                format!("function `{name}` with {arity} parameter(s) is already defined"),
            ));
        }

        let mut params: Vec<ParamDef> = Vec::with_capacity(arity);
        for param in &decl.params {
            if params.iter().any(|p| p.name == param.name) {
                return Err(BindError::new(
                    BindErrorKind::DuplicateVariable,
                    param.position,
                    format!("parameter `{}` is declared twice", param.name),
                ));
            }
            params.push(ParamDef {
                name: param.name.clone(),
                data_type: param.data_type,
            });
        }

        let provisional = FunctionDef {
            name: name.clone(),
            params,
            return_type: decl.return_type,
            body: Vec::new(),
            pure: true,
            decl: Rc::new(decl.clone()),
            stale: None,
            position,
        };
        match self.bind_body(provisional) {
            Ok(function) => {
                debug!(function = %function.signature(), pure = function.pure, "bound function");
                Ok(BoundStatementKind::CreateFunction(function))
            }
            Err(error) => {
                self.schema.remove_function(&name, arity);
                Err(error)
            }
        }
    }

    /// Bind the declared body of `provisional` and register the result. The
    /// provisional signature is registered first so the body may call the
    /// function recursively; it stays registered on error.
    fn bind_body(&mut self, provisional: FunctionDef) -> BindResult<Rc<FunctionDef>> {
        self.schema.replace_function(Rc::new(provisional.clone()));

        let frame = provisional
            .params
            .iter()
            .map(|p| (p.name.clone(), Some(p.data_type)))
            .collect();
        let outer_scopes = std::mem::replace(&mut self.scopes, vec![frame]);
        let outer_filters = std::mem::take(&mut self.filters);
        let outer_function = self.function.replace(FunctionContext {
            return_type: provisional.return_type,
        });

        let decl = Rc::clone(&provisional.decl);
        let mut body = Vec::new();
        let mut result = Ok(());
        for statement in &decl.body {
            match self.bind_in(statement, Block::Function) {
                Ok(bound) => body.extend(bound),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }

        self.scopes = outer_scopes;
        self.filters = outer_filters;
        self.function = outer_function;
        result?;

        let function = Rc::new(FunctionDef {
            pure: body.iter().all(statement_is_pure),
            body,
            ..provisional
        });
        self.schema.replace_function(Rc::clone(&function));
        Ok(function)
    }

    /// Bind every registered function body again after a table changed.
    ///
    /// A body that no longer binds stays registered, marked stale, and calls
    /// to it are rejected; a later `generate` may make it valid again. Runs
    /// until no function changes state, since callers depend on callees.
    fn rebind_functions(&mut self) {
        let rounds = self.schema.functions().count() + 1;
        for _ in 0..rounds {
            let functions: Vec<Rc<FunctionDef>> = self.schema.functions().cloned().collect();
            let mut changed = false;
            for function in functions {
                let provisional = FunctionDef {
                    body: Vec::new(),
                    pure: true,
                    stale: None,
                    ..(*function).clone()
                };
                let rebound = match self.bind_body(provisional.clone()) {
                    Ok(rebound) => rebound,
                    Err(error) => {
                        debug!(function = %function.signature(), %error, "function body is stale");
                        let stale = Rc::new(FunctionDef {
                            stale: Some(error),
                            ..provisional
                        });
                        self.schema.replace_function(Rc::clone(&stale));
                        stale
                    }
                };
                if rebound.stale.is_some() != function.stale.is_some() || rebound.pure != function.pure {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn bind_append(
        &mut self,
        table: &TablePath,
        columns: &[String],
        values: &[Expr],
        position: Position,
    ) -> BindResult<BoundStatementKind> {
        let def = self.table(table, position)?;
        if columns.len() != values.len() {
            return Err(BindError::new(
                BindErrorKind::ArityMismatch,
                position,
                format!("{} column(s) listed but {} value(s) given", columns.len(), values.len()),
            ));
        }

        let mut writes: Vec<ColumnWrite> = Vec::with_capacity(columns.len());
        for (column, value) in columns.iter().zip(values) {
            let write = self.column_write(&def, column, value, None, position)?;
            writes.push(write);
        }
        Ok(BoundStatementKind::Append {
            table: table.clone(),
            writes,
            width: def.columns.len(),
        })
    }

    fn bind_change(
        &mut self,
        table: &TablePath,
        assignments: &[(String, Expr)],
        position: Position,
    ) -> BindResult<BoundStatementKind> {
        let def = self.table(table, position)?;
        let mut writes: Vec<ColumnWrite> = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            let write = self.column_write(&def, column, value, Some(&def), position)?;
            writes.push(write);
        }
        if let Some(duplicate) = writes
            .iter()
            .enumerate()
            .find(|(i, w)| writes[..*i].iter().any(|other| other.index == w.index))
            .map(|(_, w)| w)
        {
            return Err(BindError::new(
                BindErrorKind::DuplicateColumn,
                position,
                format!("column `{}` is assigned twice", duplicate.name),
            ));
        }
        Ok(BoundStatementKind::Change {
            table: table.clone(),
            filter: self.row_filter(&def, None, position)?,
            writes,
        })
    }

    /// Resolve `column = value` for `append` (no row) or `change` (row of
    /// `row`), coercing literals to the column type.
    fn column_write(
        &self,
        table: &TableDef,
        column: &str,
        value: &Expr,
        row: Option<&TableDef>,
        position: Position,
    ) -> BindResult<ColumnWrite> {
        let index = table
            .find_column_index(column)
            .ok_or_else(|| unknown_column(table, column, position))?;
        let data_type = table.columns[index].data_type;
        let bound = self.bind_expr(value, row, position)?;
        Ok(ColumnWrite {
            name: column.to_string(),
            index,
            data_type,
            value: coerce_to(bound, data_type, &format!("column `{column}`"), position)?,
        })
    }

    fn bind_get_rows(
        &mut self,
        table: &TablePath,
        projection: &Projection,
        position: Position,
    ) -> BindResult<BoundStatementKind> {
        let def = self.table(table, position)?;
        let (columns, wildcard) = match projection {
            Projection::Wildcard => (
                def.columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, c.name.clone()))
                    .collect(),
                true,
            ),
            Projection::Columns(names) => {
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    let index = def
                        .find_column_index(name)
                        .ok_or_else(|| unknown_column(&def, name, position))?;
                    columns.push((index, name.clone()));
                }
                (columns, false)
            }
        };
        Ok(BoundStatementKind::GetRows {
            table: table.clone(),
            columns,
            wildcard,
            filter: self.row_filter(&def, None, position)?,
        })
    }

    fn bind_assignment(
        &mut self,
        name: &str,
        declared_type: Option<DataType>,
        value: &Expr,
        position: Position,
    ) -> BindResult<BoundStatementKind> {
        let bound = self.bind_expr(value, None, position)?;

        let (value, target_type, declare) = match declared_type {
            Some(ty) => {
                let in_frame = self.scopes.last().is_some_and(|frame| frame.contains_key(name));
                if in_frame {
                    return Err(BindError::new(
                        BindErrorKind::DuplicateVariable,
                        position,
                        format!("variable `{name}` is already declared in this block"),
                    ));
                }
                let value = coerce_to(bound, ty, &format!("variable `{name}`"), position)?;
                self.declare(name, Some(ty));
                (value, Some(ty), true)
            }
            None => match self.variable(name) {
                Some(Some(ty)) => {
                    let value = coerce_to(bound, ty, &format!("variable `{name}`"), position)?;
                    (value, Some(ty), false)
                }
                Some(None) => (bound, None, false),
                None => {
                    let inferred = bound.static_type().filter(|ty| *ty != DataType::Empty);
                    self.declare(name, inferred);
                    (bound, None, true)
                }
            },
        };

        Ok(BoundStatementKind::Assign {
            name: name.to_string(),
            target_type,
            declared_type,
            declare,
            value,
        })
    }

    fn bind_conditional(
        &mut self,
        condition: &Expr,
        body: &[Statement],
        block: Block,
        position: Position,
    ) -> BindResult<Vec<BoundStatement>> {
        if !self.filters.is_empty() || self.is_row_condition(condition) {
            self.filters.push(condition.clone());
            let mut bound = Vec::new();
            let mut result = Ok(());
            for statement in body {
                match self.bind_in(statement, block) {
                    Ok(statements) => bound.extend(statements),
                    Err(error) => {
                        result = Err(error);
                        break;
                    }
                }
            }
            self.filters.pop();
            return result.map(|_| bound);
        }

        let condition = self.bind_expr(condition, None, position)?;
        expect_bool(&condition, "`if` condition", position)?;

        let inner = if block == Block::Function {
            Block::Function
        } else {
            Block::Guard
        };
        self.scopes.push(HashMap::new());
        let mut statements = Vec::new();
        let mut result = Ok(());
        for statement in body {
            match self.bind_in(statement, inner) {
                Ok(bound) => statements.extend(bound),
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        self.scopes.pop();
        result?;

        Ok(vec![BoundStatement::new(
            BoundStatementKind::Guard {
                condition,
                body: Rc::from(statements),
            },
            position,
        )])
    }

    /// Fold the enclosing row filters (and `extra`) into one predicate over
    /// rows of `table`.
    fn row_filter(&self, table: &TableDef, extra: Option<&Expr>, position: Position) -> BindResult<Option<BoundExpr>> {
        let mut folded: Option<BoundExpr> = None;
        for condition in self.filters.iter().chain(extra) {
            let bound = self.bind_expr(condition, Some(table), position)?;
            expect_bool(&bound, "row filter", condition.position().unwrap_or(position))?;
            folded = Some(match folded {
                Some(acc) => and(acc, bound),
                None => bound,
            });
        }
        Ok(folded)
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn variable(&self, name: &str) -> Option<Option<DataType>> {
        self.scopes.iter().rev().find_map(|frame| frame.get(name).copied())
    }

    fn declare(&mut self, name: &str, ty: Option<DataType>) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.to_string(), ty);
        }
    }

    /// A condition that reads any column makes its `if` a row filter.
    fn is_row_condition(&self, condition: &Expr) -> bool {
        let mut reads_column = false;
        condition.walk_refs(&mut |name: &QualifiedName| match name.as_simple() {
            Some(simple) if self.variable(simple).is_some() => {}
            _ => reads_column = true,
        });
        reads_column
    }

    fn bind_reference(&self, name: &QualifiedName, row: Option<&TableDef>, position: Position) -> BindResult<BoundExpr> {
        if let Some(simple) = name.as_simple() {
            if let Some(table) = row {
                if let Some(index) = table.find_column_index(simple) {
                    return Ok(column_expr(table, index));
                }
            }
            return match self.variable(simple) {
                Some(data_type) => Ok(BoundExpr::Variable {
                    name: simple.to_string(),
                    data_type,
                }),
                None => match row {
                    Some(table) => Err(unknown_column(table, simple, position)),
                    None => Err(BindError::new(
                        BindErrorKind::UnknownVariable,
                        position,
                        format!("variable `{simple}` is not defined"),
                    )),
                },
            };
        }

        let (Some(member), Some(path)) = (&name.member, name.table_path()) else {
            return Err(BindError::new(
                BindErrorKind::UnknownVariable,
                position,
                format!("`{name}` is not a value; use `{name}->column` inside an `if` to read a column"),
            ));
        };
        let Some(table) = row else {
            return Err(BindError::new(
                BindErrorKind::UnknownColumn,
                position,
                format!("column `{name}` can only be read inside a row filter"),
            ));
        };
        if table.path != path {
            if !self.schema.has_table(&path) {
                return Err(BindError::new(
                    BindErrorKind::UnknownTable,
                    position,
                    format!("table `{path}` doesn't exist"),
                ));
            }
            return Err(BindError::new(
                BindErrorKind::UnknownColumn,
                position,
                format!("`{name}` is not a column of the filtered table `{}`", table.path),
            ));
        }
        table
            .find_column_index(member)
            .map(|index| column_expr(table, index))
            .ok_or_else(|| unknown_column(table, member, position))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Bind an expression. `row` is the table whose rows the expression is
    /// evaluated against, if any.
    fn bind_expr(&self, expr: &Expr, row: Option<&TableDef>, fallback: Position) -> BindResult<BoundExpr> {
        let position = expr.position().unwrap_or(fallback);
        match expr {
            Expr::Literal(literal) => Ok(BoundExpr::Literal(literal_value(literal))),
            Expr::ColumnRef { name, .. } => self.bind_reference(name, row, position),
            Expr::FunctionCall { name, args, .. } => self.bind_call(name, args, row, position),
            Expr::BinaryOp { op, left, right, .. } => self.bind_binary(*op, left, right, row, position),
            Expr::UnaryOp { op, operand, .. } => {
                let operand = self.bind_expr(operand, row, position)?;
                match op {
                    UnaryOp::Not => {
                        expect_bool(&operand, "operand of `not`", position)?;
                        Ok(BoundExpr::Not(Box::new(operand)))
                    }
                    UnaryOp::Negate => {
                        if let Some(ty) = operand.static_type() {
                            if !ty.is_numeric() && ty != DataType::Empty {
                                return Err(type_mismatch(position, format!("cannot negate {ty}")));
                            }
                        }
                        Ok(BoundExpr::Negate(Box::new(operand)))
                    }
                }
            }
            Expr::Set { items, .. } => {
                let mut bound = Vec::with_capacity(items.len());
                for item in items {
                    let item = self.bind_expr(item, row, position)?;
                    if let Some(ty) = item.static_type() {
                        if !matches!(ty, DataType::String | DataType::Enum) {
                            return Err(type_mismatch(position, format!("set members must be strings, found {ty}")));
                        }
                    }
                    bound.push(item);
                }
                Ok(BoundExpr::Set(bound))
            }
        }
    }

    fn bind_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        row: Option<&TableDef>,
        position: Position,
    ) -> BindResult<BoundExpr> {
        if matches!(op, BinOp::Equal | BinOp::NotEqual) {
            let probe = if is_regexp_probe(left) {
                Some((left, right))
            } else if is_regexp_probe(right) {
                Some((right, left))
            } else {
                None
            };
            if let Some((Expr::FunctionCall { args, .. }, pattern)) = probe {
                return self.bind_regex(&args[0], pattern, op == BinOp::NotEqual, row, position);
            }
        }

        let left = self.bind_expr(left, row, position)?;
        let right = self.bind_expr(right, row, position)?;

        if op.is_logical() {
            expect_bool(&left, &format!("left operand of `{op}`"), position)?;
            expect_bool(&right, &format!("right operand of `{op}`"), position)?;
        } else if op.is_comparison() {
            let (left, right) = coerce_operands(left, right);
            if let (Some(l), Some(r)) = (left.static_type(), right.static_type()) {
                if !l.comparable_with(r) {
                    return Err(type_mismatch(position, format!("cannot compare {l} with {r}")));
                }
            }
            return Ok(BoundExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        } else if let (Some(l), Some(r)) = (left.static_type(), right.static_type()) {
            let defined = arithmetic_type(op, l, r).is_some()
                || (l.is_numeric() && r.is_numeric());
            if !defined {
                return Err(type_mismatch(position, format!("cannot apply `{op}` to {l} and {r}")));
            }
        }

        Ok(BoundExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn bind_regex(
        &self,
        subject: &Expr,
        pattern: &Expr,
        negated: bool,
        row: Option<&TableDef>,
        position: Position,
    ) -> BindResult<BoundExpr> {
        let subject = self.bind_expr(subject, row, position)?;
        let pattern = self.bind_expr(pattern, row, position)?;
        for (expr, what) in [(&subject, "regexp subject"), (&pattern, "regexp pattern")] {
            if let Some(ty) = expr.static_type() {
                if !matches!(ty, DataType::String | DataType::Enum | DataType::Empty) {
                    return Err(type_mismatch(position, format!("{what} must be a string, found {ty}")));
                }
            }
        }
        Ok(BoundExpr::RegexMatch {
            subject: Box::new(subject),
            pattern: regex_pattern(pattern),
            negated,
        })
    }

    fn bind_call(
        &self,
        name: &QualifiedName,
        args: &[Expr],
        row: Option<&TableDef>,
        position: Position,
    ) -> BindResult<BoundExpr> {
        if let Some(builtin) = name.as_simple().and_then(Builtin::from_name) {
            return self.bind_builtin(builtin, args, row, position);
        }

        let qualified = name.to_string();
        let Some(function) = self.schema.function(&qualified, args.len()).cloned() else {
            let arities = self.schema.function_arities(&qualified);
            if arities.is_empty() {
                return Err(BindError::new(
                    BindErrorKind::UnknownFunction,
                    position,
                    format!("function `{qualified}` doesn't exist"),
                ));
            }
            let expected: Vec<String> = arities.iter().map(usize::to_string).collect();
            return Err(BindError::new(
                BindErrorKind::ArityMismatch,
                position,
                format!(
                    "function `{qualified}` takes {} argument(s), found {}",
                    expected.join(" or "),
                    args.len()
                ),
            ));
        };

        if let Some(error) = &function.stale {
            return Err(BindError::new(
                error.kind,
                position,
                format!("function `{qualified}` no longer matches its tables: {}", error.message),
            ));
        }

        if row.is_some() && !function.pure {
            return Err(BindError::new(
                BindErrorKind::SideEffectInRowContext,
                position,
                format!("`{qualified}` modifies the store and cannot be called while rows are read"),
            ));
        }

        let mut bound = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&function.params) {
            let arg = self.bind_expr(arg, row, position)?;
            bound.push(coerce_to(
                arg,
                param.data_type,
                &format!("parameter `{}` of `{qualified}`", param.name),
                position,
            )?);
        }
        Ok(BoundExpr::Call {
            name: qualified,
            args: bound,
            return_type: function.return_type,
            pure: function.pure,
        })
    }

    fn bind_builtin(
        &self,
        builtin: Builtin,
        args: &[Expr],
        row: Option<&TableDef>,
        position: Position,
    ) -> BindResult<BoundExpr> {
        if builtin == Builtin::Regexp && args.len() == 1 {
            return Err(BindError::new(
                BindErrorKind::ArityMismatch,
                position,
                "regexp(x) must be compared with a pattern, as in regexp(x) = \"^J\"",
            ));
        }
        if args.len() != builtin.arity() {
            return Err(BindError::new(
                BindErrorKind::ArityMismatch,
                position,
                format!(
                    "{}() takes {} argument(s), found {}",
                    builtin.name(),
                    builtin.arity(),
                    args.len()
                ),
            ));
        }
        if builtin == Builtin::Regexp {
            return self.bind_regex(&args[0], &args[1], false, row, position);
        }

        let arg = self.bind_expr(&args[0], row, position)?;
        if let Some(ty) = arg.static_type() {
            let accepted = match builtin {
                Builtin::Upper | Builtin::Lower | Builtin::Trim => {
                    matches!(ty, DataType::String | DataType::Enum)
                }
                Builtin::Length => matches!(
                    ty,
                    DataType::String | DataType::Enum | DataType::Set | DataType::Object
                ),
                _ => ty.is_numeric(),
            };
            if !accepted && ty != DataType::Empty {
                return Err(type_mismatch(
                    position,
                    format!("{}() is not defined for {ty}", builtin.name()),
                ));
            }
        }
        Ok(BoundExpr::Builtin {
            func: builtin,
            args: vec![arg],
        })
    }
}

fn column_expr(table: &TableDef, index: usize) -> BoundExpr {
    let column = &table.columns[index];
    BoundExpr::Column {
        name: column.name.clone(),
        index,
        data_type: column.data_type,
    }
}

fn unknown_column(table: &TableDef, column: &str, position: Position) -> BindError {
    BindError::new(
        BindErrorKind::UnknownColumn,
        position,
        format!("column `{column}` doesn't exist in table `{}`", table.path),
    )
}

fn type_mismatch(position: Position, message: String) -> BindError {
    BindError::new(BindErrorKind::TypeMismatch, position, message)
}

fn expect_bool(expr: &BoundExpr, what: &str, position: Position) -> BindResult<()> {
    match expr.static_type() {
        Some(DataType::Bool | DataType::Empty) | None => Ok(()),
        Some(ty) => Err(type_mismatch(position, format!("{what} must be bool, found {ty}"))),
    }
}

/// Convert a literal to the slot type, or check that a computed value's
/// static type fits it.
fn coerce_to(expr: BoundExpr, ty: DataType, target: &str, position: Position) -> BindResult<BoundExpr> {
    match expr {
        BoundExpr::Literal(value) => ty.coerce(value).map(BoundExpr::Literal).map_err(|message| {
            type_mismatch(position, format!("cannot store value in {target} ({ty}): {message}"))
        }),
        expr => match expr.static_type() {
            Some(source) if !ty.accepts(source) => Err(type_mismatch(
                position,
                format!("cannot store {source} `{expr}` in {target} ({ty})"),
            )),
            _ => Ok(expr),
        },
    }
}

/// A literal compared with a typed operand takes that operand's type when it
/// converts, so `born = "2001-02-03"` compares dates.
fn coerce_operands(left: BoundExpr, right: BoundExpr) -> (BoundExpr, BoundExpr) {
    fn convert(literal: BoundExpr, other: &BoundExpr) -> BoundExpr {
        let (BoundExpr::Literal(value), Some(ty)) = (&literal, other.static_type()) else {
            return literal;
        };
        if matches!(other, BoundExpr::Literal(_)) || ty == DataType::Empty {
            return literal;
        }
        match ty.coerce(value.clone()) {
            Ok(converted) => BoundExpr::Literal(converted),
            Err(_) => literal,
        }
    }
    let right = convert(right, &left);
    let left = convert(left, &right);
    (left, right)
}

/// Bind `program` against `schema`, stopping at the first error.
pub fn bind(program: &Program, schema: &Schema) -> BindResult<BoundProgram> {
    Binder::new(schema).bind_program(program)
}

/// Bind the function bodies of `schema` again after one of its tables was
/// generated or dropped. Bodies that no longer bind are marked stale.
pub fn rebind_functions(schema: &mut Schema) {
    let mut binder = Binder::new(schema);
    binder.rebind_functions();
    *schema = binder.schema;
}
