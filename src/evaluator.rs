use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use thiserror::Error;
use tracing::debug;

use crate::{
    ast::BinOp,
    bound::{Builtin, BoundExpr, BoundStatement, BoundStatementKind, Pattern},
    schema::{FunctionDef, Schema},
    storage::{Row, StoreError},
    value::{DataType, Value},
};

/// Errors raised while evaluating expressions or running statements.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Operation applied to values of the wrong type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid regular expression `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in {0}")]
    Overflow(String),

    #[error("call depth exceeded {0} nested function calls")]
    RecursionLimit(usize),

    #[error("function `{name}` with {arity} argument(s) doesn't exist")]
    UnknownFunction { name: String, arity: usize },

    /// Function body no longer binds against the current tables
    #[error("function `{name}` no longer matches its tables: {message}")]
    StaleFunction { name: String, message: String },

    #[error("variable `{0}` is not defined")]
    UnknownVariable(String),

    /// Value could not be converted to the slot's declared type
    #[error("cannot store value in `{target}`: {message}")]
    Coercion { target: String, message: String },

    /// A store mutation was attempted while evaluating a row predicate
    #[error("`{0}` cannot modify the store while rows are being read")]
    ReadOnlyContext(String),

    /// Statement kind that can't run in its position
    #[error("`{0}` cannot run here")]
    Misplaced(String),
}

/// Failure of one executed statement: a language-level runtime error or an
/// error reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Control signal of a statement block: keep going, or leave the function
/// with a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

/// Stack of variable frames, innermost last.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, Value>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack {
            frames: vec![HashMap::new()],
        }
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Pop the innermost frame. The outermost frame is never removed.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind `name` in the innermost frame.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// Overwrite the nearest binding of `name`, declaring it in the innermost
    /// frame when there is none.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.frames.iter_mut().rev().find(|frame| frame.contains_key(name)) {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => self.declare(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Every visible variable; inner bindings shadow outer ones.
    pub fn visible(&self) -> HashMap<&str, &Value> {
        let mut visible = HashMap::new();
        for frame in &self.frames {
            for (name, value) in frame {
                visible.insert(name.as_str(), value);
            }
        }
        visible
    }
}

/// Runs the store-mutating statements found in function bodies.
///
/// The executor hands in a host backed by the store; row predicates get a
/// [`ReadOnlyHost`], so a function that mutates the store fails there instead
/// of aliasing the rows being read.
pub trait StatementHost {
    fn run_statement(
        &mut self,
        evaluator: &Evaluator<'_>,
        statement: &BoundStatement,
        scopes: &ScopeStack,
    ) -> Result<(), ExecError>;
}

/// Host for row contexts: every mutation is refused.
#[derive(Debug, Default)]
pub struct ReadOnlyHost;

impl StatementHost for ReadOnlyHost {
    fn run_statement(
        &mut self,
        _evaluator: &Evaluator<'_>,
        statement: &BoundStatement,
        _scopes: &ScopeStack,
    ) -> Result<(), ExecError> {
        Err(RuntimeError::ReadOnlyContext(statement.to_string()).into())
    }
}

/// Expression evaluator and function-call machinery.
///
/// Borrows the catalog for function lookup. Call depth is tracked in a
/// [`Cell`] so evaluation only needs `&self`, which lets row predicates and
/// row assignments share one evaluator.
pub struct Evaluator<'a> {
    schema: &'a Schema,
    max_call_depth: usize,
    depth: Cell<usize>,
}

fn type_error(message: String) -> ExecError {
    RuntimeError::TypeMismatch(message).into()
}

impl<'a> Evaluator<'a> {
    pub fn new(schema: &'a Schema, max_call_depth: usize) -> Self {
        Evaluator {
            schema,
            max_call_depth,
            depth: Cell::new(0),
        }
    }

    /// Current nesting of user function calls.
    pub fn call_depth(&self) -> usize {
        self.depth.get()
    }

    /// Evaluates an expression.
    ///
    /// # Arguments
    ///
    /// * `expr` - The bound expression
    /// * `scopes` - Variables visible to the expression
    /// * `row` - The row being filtered or changed, if any
    /// * `host` - Runs mutations performed by called functions
    pub fn eval(
        &self,
        expr: &BoundExpr,
        scopes: &ScopeStack,
        row: Option<&Row>,
        host: &mut dyn StatementHost,
    ) -> Result<Value, ExecError> {
        match expr {
            BoundExpr::Literal(value) => Ok(value.clone()),
            BoundExpr::Column { name, index, .. } => row
                .and_then(|row| row.values.get(*index))
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownVariable(name.clone()).into()),
            BoundExpr::Variable { name, .. } => scopes
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UnknownVariable(name.clone()).into()),
            BoundExpr::Call { name, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scopes, row, host)?);
                }
                self.call_function(name, values, host)
            }
            BoundExpr::Builtin { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scopes, row, host)?);
                }
                self.apply_builtin(*func, values)
            }
            BoundExpr::RegexMatch {
                subject,
                pattern,
                negated,
            } => {
                let subject = self.eval(subject, scopes, row, host)?;
                let matched = match pattern {
                    Pattern::Compiled(re) => regex_match(re, &subject)?,
                    Pattern::Dynamic(expr) => {
                        let pattern = self.eval(expr, scopes, row, host)?;
                        let re = compile_pattern(&pattern)?;
                        regex_match(&re, &subject)?
                    }
                };
                Ok(Value::Bool(matched != *negated))
            }
            BoundExpr::Binary { op, left, right } if op.is_logical() => {
                let left_val = self.eval_bool(left, scopes, row, host)?;
                match (op, left_val) {
                    (BinOp::And, false) => Ok(Value::Bool(false)),
                    (BinOp::Or, true) => Ok(Value::Bool(true)),
                    _ => Ok(Value::Bool(self.eval_bool(right, scopes, row, host)?)),
                }
            }
            BoundExpr::Binary { op, left, right } => {
                let left_val = self.eval(left, scopes, row, host)?;
                let right_val = self.eval(right, scopes, row, host)?;
                self.apply_binop(*op, &left_val, &right_val)
            }
            BoundExpr::Not(operand) => match self.eval(operand, scopes, row, host)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Empty => Ok(Value::Empty),
                other => Err(type_error(format!("cannot apply `not` to {}", other.type_name()))),
            },
            BoundExpr::Negate(operand) => match self.eval(operand, scopes, row, host)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::Overflow(format!("-({n})")).into()),
                Value::Year(y) => Ok(Value::Int(-i64::from(y))),
                Value::Float(n) => Ok(Value::Float(-n)),
                Value::Empty => Ok(Value::Empty),
                other => Err(type_error(format!("cannot negate {}", other.type_name()))),
            },
            BoundExpr::Set(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    match self.eval(item, scopes, row, host)? {
                        Value::String(s) | Value::Enum(s) => {
                            set.insert(s);
                        }
                        other => {
                            return Err(type_error(format!(
                                "set members must be strings, found {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Ok(Value::Set(set))
            }
        }
    }

    /// Evaluates a condition. `empty` counts as false.
    pub fn eval_bool(
        &self,
        expr: &BoundExpr,
        scopes: &ScopeStack,
        row: Option<&Row>,
        host: &mut dyn StatementHost,
    ) -> Result<bool, ExecError> {
        match self.eval(expr, scopes, row, host)? {
            Value::Bool(b) => Ok(b),
            Value::Empty => Ok(false),
            other => Err(type_error(format!(
                "condition `{expr}` must be bool, found {}",
                other.type_name()
            ))),
        }
    }

    /// Row predicate: evaluates `filter` against `row` without store access.
    pub fn matches(&self, filter: Option<&BoundExpr>, scopes: &ScopeStack, row: &Row) -> Result<bool, ExecError> {
        match filter {
            Some(filter) => self.eval_bool(filter, scopes, Some(row), &mut ReadOnlyHost),
            None => Ok(true),
        }
    }

    /// Calls a user-defined function.
    ///
    /// The body runs on a fresh scope stack holding only the parameters. The
    /// call depth is released before any error propagates.
    pub fn call_function(
        &self,
        name: &str,
        args: Vec<Value>,
        host: &mut dyn StatementHost,
    ) -> Result<Value, ExecError> {
        let function = self
            .schema
            .function(name, args.len())
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            })?;

        if let Some(error) = &function.stale {
            return Err(RuntimeError::StaleFunction {
                name: name.to_string(),
                message: error.message.clone(),
            }
            .into());
        }

        if self.depth.get() >= self.max_call_depth {
            return Err(RuntimeError::RecursionLimit(self.max_call_depth).into());
        }
        self.depth.set(self.depth.get() + 1);
        debug!(function = name, depth = self.depth.get(), "entering function");
        let result = self.invoke(&function, args, host);
        self.depth.set(self.depth.get() - 1);
        debug!(function = name, ok = result.is_ok(), "leaving function");
        result
    }

    fn invoke(&self, function: &FunctionDef, args: Vec<Value>, host: &mut dyn StatementHost) -> Result<Value, ExecError> {
        let mut scopes = ScopeStack::new();
        for (param, arg) in function.params.iter().zip(args) {
            let value = param.data_type.coerce(arg).map_err(|message| RuntimeError::Coercion {
                target: format!("parameter `{}` of {}", param.name, function.name),
                message,
            })?;
            scopes.declare(param.name.clone(), value);
        }

        let value = match self.exec_block(&function.body, &mut scopes, host)? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Empty,
        };

        match function.return_type {
            Some(ty) => ty.coerce(value).map_err(|message| {
                RuntimeError::Coercion {
                    target: format!("result of {}", function.name),
                    message,
                }
                .into()
            }),
            None => Ok(value),
        }
    }

    /// Runs a function body (or a guarded block inside one) until a
    /// `return` or the end of the block.
    pub fn exec_block(
        &self,
        body: &[BoundStatement],
        scopes: &mut ScopeStack,
        host: &mut dyn StatementHost,
    ) -> Result<Flow, ExecError> {
        for statement in body {
            match &statement.kind {
                BoundStatementKind::Assign {
                    name,
                    target_type,
                    declare,
                    value,
                    ..
                } => {
                    let value = self.eval(value, scopes, None, host)?;
                    let value = coerce_variable(name, *target_type, value)?;
                    if *declare {
                        scopes.declare(name.clone(), value);
                    } else {
                        scopes.assign(name, value);
                    }
                }
                BoundStatementKind::Return(expr) => {
                    return Ok(Flow::Return(self.eval(expr, scopes, None, host)?));
                }
                BoundStatementKind::Guard { condition, body } => {
                    if self.eval_bool(condition, scopes, None, host)? {
                        scopes.push_frame();
                        let flow = self.exec_block(body, scopes, host);
                        scopes.pop_frame();
                        if let Flow::Return(value) = flow? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                BoundStatementKind::GetValue(expr) => {
                    self.eval(expr, scopes, None, host)?;
                }
                _ if statement.mutates_rows() => host.run_statement(self, statement, scopes)?,
                _ => return Err(RuntimeError::Misplaced(statement.to_string()).into()),
            }
        }
        Ok(Flow::Normal)
    }

    fn apply_builtin(&self, func: Builtin, args: Vec<Value>) -> Result<Value, ExecError> {
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Empty);
        match func {
            Builtin::Regexp => {
                let pattern = args.next().unwrap_or(Value::Empty);
                let re = compile_pattern(&pattern)?;
                Ok(Value::Bool(regex_match(&re, &first)?))
            }
            Builtin::Upper | Builtin::Lower | Builtin::Trim => {
                let text = match &first {
                    Value::Empty => return Ok(Value::Empty),
                    v => v.as_text().ok_or_else(|| {
                        type_error(format!("{}() expects a string, found {}", func.name(), v.type_name()))
                    })?,
                };
                let result = match func {
                    Builtin::Upper => text.to_uppercase(),
                    Builtin::Lower => text.to_lowercase(),
                    _ => text.trim().to_string(),
                };
                Ok(Value::String(result))
            }
            Builtin::Length => match &first {
                Value::String(s) | Value::Enum(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Set(items) => Ok(Value::Int(items.len() as i64)),
                Value::Object(bytes) => Ok(Value::Int(bytes.len() as i64)),
                Value::Empty => Ok(Value::Empty),
                v => Err(type_error(format!("length() is not defined for {}", v.type_name()))),
            },
            Builtin::Abs => match first {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::Overflow(format!("abs({n})")).into()),
                Value::Float(n) => Ok(Value::Float(n.abs())),
                Value::Year(y) => Ok(Value::Year(y.abs())),
                Value::Empty => Ok(Value::Empty),
                v => Err(type_error(format!("abs() expects a number, found {}", v.type_name()))),
            },
        }
    }

    pub fn apply_binop(&self, op: BinOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
        if op.is_comparison() {
            return compare(op, left, right).map(Value::Bool);
        }

        // `empty` propagates through arithmetic
        if left.is_empty() || right.is_empty() {
            return Ok(Value::Empty);
        }

        if op == BinOp::Add {
            if let (Value::String(a), Value::String(b)) = (left, right) {
                return Ok(Value::String(format!("{a}{b}")));
            }
        }

        match (left, right) {
            (Value::Float(a), Value::Float(b)) => float_op(op, *a, *b),
            (Value::Float(a), b) if b.as_int().is_some() => {
                mixed_op(op, Decimal::from_f64(*a), b.as_int().and_then(Decimal::from_i64), || {
                    float_op(op, *a, b.as_float().unwrap_or_default())
                })
            }
            (a, Value::Float(b)) if a.as_int().is_some() => {
                mixed_op(op, a.as_int().and_then(Decimal::from_i64), Decimal::from_f64(*b), || {
                    float_op(op, a.as_float().unwrap_or_default(), *b)
                })
            }
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(a), Some(b)) => int_op(op, a, b),
                _ => Err(type_error(format!(
                    "cannot apply `{op}` to {} and {}",
                    left.type_name(),
                    right.type_name()
                ))),
            },
        }
    }
}

pub(crate) fn coerce_variable(name: &str, target: Option<DataType>, value: Value) -> Result<Value, ExecError> {
    match target {
        Some(ty) => ty.coerce(value).map_err(|message| {
            RuntimeError::Coercion {
                target: format!("variable `{name}`"),
                message,
            }
            .into()
        }),
        None => Ok(value),
    }
}

pub(crate) fn compile_pattern(pattern: &Value) -> Result<Regex, ExecError> {
    let text = pattern
        .as_text()
        .ok_or_else(|| type_error(format!("regexp pattern must be a string, found {}", pattern.type_name())))?;
    Regex::new(text).map_err(|e| {
        RuntimeError::InvalidPattern {
            pattern: text.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Unanchored search; `empty` never matches.
fn regex_match(re: &Regex, subject: &Value) -> Result<bool, ExecError> {
    match subject {
        Value::Empty => Ok(false),
        v => v
            .as_text()
            .map(|text| re.is_match(text))
            .ok_or_else(|| type_error(format!("regexp expects a string, found {}", v.type_name()))),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, ExecError> {
    let overflow = || -> ExecError { RuntimeError::Overflow(format!("{a} {op} {b}")).into() };
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Subtract => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Multiply => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero.into());
            }
            // Exact division stays an int
            match a.checked_rem(b) {
                Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
                _ => Ok(Value::Float(a as f64 / b as f64)),
            }
        }
        BinOp::Modulo => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero.into());
            }
            a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
        }
        _ => Err(type_error(format!("`{op}` is not an arithmetic operator"))),
    }
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, ExecError> {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Subtract => Ok(Value::Float(a - b)),
        BinOp::Multiply => Ok(Value::Float(a * b)),
        BinOp::Divide | BinOp::Modulo if b == 0.0 => Err(RuntimeError::DivisionByZero.into()),
        BinOp::Divide => Ok(Value::Float(a / b)),
        BinOp::Modulo => Ok(Value::Float(a % b)),
        _ => Err(type_error(format!("`{op}` is not an arithmetic operator"))),
    }
}

/// Mixed int/float arithmetic through `Decimal`, so `0.1 + 2` is exactly
/// `2.1`. The result is always a float. Falls back to plain float arithmetic
/// when an operand has no decimal representation.
fn mixed_op(
    op: BinOp,
    left: Option<Decimal>,
    right: Option<Decimal>,
    fallback: impl FnOnce() -> Result<Value, ExecError>,
) -> Result<Value, ExecError> {
    let (Some(ad), Some(bd)) = (left, right) else {
        return fallback();
    };
    if matches!(op, BinOp::Divide | BinOp::Modulo) && bd.is_zero() {
        return Err(RuntimeError::DivisionByZero.into());
    }
    let rd = match op {
        BinOp::Add => ad.checked_add(bd),
        BinOp::Subtract => ad.checked_sub(bd),
        BinOp::Multiply => ad.checked_mul(bd),
        BinOp::Divide => ad.checked_div(bd),
        BinOp::Modulo => ad.checked_rem(bd),
        _ => None,
    };
    let Some(rd) = rd else {
        return fallback();
    };
    match rd.to_f64() {
        Some(r) => Ok(Value::Float(r)),
        None => fallback(),
    }
}

/// Ordering within a comparison family, `None` when the values don't order.
fn order(left: &Value, right: &Value) -> Result<Option<Ordering>, ExecError> {
    let ordering = match (left, right) {
        (Value::Empty, _) | (_, Value::Empty) => None,
        (Value::Float(_), _) | (_, Value::Float(_)) if left.as_float().is_some() && right.as_float().is_some() => {
            left.as_float().partial_cmp(&right.as_float())
        }
        (a, b) if a.as_int().is_some() && b.as_int().is_some() => a.as_int().partial_cmp(&b.as_int()),
        (a, b) if a.as_text().is_some() && b.as_text().is_some() => a.as_text().partial_cmp(&b.as_text()),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(type_error(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(ordering)
}

fn equal(left: &Value, right: &Value) -> Result<bool, ExecError> {
    match (left, right) {
        (Value::Empty, other) | (other, Value::Empty) => Ok(other.is_empty()),
        (Value::Set(a), Value::Set(b)) => Ok(a == b),
        (Value::Json(a), Value::Json(b)) => Ok(a == b),
        (Value::Object(a), Value::Object(b)) => Ok(a == b),
        _ => Ok(order(left, right)? == Some(Ordering::Equal)),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<bool, ExecError> {
    match op {
        BinOp::Equal => equal(left, right),
        BinOp::NotEqual => equal(left, right).map(|eq| !eq),
        BinOp::LessThan => Ok(order(left, right)? == Some(Ordering::Less)),
        BinOp::GreaterThan => Ok(order(left, right)? == Some(Ordering::Greater)),
        BinOp::LessEqual => Ok(matches!(order(left, right)?, Some(Ordering::Less | Ordering::Equal))),
        BinOp::GreaterEqual => Ok(matches!(order(left, right)?, Some(Ordering::Greater | Ordering::Equal))),
        _ => Err(type_error(format!("`{op}` is not a comparison"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_binop(op: BinOp, left: Value, right: Value) -> Result<Value, ExecError> {
        let schema = Schema::new();
        Evaluator::new(&schema, 8).apply_binop(op, &left, &right)
    }

    #[test]
    fn test_mixed_arithmetic_is_exact() {
        assert_eq!(
            eval_binop(BinOp::Add, Value::Float(0.1), Value::Int(2)).unwrap(),
            Value::Float(2.1)
        );
        assert_eq!(
            eval_binop(BinOp::Multiply, Value::Float(0.5), Value::Int(4)).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            eval_binop(BinOp::Multiply, Value::Float(2.0), Value::Int(1)).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(eval_binop(BinOp::Divide, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(eval_binop(BinOp::Divide, Value::Int(8), Value::Int(2)).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(
            eval_binop(BinOp::Divide, Value::Int(1), Value::Int(0)),
            Err(ExecError::Runtime(RuntimeError::DivisionByZero))
        );
        assert!(matches!(
            eval_binop(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)),
            Err(ExecError::Runtime(RuntimeError::Overflow(_)))
        ));
        assert!(matches!(
            eval_binop(BinOp::Subtract, Value::String("a".into()), Value::Int(1)),
            Err(ExecError::Runtime(RuntimeError::TypeMismatch(_)))
        ));
    }

    #[test]
    fn test_empty_equals_only_empty_and_never_orders() {
        assert_eq!(eval_binop(BinOp::Equal, Value::Empty, Value::Empty).unwrap(), Value::Bool(true));
        assert_eq!(eval_binop(BinOp::Equal, Value::Int(0), Value::Empty).unwrap(), Value::Bool(false));
        assert_eq!(eval_binop(BinOp::LessThan, Value::Empty, Value::Int(1)).unwrap(), Value::Bool(false));
        assert_eq!(eval_binop(BinOp::GreaterEqual, Value::Empty, Value::Empty).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_comparison_families() {
        assert_eq!(eval_binop(BinOp::Equal, Value::Int(2), Value::Float(2.0)).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_binop(BinOp::LessThan, Value::Enum("a".into()), Value::String("b".into())).unwrap(),
            Value::Bool(true)
        );
        assert!(eval_binop(BinOp::Equal, Value::Int(1), Value::String("1".into())).is_err());
    }

    #[test]
    fn test_scope_stack_shadowing() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", Value::Int(1));
        scopes.push_frame();
        scopes.declare("x", Value::Int(2));
        assert_eq!(scopes.get("x"), Some(&Value::Int(2)));
        scopes.pop_frame();
        assert_eq!(scopes.get("x"), Some(&Value::Int(1)));

        scopes.push_frame();
        scopes.assign("x", Value::Int(3));
        scopes.pop_frame();
        assert_eq!(scopes.get("x"), Some(&Value::Int(3)));
    }
}
