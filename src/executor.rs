//! Statement execution.
//!
//! A [`Session`] owns the catalog, the store, the global variables and the
//! [`ExecOptions`]. Executing a program returns an [`Execution`] that is
//! stepped one statement at a time; every [`ExecResult`] borrows the session,
//! so the rows of a `get` are pulled lazily from the store and the caller may
//! stop early.
//!
//! # Examples
//!
//! ```
//! use qql_lang::{Session, Value};
//!
//! let mut session = Session::new();
//! let reports = session.run(
//!     "generate shop.users (id int key, name string)
//!      append shop.users (id, name) -> (1, \"John\")
//!      get shop.users->name",
//! );
//! let last = reports.last().unwrap().as_ref().unwrap();
//! assert_eq!(last.rows, Some(vec![vec![Value::String("John".into())]]));
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::{debug, info};

use crate::ast::TablePath;
use crate::binder::{BindError, Binder, rebind_functions};
use crate::bound::{BoundExpr, BoundProgram, BoundStatement, BoundStatementKind, ColumnWrite};
use crate::error::QqlError;
use crate::evaluator::{
    Evaluator, ExecError, ReadOnlyHost, RuntimeError, ScopeStack, StatementHost, coerce_variable,
};
use crate::lexer::{Position, tokenize};
use crate::parser::parse;
use crate::schema::{Schema, TableDef};
use crate::storage::{MemoryStore, RowId, RowIter, Storage};
use crate::value::Value;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// What happens after a statement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first failing statement
    #[default]
    Abort,
    /// Report the failure and go on with the next statement
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    pub error_policy: ErrorPolicy,
    /// Deepest allowed nesting of user function calls
    pub max_call_depth: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        ExecOptions {
            error_policy: ErrorPolicy::Abort,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Side effect or value produced by a statement other than a table `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    TableCreated(TablePath),
    /// Signature of the registered function
    FunctionCreated(String),
    Appended(RowId),
    TableDropped(TablePath),
    ColumnDropped { table: TablePath, column: String },
    RowsDeleted(usize),
    RowsChanged(usize),
    Value(Value),
    Assigned { name: String, value: Value },
    /// Whether a guard's body runs
    Guard(bool),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::TableCreated(table) => write!(f, "created table {table}"),
            Effect::FunctionCreated(signature) => write!(f, "created function {signature}"),
            Effect::Appended(_) => f.write_str("appended 1 row"),
            Effect::TableDropped(table) => write!(f, "dropped table {table}"),
            Effect::ColumnDropped { table, column } => write!(f, "dropped column {column} from {table}"),
            Effect::RowsDeleted(count) => write!(f, "deleted {count} row(s)"),
            Effect::RowsChanged(count) => write!(f, "changed {count} row(s)"),
            Effect::Value(value) => write!(f, "{value}"),
            Effect::Assigned { name, value } => write!(f, "{name} = {value}"),
            Effect::Guard(true) => f.write_str("condition holds"),
            Effect::Guard(false) => f.write_str("condition fails, block skipped"),
        }
    }
}

/// Outcome of one executed statement.
pub enum Outcome<'a> {
    Done(Effect),
    /// Rows of a table `get`, produced on demand
    Rows(RowStream<'a>),
}

/// One executed statement: its normalized text and what it produced.
pub struct ExecResult<'a> {
    pub statement: String,
    pub position: Position,
    pub outcome: Outcome<'a>,
}

/// A materialized [`ExecResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub statement: String,
    pub position: Position,
    pub summary: String,
    /// Projected column names of a table `get`, empty otherwise
    pub columns: Vec<String>,
    /// Rows of a table `get`
    pub rows: Option<Vec<Vec<Value>>>,
}

impl ExecResult<'_> {
    /// Drain the row stream (if any) into a [`Report`].
    pub fn materialize(self) -> Result<Report, QqlError> {
        match self.outcome {
            Outcome::Done(effect) => Ok(Report {
                statement: self.statement,
                position: self.position,
                summary: effect.to_string(),
                columns: Vec::new(),
                rows: None,
            }),
            Outcome::Rows(stream) => {
                let columns = stream.column_names().into_iter().map(String::from).collect();
                let rows = stream.collect::<Result<Vec<_>, _>>()?;
                Ok(Report {
                    statement: self.statement,
                    position: self.position,
                    summary: format!("{} row(s)", rows.len()),
                    columns,
                    rows: Some(rows),
                })
            }
        }
    }
}

/// Lazy, filtered and projected scan of one table.
///
/// Each call to `next` pulls stored rows until one matches the filter. The
/// first error ends the stream.
pub struct RowStream<'a> {
    columns: Vec<(usize, String)>,
    rows: Option<RowIter<'a>>,
    failure: Option<QqlError>,
    filter: Option<BoundExpr>,
    evaluator: Evaluator<'a>,
    scopes: &'a ScopeStack,
    position: Position,
}

impl RowStream<'_> {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(_, name)| name.as_str()).collect()
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Vec<Value>, QqlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.failure.take() {
            self.rows = None;
            return Some(Err(error));
        }
        loop {
            let row = self.rows.as_mut()?.next()?;
            match self.evaluator.matches(self.filter.as_ref(), self.scopes, row) {
                Ok(true) => {
                    let projected = self
                        .columns
                        .iter()
                        .map(|(index, _)| row.values.get(*index).cloned().unwrap_or(Value::Empty))
                        .collect();
                    return Some(Ok(projected));
                }
                Ok(false) => continue,
                Err(error) => {
                    self.rows = None;
                    return Some(Err(QqlError::exec(self.position, error)));
                }
            }
        }
    }
}

/// Host backed by the session store: lets function bodies append, change
/// and delete rows.
struct StoreHost<'s, S: Storage> {
    store: &'s mut S,
}

impl<S: Storage> StatementHost for StoreHost<'_, S> {
    fn run_statement(
        &mut self,
        evaluator: &Evaluator<'_>,
        statement: &BoundStatement,
        scopes: &ScopeStack,
    ) -> Result<(), ExecError> {
        apply_mutation(evaluator, &mut *self.store, statement, scopes).map(|_| ())
    }
}

fn coerce_column(write: &ColumnWrite, value: Value) -> Result<Value, ExecError> {
    write.data_type.coerce(value).map_err(|message| {
        RuntimeError::Coercion {
            target: format!("column `{}`", write.name),
            message,
        }
        .into()
    })
}

/// Run `append`, `change` or row `delete`.
fn apply_mutation<S: Storage>(
    evaluator: &Evaluator<'_>,
    store: &mut S,
    statement: &BoundStatement,
    scopes: &ScopeStack,
) -> Result<Effect, ExecError> {
    match &statement.kind {
        BoundStatementKind::Append { table, writes, width } => {
            let mut row = vec![Value::Empty; *width];
            let mut host = StoreHost { store: &mut *store };
            for write in writes {
                let value = evaluator.eval(&write.value, scopes, None, &mut host)?;
                if let Some(slot) = row.get_mut(write.index) {
                    *slot = coerce_column(write, value)?;
                }
            }
            let id = store.insert_row(table, row)?;
            Ok(Effect::Appended(id))
        }
        BoundStatementKind::Change { table, writes, filter } => {
            let count = store.update_rows(
                table,
                |row| evaluator.matches(filter.as_ref(), scopes, row),
                |row| {
                    // Every assignment reads the original row
                    let mut values = row.values.clone();
                    for write in writes {
                        let value = evaluator.eval(&write.value, scopes, Some(row), &mut ReadOnlyHost)?;
                        if let Some(slot) = values.get_mut(write.index) {
                            *slot = coerce_column(write, value)?;
                        }
                    }
                    Ok(values)
                },
            )?;
            Ok(Effect::RowsChanged(count))
        }
        BoundStatementKind::DeleteRows { table, filter } => {
            let count = store.delete_rows(table, |row| evaluator.matches(Some(filter), scopes, row))?;
            Ok(Effect::RowsDeleted(count))
        }
        _ => Err(RuntimeError::Misplaced(statement.to_string()).into()),
    }
}

/// Interpreter state: catalog, store, global variables and options.
pub struct Session<S: Storage = MemoryStore> {
    schema: Schema,
    store: S,
    globals: ScopeStack,
    options: ExecOptions,
}

impl Session<MemoryStore> {
    /// Session over a fresh in-memory store with default options.
    pub fn new() -> Self {
        Session::with_store(MemoryStore::new(), ExecOptions::default())
    }
}

impl Default for Session<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Storage> Session<S> {
    pub fn with_store(store: S, options: ExecOptions) -> Self {
        Session {
            schema: Schema::new(),
            store,
            globals: ScopeStack::new(),
            options,
        }
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Value of a global variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Lex, parse and bind `source` against the current catalog without
    /// running it.
    ///
    /// Under [`ErrorPolicy::Abort`] the first bind error fails the whole
    /// program; under [`ErrorPolicy::Continue`] each top-level statement is
    /// bound on its own and rejected statements are returned in place.
    pub fn prepare(&self, source: &str) -> Result<Vec<Result<BoundStatement, BindError>>, QqlError> {
        let tokens = tokenize(source)?;
        let program = parse(tokens)?;
        let binder = Binder::new(&self.schema).with_globals(self.globals.visible());
        match self.options.error_policy {
            ErrorPolicy::Abort => Ok(binder.bind_program(&program)?.statements.into_iter().map(Ok).collect()),
            ErrorPolicy::Continue => Ok(binder.bind_each(&program)),
        }
    }

    /// Start executing a bound program.
    pub fn execute(&mut self, program: BoundProgram) -> Execution<'_, S> {
        Execution::new(self, program.statements.into_iter().map(Ok).collect())
    }

    /// [`prepare`](Self::prepare) and start executing `source`.
    pub fn execute_source(&mut self, source: &str) -> Result<Execution<'_, S>, QqlError> {
        let statements = self.prepare(source)?;
        Ok(Execution::new(self, statements))
    }

    /// Run `source` to completion, materializing every result.
    ///
    /// Under [`ErrorPolicy::Abort`] the returned list ends with the first
    /// error; under [`ErrorPolicy::Continue`] errors appear in place.
    pub fn run(&mut self, source: &str) -> Vec<Result<Report, QqlError>> {
        let policy = self.options.error_policy;
        let mut execution = match self.execute_source(source) {
            Ok(execution) => execution,
            Err(error) => return vec![Err(error)],
        };

        let mut reports = Vec::new();
        while let Some(result) = execution.next_result() {
            let report = result.and_then(ExecResult::materialize);
            let failed = report.is_err();
            reports.push(report);
            if failed && policy == ErrorPolicy::Abort {
                break;
            }
        }
        reports
    }
}

/// Open guard body being stepped through.
struct Cursor {
    body: Rc<[BoundStatement]>,
    next: usize,
}

enum Step {
    Done(Effect),
    Scan {
        table: TablePath,
        columns: Vec<(usize, String)>,
        filter: Option<BoundExpr>,
    },
}

/// Statement-by-statement execution of a program.
///
/// Call [`next_result`](Self::next_result) until it returns `None`. Under
/// [`ErrorPolicy::Abort`] the first error ends the execution.
pub struct Execution<'s, S: Storage> {
    session: &'s mut Session<S>,
    pending: std::vec::IntoIter<Result<BoundStatement, BindError>>,
    blocks: Vec<Cursor>,
    halted: bool,
}

impl<'s, S: Storage> Execution<'s, S> {
    fn new(session: &'s mut Session<S>, statements: Vec<Result<BoundStatement, BindError>>) -> Self {
        Execution {
            session,
            pending: statements.into_iter(),
            blocks: Vec::new(),
            halted: false,
        }
    }

    /// Execute the next statement. A table `get` returns its rows as a lazy
    /// [`RowStream`] that must be dropped before the next call.
    pub fn next_result(&mut self) -> Option<Result<ExecResult<'_>, QqlError>> {
        if self.halted {
            return None;
        }

        let statement = match self.next_statement()? {
            Ok(statement) => statement,
            Err(error) => {
                self.fail();
                return Some(Err(error.into()));
            }
        };

        let position = statement.position;
        let text = match &statement.kind {
            BoundStatementKind::Guard { condition, .. } => format!("if {condition} then:"),
            _ => statement.to_string(),
        };
        info!(%position, statement = %text, "executing statement");

        match self.run_statement(&statement) {
            Err(error) => {
                self.fail();
                Some(Err(QqlError::exec(position, error)))
            }
            Ok(Step::Done(effect)) => Some(Ok(ExecResult {
                statement: text,
                position,
                outcome: Outcome::Done(effect),
            })),
            Ok(Step::Scan { table, columns, filter }) => {
                let session: &Session<S> = self.session;
                let (rows, failure) = match session.store.scan_rows(&table) {
                    Ok(rows) => (Some(rows), None),
                    Err(error) => (None, Some(QqlError::exec(position, error.into()))),
                };
                Some(Ok(ExecResult {
                    statement: text,
                    position,
                    outcome: Outcome::Rows(RowStream {
                        columns,
                        rows,
                        failure,
                        filter,
                        evaluator: Evaluator::new(&session.schema, session.options.max_call_depth),
                        scopes: &session.globals,
                        position,
                    }),
                }))
            }
        }
    }

    fn fail(&mut self) {
        if self.session.options.error_policy == ErrorPolicy::Abort {
            self.halted = true;
        }
    }

    fn next_statement(&mut self) -> Option<Result<BoundStatement, BindError>> {
        loop {
            let Some(cursor) = self.blocks.last_mut() else {
                return self.pending.next();
            };
            if let Some(statement) = cursor.body.get(cursor.next) {
                cursor.next += 1;
                return Some(Ok(statement.clone()));
            }
            self.blocks.pop();
            self.session.globals.pop_frame();
            debug!(depth = self.session.globals.depth(), "left block");
        }
    }

    fn run_statement(&mut self, statement: &BoundStatement) -> Result<Step, ExecError> {
        let session = &mut *self.session;
        let max_depth = session.options.max_call_depth;

        let effect = match &statement.kind {
            BoundStatementKind::CreateTable { table, columns } => {
                session.store.create_table(table, columns)?;
                session.schema.create_table(TableDef {
                    path: table.clone(),
                    columns: columns.clone(),
                });
                rebind_functions(&mut session.schema);
                Effect::TableCreated(table.clone())
            }
            BoundStatementKind::CreateFunction(function) => {
                session.schema.replace_function(Rc::clone(function));
                Effect::FunctionCreated(function.signature())
            }
            BoundStatementKind::DropTable(table) => {
                session.store.drop_table(table)?;
                session.schema.drop_table(table);
                rebind_functions(&mut session.schema);
                Effect::TableDropped(table.clone())
            }
            BoundStatementKind::DropColumn { table, column } => {
                session.store.drop_column(table, column)?;
                session.schema.drop_column(table, column);
                rebind_functions(&mut session.schema);
                Effect::ColumnDropped {
                    table: table.clone(),
                    column: column.clone(),
                }
            }
            BoundStatementKind::Append { .. }
            | BoundStatementKind::Change { .. }
            | BoundStatementKind::DeleteRows { .. } => {
                let evaluator = Evaluator::new(&session.schema, max_depth);
                apply_mutation(&evaluator, &mut session.store, statement, &session.globals)?
            }
            BoundStatementKind::GetRows {
                table,
                columns,
                filter,
                ..
            } => {
                return Ok(Step::Scan {
                    table: table.clone(),
                    columns: columns.clone(),
                    filter: filter.clone(),
                });
            }
            BoundStatementKind::GetValue(expr) => {
                let evaluator = Evaluator::new(&session.schema, max_depth);
                let mut host = StoreHost {
                    store: &mut session.store,
                };
                Effect::Value(evaluator.eval(expr, &session.globals, None, &mut host)?)
            }
            BoundStatementKind::Assign {
                name,
                target_type,
                declare,
                value,
                ..
            } => {
                let evaluator = Evaluator::new(&session.schema, max_depth);
                let mut host = StoreHost {
                    store: &mut session.store,
                };
                let value = evaluator.eval(value, &session.globals, None, &mut host)?;
                let value = coerce_variable(name, *target_type, value)?;
                if *declare {
                    session.globals.declare(name.clone(), value.clone());
                } else {
                    session.globals.assign(name, value.clone());
                }
                Effect::Assigned {
                    name: name.clone(),
                    value,
                }
            }
            BoundStatementKind::Guard { condition, body } => {
                let evaluator = Evaluator::new(&session.schema, max_depth);
                let mut host = StoreHost {
                    store: &mut session.store,
                };
                let holds = evaluator.eval_bool(condition, &session.globals, None, &mut host)?;
                if holds {
                    session.globals.push_frame();
                    self.blocks.push(Cursor {
                        body: Rc::clone(body),
                        next: 0,
                    });
                }
                Effect::Guard(holds)
            }
            BoundStatementKind::Return(_) => {
                return Err(RuntimeError::Misplaced(statement.to_string()).into());
            }
        };
        Ok(Step::Done(effect))
    }
}

impl<S: Storage> Drop for Execution<'_, S> {
    fn drop(&mut self) {
        // Release the frames of guard bodies left unfinished
        for _ in self.blocks.drain(..) {
            self.session.globals.pop_frame();
        }
    }
}
