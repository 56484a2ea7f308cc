//! Schema catalog: databases, their tables and columns, and the user-defined
//! functions registered so far.
//!
//! The catalog is populated while a program runs (`generate`), shrunk by
//! `delete db.t` / `delete db.t->col`, and read by the binder for every other
//! statement. The binder works on a clone of it so it can follow the DDL of the
//! program it is checking without touching the live session.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{FunctionDecl, TablePath};
use crate::binder::BindError;
use crate::bound::BoundStatement;
use crate::lexer::Position;
use crate::value::DataType;

/// Column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    /// Primary key column; values must be unique and non-empty
    pub key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        ColumnDef {
            name: name.into(),
            data_type,
            key: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }
}

/// Table metadata: ordered columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub path: TablePath,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Look up a column by name (case-sensitive).
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Zero-based position of a column by name.
    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Typed parameter of a registered function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub data_type: DataType,
}

/// A registered user-defined function with its bound body.
///
/// The declaration is kept so the body can be bound again whenever a table
/// is generated or dropped.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ParamDef>,
    pub return_type: Option<DataType>,
    pub body: Vec<BoundStatement>,
    /// False when the body (directly or through calls) mutates the store
    pub pure: bool,
    pub decl: Rc<FunctionDecl>,
    /// Why the body no longer binds against the current tables
    pub stale: Option<BindError>,
    pub position: Position,
}

impl FunctionDef {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `db.f(a int, b int) -> int`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{} {}", p.name, p.data_type))
            .collect();
        match self.return_type {
            Some(ty) => format!("{}({}) -> {}", self.name, params.join(", "), ty),
            None => format!("{}({})", self.name, params.join(", ")),
        }
    }
}

/// The catalog.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    databases: BTreeMap<String, BTreeMap<String, TableDef>>,
    /// Overloads by name; at most one per arity
    functions: BTreeMap<String, Vec<Rc<FunctionDef>>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, path: &TablePath) -> Option<&TableDef> {
        self.databases.get(&path.database)?.get(&path.table)
    }

    pub fn has_table(&self, path: &TablePath) -> bool {
        self.table(path).is_some()
    }

    /// All tables, ordered by database then table name.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.databases.values().flat_map(|tables| tables.values())
    }

    /// Returns false (and changes nothing) if the table already exists.
    pub fn create_table(&mut self, table: TableDef) -> bool {
        let tables = self.databases.entry(table.path.database.clone()).or_default();
        if tables.contains_key(&table.path.table) {
            return false;
        }
        tables.insert(table.path.table.clone(), table);
        true
    }

    pub fn drop_table(&mut self, path: &TablePath) -> Option<TableDef> {
        let tables = self.databases.get_mut(&path.database)?;
        let dropped = tables.remove(&path.table);
        if tables.is_empty() {
            self.databases.remove(&path.database);
        }
        dropped
    }

    pub fn drop_column(&mut self, path: &TablePath, column: &str) -> Option<ColumnDef> {
        let table = self.databases.get_mut(&path.database)?.get_mut(&path.table)?;
        let index = table.find_column_index(column)?;
        Some(table.columns.remove(index))
    }

    pub fn function(&self, name: &str, arity: usize) -> Option<&Rc<FunctionDef>> {
        self.functions
            .get(name)?
            .iter()
            .find(|f| f.arity() == arity)
    }

    /// Arities declared under `name`, empty if the name is unknown.
    pub fn function_arities(&self, name: &str) -> Vec<usize> {
        self.functions
            .get(name)
            .map(|overloads| overloads.iter().map(|f| f.arity()).collect())
            .unwrap_or_default()
    }

    /// Returns false if a function with the same name and arity exists.
    pub fn register_function(&mut self, function: Rc<FunctionDef>) -> bool {
        let overloads = self.functions.entry(function.name.clone()).or_default();
        if overloads.iter().any(|f| f.arity() == function.arity()) {
            return false;
        }
        overloads.push(function);
        true
    }

    /// Replace the definition with the same name and arity (used to swap a
    /// provisional signature for the fully bound function).
    pub fn replace_function(&mut self, function: Rc<FunctionDef>) {
        let overloads = self.functions.entry(function.name.clone()).or_default();
        overloads.retain(|f| f.arity() != function.arity());
        overloads.push(function);
    }

    pub fn remove_function(&mut self, name: &str, arity: usize) {
        if let Some(overloads) = self.functions.get_mut(name) {
            overloads.retain(|f| f.arity() != arity);
            if overloads.is_empty() {
                self.functions.remove(name);
            }
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &Rc<FunctionDef>> {
        self.functions.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef {
            path: TablePath::new("shop", "users"),
            columns: vec![
                ColumnDef::new("id", DataType::Int).key(),
                ColumnDef::new("name", DataType::String),
            ],
        }
    }

    #[test]
    fn test_create_rejects_redefinition() {
        let mut schema = Schema::new();
        assert!(schema.create_table(users()));
        assert!(!schema.create_table(users()));
    }

    #[test]
    fn test_drop_column_keeps_order() {
        let mut schema = Schema::new();
        schema.create_table(users());
        let path = TablePath::new("shop", "users");
        assert_eq!(schema.drop_column(&path, "id").map(|c| c.name), Some("id".to_string()));
        assert_eq!(schema.table(&path).unwrap().column_names(), vec!["name"]);
        assert!(schema.drop_column(&path, "id").is_none());
    }

    #[test]
    fn test_dropping_last_table_forgets_database() {
        let mut schema = Schema::new();
        schema.create_table(users());
        schema.drop_table(&TablePath::new("shop", "users"));
        assert_eq!(schema.tables().count(), 0);
    }
}
