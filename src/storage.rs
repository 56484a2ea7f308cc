//! Storage collaborator.
//!
//! The language only needs the handful of table/row operations in
//! [`Storage`]; [`MemoryStore`] is the in-memory engine used by the CLI and the
//! tests. Predicates and assignment callbacks are fallible so that expression
//! errors raised while filtering flow back to the caller unchanged.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::ast::TablePath;
use crate::schema::ColumnDef;
use crate::value::Value;

pub type RowId = u64;

/// A stored row. `values` follows the table's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub values: Vec<Value>,
}

/// Errors reported by the storage engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("table `{0}` doesn't exist")]
    TableNotFound(TablePath),

    #[error("table `{0}` already exists")]
    TableExists(TablePath),

    #[error("column `{column}` doesn't exist in table `{table}`")]
    ColumnNotFound { table: TablePath, column: String },

    #[error("column `{column}` is defined twice in table `{table}`")]
    ColumnExists { table: TablePath, column: String },

    #[error("row has {found} values but table `{table}` has {expected} columns")]
    RowShape {
        table: TablePath,
        expected: usize,
        found: usize,
    },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Boxed lazy row sequence returned by [`Storage::scan_rows`].
pub type RowIter<'a> = Box<dyn Iterator<Item = &'a Row> + 'a>;

/// The minimal table/row API the executor drives.
pub trait Storage {
    fn create_table(&mut self, table: &TablePath, columns: &[ColumnDef]) -> Result<(), StoreError>;

    fn drop_table(&mut self, table: &TablePath) -> Result<(), StoreError>;

    /// Remove a column from the table and from every existing row.
    fn drop_column(&mut self, table: &TablePath, column: &str) -> Result<(), StoreError>;

    /// Insert a full row (one value per column, in column order).
    fn insert_row(&mut self, table: &TablePath, values: Vec<Value>) -> Result<RowId, StoreError>;

    /// Rows in insertion order, produced lazily.
    fn scan_rows<'a>(&'a self, table: &TablePath) -> Result<RowIter<'a>, StoreError>;

    /// Replace every row matching `predicate` with the values `assign`
    /// computes from it. Either every matching row is rewritten or, on the
    /// first error, none is.
    fn update_rows<E, P, A>(&mut self, table: &TablePath, predicate: P, assign: A) -> Result<usize, E>
    where
        E: From<StoreError>,
        P: FnMut(&Row) -> Result<bool, E>,
        A: FnMut(&Row) -> Result<Vec<Value>, E>;

    /// Remove every row matching `predicate`; nothing is removed if the
    /// predicate fails on any row.
    fn delete_rows<E, P>(&mut self, table: &TablePath, predicate: P) -> Result<usize, E>
    where
        E: From<StoreError>,
        P: FnMut(&Row) -> Result<bool, E>;
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnDef>,
    rows: BTreeMap<RowId, Row>,
    next_id: RowId,
}

impl MemTable {
    fn key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.key)
    }

    fn key_violation(&self, key_index: usize, value: &Value, except: Option<RowId>) -> Option<String> {
        let column = &self.columns[key_index].name;
        if let Some(problem) = invalid_key(column, value) {
            return Some(problem);
        }
        let duplicate = self
            .rows
            .values()
            .any(|row| Some(row.id) != except && row.values.get(key_index) == Some(value));
        duplicate.then(|| format!("duplicate key {value} for column `{column}`"))
    }
}

/// A key must be non-empty and equal to itself, so NaN is rejected too.
fn invalid_key(column: &str, value: &Value) -> Option<String> {
    match value {
        Value::Empty => Some(format!("key column `{column}` cannot be empty")),
        Value::Float(f) if f.is_nan() => Some(format!("key column `{column}` cannot be NaN")),
        _ => None,
    }
}

/// In-memory storage engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<TablePath, MemTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, path: &TablePath) -> Result<&MemTable, StoreError> {
        self.tables
            .get(path)
            .ok_or_else(|| StoreError::TableNotFound(path.clone()))
    }

    fn table_mut(&mut self, path: &TablePath) -> Result<&mut MemTable, StoreError> {
        self.tables
            .get_mut(path)
            .ok_or_else(|| StoreError::TableNotFound(path.clone()))
    }

    /// Number of rows currently stored in `table`.
    pub fn row_count(&self, table: &TablePath) -> Result<usize, StoreError> {
        Ok(self.table(table)?.rows.len())
    }
}

impl Storage for MemoryStore {
    fn create_table(&mut self, table: &TablePath, columns: &[ColumnDef]) -> Result<(), StoreError> {
        if self.tables.contains_key(table) {
            return Err(StoreError::TableExists(table.clone()));
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StoreError::ColumnExists {
                    table: table.clone(),
                    column: column.name.clone(),
                });
            }
        }
        self.tables.insert(
            table.clone(),
            MemTable {
                columns: columns.to_vec(),
                rows: BTreeMap::new(),
                next_id: 1,
            },
        );
        debug!(%table, columns = columns.len(), "created table");
        Ok(())
    }

    fn drop_table(&mut self, table: &TablePath) -> Result<(), StoreError> {
        self.tables
            .remove(table)
            .map(|_| debug!(%table, "dropped table"))
            .ok_or_else(|| StoreError::TableNotFound(table.clone()))
    }

    fn drop_column(&mut self, table: &TablePath, column: &str) -> Result<(), StoreError> {
        let mem = self.table_mut(table)?;
        let index = mem
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| StoreError::ColumnNotFound {
                table: table.clone(),
                column: column.to_string(),
            })?;
        mem.columns.remove(index);
        for row in mem.rows.values_mut() {
            row.values.remove(index);
        }
        debug!(%table, column, "dropped column");
        Ok(())
    }

    fn insert_row(&mut self, table: &TablePath, values: Vec<Value>) -> Result<RowId, StoreError> {
        let mem = self.table_mut(table)?;
        if values.len() != mem.columns.len() {
            return Err(StoreError::RowShape {
                table: table.clone(),
                expected: mem.columns.len(),
                found: values.len(),
            });
        }
        if let Some(key) = mem.key_index() {
            if let Some(violation) = mem.key_violation(key, &values[key], None) {
                return Err(StoreError::ConstraintViolation(violation));
            }
        }

        let id = mem.next_id;
        mem.next_id += 1;
        mem.rows.insert(id, Row { id, values });
        debug!(%table, row_id = id, "inserted row");
        Ok(id)
    }

    fn scan_rows<'a>(&'a self, table: &TablePath) -> Result<RowIter<'a>, StoreError> {
        Ok(Box::new(self.table(table)?.rows.values()))
    }

    fn update_rows<E, P, A>(&mut self, table: &TablePath, mut predicate: P, mut assign: A) -> Result<usize, E>
    where
        E: From<StoreError>,
        P: FnMut(&Row) -> Result<bool, E>,
        A: FnMut(&Row) -> Result<Vec<Value>, E>,
    {
        let mem = self.table_mut(table)?;

        let mut staged = Vec::new();
        for row in mem.rows.values() {
            if predicate(row)? {
                let values = assign(row)?;
                if values.len() != mem.columns.len() {
                    return Err(StoreError::RowShape {
                        table: table.clone(),
                        expected: mem.columns.len(),
                        found: values.len(),
                    }
                    .into());
                }
                staged.push((row.id, values));
            }
        }

        if let Some(key) = mem.key_index() {
            let changed: HashSet<RowId> = staged.iter().map(|(id, _)| *id).collect();
            let mut seen: Vec<&Value> = mem
                .rows
                .values()
                .filter(|row| !changed.contains(&row.id))
                .map(|row| &row.values[key])
                .collect();
            for (_, values) in &staged {
                let value = &values[key];
                if let Some(problem) = invalid_key(&mem.columns[key].name, value) {
                    return Err(StoreError::ConstraintViolation(problem).into());
                }
                if seen.contains(&value) {
                    let column = &mem.columns[key].name;
                    return Err(StoreError::ConstraintViolation(format!(
                        "duplicate key {value} for column `{column}`"
                    ))
                    .into());
                }
                seen.push(value);
            }
        }

        let count = staged.len();
        for (id, values) in staged {
            if let Some(row) = mem.rows.get_mut(&id) {
                row.values = values;
            }
        }
        debug!(%table, count, "updated rows");
        Ok(count)
    }

    fn delete_rows<E, P>(&mut self, table: &TablePath, mut predicate: P) -> Result<usize, E>
    where
        E: From<StoreError>,
        P: FnMut(&Row) -> Result<bool, E>,
    {
        let mem = self.table_mut(table)?;
        let mut doomed = Vec::new();
        for row in mem.rows.values() {
            if predicate(row)? {
                doomed.push(row.id);
            }
        }
        for id in &doomed {
            mem.rows.remove(id);
        }
        debug!(%table, count = doomed.len(), "deleted rows");
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn store_with_users() -> (MemoryStore, TablePath) {
        let mut store = MemoryStore::new();
        let path = TablePath::new("shop", "users");
        store
            .create_table(
                &path,
                &[
                    ColumnDef::new("id", DataType::Int).key(),
                    ColumnDef::new("name", DataType::String),
                ],
            )
            .unwrap();
        (store, path)
    }

    fn row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Int(id), Value::String(name.into())]
    }

    #[test]
    fn test_nan_key_is_rejected() {
        let mut store = MemoryStore::new();
        let path = TablePath::new("lab", "samples");
        store
            .create_table(&path, &[ColumnDef::new("reading", DataType::Float).key()])
            .unwrap();
        store.insert_row(&path, vec![Value::Float(1.5)]).unwrap();

        let err = store.insert_row(&path, vec![Value::Float(f64::NAN)]).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(ref msg) if msg.contains("NaN")));

        let err = store
            .update_rows::<StoreError, _, _>(&path, |_| Ok(true), |_| Ok(vec![Value::Float(f64::NAN)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.row_count(&path).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_key_is_constraint_violation() {
        let (mut store, path) = store_with_users();
        store.insert_row(&path, row(1, "John")).unwrap();
        let err = store.insert_row(&path, row(1, "Jane")).unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert_eq!(store.row_count(&path).unwrap(), 1);
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let (mut store, path) = store_with_users();
        store.insert_row(&path, row(1, "John")).unwrap();
        store.insert_row(&path, row(2, "Jane")).unwrap();

        // Setting every key to 7 collides on the second row.
        let result: Result<usize, StoreError> =
            store.update_rows(&path, |_| Ok(true), |r| Ok(vec![Value::Int(7), r.values[1].clone()]));
        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));

        let ids: Vec<Value> = store.scan_rows(&path).unwrap().map(|r| r.values[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_drop_column_reshapes_rows() {
        let (mut store, path) = store_with_users();
        store.insert_row(&path, row(1, "John")).unwrap();
        store.drop_column(&path, "id").unwrap();
        let rows: Vec<&Row> = store.scan_rows(&path).unwrap().collect();
        assert_eq!(rows[0].values, vec![Value::String("John".into())]);
        assert!(store.drop_column(&path, "id").is_err());
    }

    #[test]
    fn test_delete_rows_counts_matches() {
        let (mut store, path) = store_with_users();
        for (id, name) in [(1, "John"), (2, "Jane"), (3, "Bob")] {
            store.insert_row(&path, row(id, name)).unwrap();
        }
        let removed: Result<usize, StoreError> =
            store.delete_rows(&path, |r| Ok(r.values[1].as_text().is_some_and(|n| n.starts_with('J'))));
        assert_eq!(removed, Ok(2));
        assert_eq!(store.row_count(&path).unwrap(), 1);
    }
}
