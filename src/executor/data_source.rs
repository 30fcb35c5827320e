//! Storage collaborator interface and the in-memory implementation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::row::Row;
use crate::coerce;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;

/// Stable identity of a stored row.
pub type RowId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    String,
    DateTime,
}

impl DataType {
    /// Cast a value to this column type. NULL stays NULL.
    pub fn cast(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            DataType::Integer => Value::Int(coerce::to_int(value)),
            DataType::Float => Value::Float(coerce::to_float(value)),
            DataType::String | DataType::DateTime => Value::String(coerce::to_text(value)),
        }
    }

    /// Value written in place of NULL into a NOT NULL column outside strict mode.
    pub fn implicit_default(&self) -> Value {
        match self {
            DataType::Integer => Value::Int(0),
            DataType::Float => Value::Float(0.0),
            DataType::String => Value::String(String::new()),
            DataType::DateTime => Value::String("0000-00-00 00:00:00".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub auto_increment: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        for column in self.columns.iter_mut() {
            if self.primary_key.iter().any(|k| k.eq_ignore_ascii_case(&column.name)) {
                column.nullable = false;
            }
        }
        self
    }

    pub fn unique_key(mut self, columns: &[&str]) -> Self {
        self.unique_keys
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn auto_increment_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.auto_increment)
    }

    /// Primary key followed by every unique key.
    pub fn keys(&self) -> impl Iterator<Item = &Vec<String>> {
        std::iter::once(&self.primary_key)
            .filter(|k| !k.is_empty())
            .chain(self.unique_keys.iter())
    }
}

/// The complete effect of one statement on one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationSet {
    pub inserts: Vec<Row>,
    /// Row identity and the columns that change
    pub updates: Vec<(RowId, Row)>,
    pub deletes: Vec<RowId>,
}

impl MutationSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Table storage used by the query processor.
pub trait DataSource {
    /// Schema of a table, or `None` if it does not exist.
    fn schema(&self, table: &str) -> Option<&TableSchema>;

    /// Snapshot of every row of a table, in storage order.
    fn scan(&self, table: &str) -> SqlResult<Vec<(RowId, Row)>>;

    /// Apply a statement's mutations. Either all of them take effect or none.
    fn apply(&mut self, table: &str, mutations: MutationSet) -> SqlResult<()>;
}

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowId, Row>,
    next_id: RowId,
}

impl Table {
    /// Full stored row in schema column order, with values cast to column types.
    fn normalize(&self, row: &Row) -> SqlResult<Row> {
        for (name, _) in row.iter() {
            if self.schema.find_column(name).is_none() {
                return Err(SqlError::runtime(format!(
                    "Unknown column '{}' in table '{}'",
                    name, self.schema.name
                )));
            }
        }
        let mut stored = Row::new();
        for column in &self.schema.columns {
            let value = match row.get(&column.name) {
                Some(value) => column.data_type.cast(value),
                None => column.default.clone().unwrap_or_default(),
            };
            stored.set(&column.name, value);
        }
        Ok(stored)
    }
}

/// In-memory data source for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: HashMap<String, Table>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    pub fn create_table(&mut self, schema: TableSchema) {
        debug!("[SQL] Creating table '{}'", schema.name);
        self.tables.insert(
            schema.name.clone(),
            Table {
                schema,
                rows: BTreeMap::new(),
                next_id: 0,
            },
        );
    }

    fn table(&self, name: &str) -> SqlResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| SqlError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> SqlResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SqlError::TableNotFound(name.to_string()))
    }

    /// Seed a row from a JSON object. Missing columns take their default.
    pub fn insert_json(&mut self, table: &str, doc: serde_json::Value) -> SqlResult<RowId> {
        let object = match doc {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(SqlError::Storage(format!(
                    "expected a JSON object, got {}",
                    other
                )))
            }
        };
        let row: Row = object
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();

        let entry = self.table_mut(table)?;
        let stored = entry.normalize(&row)?;
        let id = entry.next_id;
        entry.rows.insert(id, stored);
        entry.next_id += 1;
        Ok(id)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Rows of a table as JSON objects, in storage order.
    pub fn dump(&self, table: &str) -> SqlResult<Vec<serde_json::Value>> {
        Ok(self.table(table)?.rows.values().map(Row::to_json).collect())
    }
}

impl DataSource for InMemoryStore {
    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table).map(|t| &t.schema)
    }

    fn scan(&self, table: &str) -> SqlResult<Vec<(RowId, Row)>> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .map(|(id, row)| (*id, row.clone()))
            .collect())
    }

    fn apply(&mut self, table: &str, mutations: MutationSet) -> SqlResult<()> {
        let entry = self.table_mut(table)?;

        // validate everything before touching storage
        for id in mutations
            .updates
            .iter()
            .map(|(id, _)| id)
            .chain(mutations.deletes.iter())
        {
            if !entry.rows.contains_key(id) {
                return Err(SqlError::Storage(format!(
                    "row {} does not exist in '{}'",
                    id, table
                )));
            }
        }
        let mut inserts = Vec::with_capacity(mutations.inserts.len());
        for row in &mutations.inserts {
            inserts.push(entry.normalize(row)?);
        }
        let mut updates = Vec::with_capacity(mutations.updates.len());
        for (id, changes) in &mutations.updates {
            let mut merged = entry.rows.get(id).cloned().unwrap_or_default();
            for (name, value) in changes.iter() {
                merged.set(name, value.clone());
            }
            updates.push((*id, entry.normalize(&merged)?));
        }

        debug!(
            "[SQL] Applying to '{}': {} inserts, {} updates, {} deletes",
            table,
            inserts.len(),
            updates.len(),
            mutations.deletes.len()
        );

        for (id, row) in updates {
            entry.rows.insert(id, row);
        }
        for id in &mutations.deletes {
            entry.rows.remove(id);
        }
        for row in inserts {
            entry.rows.insert(entry.next_id, row);
            entry.next_id += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.create_table(
            TableSchema::new("users")
                .column(ColumnDef::new("id", DataType::Integer).auto_increment())
                .column(ColumnDef::new("name", DataType::String))
                .column(ColumnDef::new("score", DataType::Float).default_value(1.5))
                .primary_key(&["id"]),
        );
        store
    }

    #[test]
    fn test_insert_json_and_scan() {
        let mut store = store();
        store.insert_json("users", json!({"id": 1, "name": "Alice"})).unwrap();
        store.insert_json("users", json!({"id": "2", "name": "Bob", "score": 3})).unwrap();

        let rows = store.scan("users").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.get("score"), Some(&Value::Float(1.5)));
        assert_eq!(rows[1].1.get("id"), Some(&Value::Int(2)));
        assert_eq!(rows[1].1.get("score"), Some(&Value::Float(3.0)));
        assert_eq!(rows[0].1.column_names(), vec!["id", "name", "score"]);
    }

    #[test]
    fn test_unknown_table_and_column() {
        let mut store = store();
        assert!(matches!(store.scan("nope"), Err(SqlError::TableNotFound(_))));
        assert!(store.insert_json("users", json!({"bogus": 1})).is_err());
        assert!(store.insert_json("users", json!([1, 2])).is_err());
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut store = store();
        let id = store.insert_json("users", json!({"id": 1, "name": "Alice"})).unwrap();

        let mut changes = Row::new();
        changes.set("name", Value::from("Alicia"));
        let bad = MutationSet {
            updates: vec![(id, changes.clone())],
            deletes: vec![99],
            ..Default::default()
        };
        assert!(store.apply("users", bad).is_err());
        assert_eq!(store.dump("users").unwrap()[0]["name"], json!("Alice"));

        let good = MutationSet {
            updates: vec![(id, changes)],
            ..Default::default()
        };
        store.apply("users", good).unwrap();
        assert_eq!(store.dump("users").unwrap()[0]["name"], json!("Alicia"));
    }

    #[test]
    fn test_apply_deletes_and_inserts() {
        let mut store = store();
        let id = store.insert_json("users", json!({"id": 1, "name": "Alice"})).unwrap();
        let mut row = Row::new();
        row.set("id", Value::Int(2));
        row.set("name", Value::from("Bob"));

        store
            .apply(
                "users",
                MutationSet {
                    inserts: vec![row],
                    deletes: vec![id],
                    ..Default::default()
                },
            )
            .unwrap();
        let rows = store.dump("users").unwrap();
        assert_eq!(rows, vec![json!({"id": 2, "name": "Bob", "score": 1.5})]);
    }

    #[test]
    fn test_schema_from_json() {
        let schema: TableSchema = serde_json::from_value(json!({
            "name": "t",
            "columns": [
                {"name": "id", "data_type": "integer", "nullable": false},
                {"name": "label", "data_type": "string"}
            ],
            "primary_key": ["id"]
        }))
        .unwrap();
        assert!(!schema.columns[0].nullable);
        assert!(schema.columns[1].nullable);
        assert_eq!(schema.keys().count(), 1);
    }

    #[test]
    fn test_cast() {
        assert_eq!(DataType::Integer.cast(&Value::from("12abc")), Value::Int(12));
        assert_eq!(DataType::String.cast(&Value::Int(5)), Value::from("5"));
        assert_eq!(DataType::Float.cast(&Value::Null), Value::Null);
    }
}
