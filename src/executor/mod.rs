//! Statement execution.
//!
//! `QueryProcessor` owns a `DataSource` and runs parsed statements against it:
//! - `select` evaluates SELECT, including joins, grouping and subqueries
//! - `dml` plans UPDATE, DELETE and INSERT into a single `MutationSet`
//! - `evaluate` and `builtins` implement expressions and functions

mod builtins;
mod data_source;
mod dml;
mod evaluate;
mod row;
mod select;

pub use data_source::{
    ColumnDef, DataSource, DataType, InMemoryStore, MutationSet, RowId, TableSchema,
};
pub use row::{Cell, EvalContext, Row, RowSet};

use serde::Serialize;
use tracing::debug;

use crate::ast::Query;
use crate::config::EngineConfig;
use crate::error::{SqlError, SqlResult};
use crate::parser::parse;
use crate::value::Value;

use select::SelectExecutor;

/// Rows produced by a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Output column names in select-list order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every value of one output column.
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or_default())
            .collect()
    }

    /// Rows as JSON objects.
    pub fn to_json(&self) -> Vec<serde_json::Value> {
        self.rows.iter().map(Row::to_json).collect()
    }
}

/// Outcome of an UPDATE, DELETE or INSERT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MutationSummary {
    /// Rows inserted, changed or deleted. A duplicate-key update that
    /// changes its row counts twice.
    pub affected_rows: usize,
    /// Rows the statement matched, changed or not. For INSERT, the number of
    /// proposed rows.
    pub matched_rows: usize,
    /// First auto-increment id generated by an INSERT
    pub last_insert_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(ResultSet),
    Mutation(MutationSummary),
}

impl QueryResult {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            QueryResult::Rows(result) => Some(result),
            QueryResult::Mutation(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<ResultSet> {
        match self {
            QueryResult::Rows(result) => Some(result),
            QueryResult::Mutation(_) => None,
        }
    }

    pub fn summary(&self) -> Option<&MutationSummary> {
        match self {
            QueryResult::Mutation(summary) => Some(summary),
            QueryResult::Rows(_) => None,
        }
    }
}

/// Parses and executes SQL statements against a data source.
///
/// # Example
///
/// ```
/// use mysql_engine::{ColumnDef, DataType, InMemoryStore, QueryProcessor, TableSchema};
/// use serde_json::json;
///
/// let mut store = InMemoryStore::new();
/// store.create_table(
///     TableSchema::new("users")
///         .column(ColumnDef::new("id", DataType::Integer).auto_increment())
///         .column(ColumnDef::new("name", DataType::String))
///         .primary_key(&["id"]),
/// );
///
/// let mut processor = QueryProcessor::new(store);
/// processor.execute("INSERT INTO users (name) VALUES ('ada'), ('grace')").unwrap();
///
/// let result = processor.query("SELECT id FROM users WHERE name = 'grace'").unwrap();
/// assert_eq!(result.to_json(), vec![json!({"id": 2})]);
/// ```
pub struct QueryProcessor<D: DataSource> {
    source: D,
    config: EngineConfig,
}

impl<D: DataSource> QueryProcessor<D> {
    pub fn new(source: D) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config(source: D, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut D {
        &mut self.source
    }

    pub fn into_source(self) -> D {
        self.source
    }

    /// Parse and execute one statement.
    pub fn execute(&mut self, sql: &str) -> SqlResult<QueryResult> {
        let query = parse(sql).map_err(|e| e.with_sql(sql))?;
        self.execute_query(&query)
    }

    /// Execute a SELECT and return its rows.
    pub fn query(&mut self, sql: &str) -> SqlResult<ResultSet> {
        match self.execute(sql)? {
            QueryResult::Rows(result) => Ok(result),
            QueryResult::Mutation(_) => Err(SqlError::runtime(format!(
                "Statement does not return rows: {}",
                sql
            ))),
        }
    }

    /// Execute an already parsed statement.
    pub fn execute_query(&mut self, query: &Query) -> SqlResult<QueryResult> {
        debug!("[SQL] Executing {}", query.kind());
        let config = &self.config;
        let result = match query {
            Query::Select(select) => SelectExecutor::new(&self.source, config)
                .execute(select, None)
                .map(QueryResult::Rows),
            Query::Update(update) => {
                dml::execute_update(&mut self.source, config, update).map(QueryResult::Mutation)
            }
            Query::Delete(delete) => {
                dml::execute_delete(&mut self.source, config, delete).map(QueryResult::Mutation)
            }
            Query::Insert(insert) => {
                dml::execute_insert(&mut self.source, config, insert).map(QueryResult::Mutation)
            }
        };
        result.map_err(|e| e.with_sql(query.sql()))
    }
}
