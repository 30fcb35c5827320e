//! mysql-engine - In-memory MySQL-compatible SQL parser and executor.
//!
//! This crate parses the MySQL dialect used by application code and runs it
//! against a pluggable storage collaborator, reproducing MySQL's casting,
//! NULL and grouping semantics.
//!
//! # Main Components
//!
//! - **Lexer**: Splits SQL text into classified tokens
//! - **Parser**: Builds a typed AST for SELECT, UPDATE, DELETE and INSERT
//! - **Executor**: Evaluates statements against a `DataSource` implementation
//!
//! # Example
//!
//! ```rust
//! use mysql_engine::{ColumnDef, DataType, InMemoryStore, QueryProcessor, TableSchema};
//! use serde_json::json;
//!
//! let mut store = InMemoryStore::new();
//! store.create_table(
//!     TableSchema::new("users")
//!         .column(ColumnDef::new("id", DataType::Integer))
//!         .column(ColumnDef::new("name", DataType::String))
//!         .column(ColumnDef::new("age", DataType::Integer))
//!         .primary_key(&["id"]),
//! );
//! store.insert_json("users", json!({"id": 1, "name": "Alice", "age": 30})).unwrap();
//! store.insert_json("users", json!({"id": 2, "name": "Bob", "age": 25})).unwrap();
//!
//! let mut processor = QueryProcessor::new(store);
//! let result = processor.query("SELECT name FROM users WHERE age > 26").unwrap();
//! assert_eq!(result.to_json(), vec![json!({"name": "Alice"})]);
//! ```

pub mod ast;
pub mod coerce;
pub mod config;
pub mod error;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod value;

// Re-export main types for convenience
pub use ast::{
    Assignment, BinaryOperator, ColumnExpression, DeleteQuery, Expression, FunctionExpression,
    InsertQuery, JoinDescriptor, JoinOperator, JoinType, LimitClause, OrderByItem, Query,
    SelectItem, SelectQuery, SortDirection, UnaryOperator, UpdateQuery,
};
pub use config::EngineConfig;
pub use error::{SqlError, SqlResult};
pub use executor::{
    ColumnDef, DataSource, DataType, InMemoryStore, MutationSet, MutationSummary, QueryProcessor,
    QueryResult, ResultSet, Row, RowId, TableSchema,
};
pub use lexer::{tokenize, Clause, Lexer, Token, TokenKind};
pub use parser::{parse, SqlParser};
pub use value::Value;
