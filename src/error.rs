//! Error types for mysql-engine.
//!
//! Parse failures and evaluation failures are kept apart so callers can tell a
//! malformed statement from one that failed while running.

use thiserror::Error;

/// SQL engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unexpected clause {clause} in: {sql}")]
    UnexpectedClause { clause: String, sql: String },

    #[error("Unexpected token {token} in: {sql}")]
    UnexpectedToken { token: String, sql: String },

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Table '{0}' doesn't exist")]
    TableNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{source} (while executing: {sql})")]
    Statement {
        sql: String,
        #[source]
        source: Box<SqlError>,
    },
}

/// Result type for SQL engine operations
pub type SqlResult<T> = Result<T, SqlError>;

impl SqlError {
    /// Shorthand for a runtime error with a formatted message.
    pub fn runtime(message: impl Into<String>) -> Self {
        SqlError::RuntimeError(message.into())
    }

    /// Shorthand for a parse error with a formatted message.
    pub fn parse(message: impl Into<String>) -> Self {
        SqlError::ParseError(message.into())
    }

    /// Attach the statement text, unless it is already attached.
    pub fn with_sql(self, sql: &str) -> Self {
        match self {
            SqlError::Statement { .. } => self,
            other => SqlError::Statement {
                sql: sql.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with statement wrappers removed.
    pub fn root(&self) -> &SqlError {
        match self {
            SqlError::Statement { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(
            self.root(),
            SqlError::ParseError(_)
                | SqlError::UnexpectedClause { .. }
                | SqlError::UnexpectedToken { .. }
        )
    }

    pub fn is_runtime_error(&self) -> bool {
        matches!(
            self.root(),
            SqlError::RuntimeError(_) | SqlError::TableNotFound(_) | SqlError::Storage(_)
        )
    }
}

impl serde::Serialize for SqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SqlError::ParseError("expected table name".to_string());
        assert_eq!(err.to_string(), "Parse error: expected table name");

        let err = SqlError::RuntimeError("unknown column 'x'".to_string());
        assert_eq!(err.to_string(), "Runtime error: unknown column 'x'");

        let err = SqlError::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Table 'users' doesn't exist");
    }

    #[test]
    fn test_statement_wrapper_keeps_root() {
        let err = SqlError::runtime("boom").with_sql("SELECT 1");
        assert_eq!(err.to_string(), "Runtime error: boom (while executing: SELECT 1)");
        assert_eq!(err.root(), &SqlError::RuntimeError("boom".to_string()));
        assert!(err.is_runtime_error());
        assert!(!err.is_parse_error());

        // wrapping twice keeps the first statement
        let twice = err.clone().with_sql("SELECT 2");
        assert_eq!(twice, err);
    }

    #[test]
    fn test_classification() {
        let err = SqlError::UnexpectedClause {
            clause: "SET".to_string(),
            sql: "UPDATE t WHERE 1 SET a = 1".to_string(),
        };
        assert!(err.is_parse_error());
        assert!(SqlError::TableNotFound("t".to_string()).is_runtime_error());
    }

    #[test]
    fn test_serialize_as_string() {
        let err = SqlError::parse("bad");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Parse error: bad\"");
    }
}
