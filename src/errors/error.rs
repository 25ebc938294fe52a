use thiserror::Error;

use crate::domains::schema::TypeCategory;

/// Store-level errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),
}

impl DbError {
    /// True when the failure is about reaching the store rather than about a statement.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            DbError::Connection(_) => true,
            DbError::Sqlx(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Configuration(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            DbError::Query(_) => false,
        }
    }
}

/// Errors raised while moving tables between the store and CSV files
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Table '{table}' has no columns in the catalog")]
    SchemaNotFound { table: String },

    #[error("Malformed CSV: {0}")]
    MalformedCsv(String),

    #[error("Encoding error ({encoding}): {detail}")]
    Encoding { encoding: String, detail: String },

    #[error("Column '{column}' does not allow null")]
    NullNotAllowed { column: String },

    #[error("Column '{column}': cannot convert '{raw_value}' to {target}")]
    TypeCoercion {
        column: String,
        raw_value: String,
        target: TypeCategory,
    },

    #[error("Columns do not match table schema (missing: [{}], unexpected: [{}])", .missing.join(", "), .unexpected.join(", "))]
    ColumnMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Batch {batch} insert into '{table}' failed: {source}")]
    BatchInsertFailure {
        table: String,
        batch: usize,
        #[source]
        source: DbError,
    },

    #[error("Connection failure: {0}")]
    ConnectionFailure(#[source] DbError),

    #[error("Database error: {0}")]
    Database(#[source] DbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        if error.is_connection_failure() {
            MigrationError::ConnectionFailure(error)
        } else {
            MigrationError::Database(error)
        }
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(error: sqlx::Error) -> Self {
        DbError::from(error).into()
    }
}

impl From<zip::result::ZipError> for MigrationError {
    fn from(error: zip::result::ZipError) -> Self {
        MigrationError::Archive(error.to_string())
    }
}

impl MigrationError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCsv(reason.into())
    }

    pub fn encoding(encoding: &str, detail: impl Into<String>) -> Self {
        Self::Encoding {
            encoding: encoding.to_string(),
            detail: detail.into(),
        }
    }

    /// Column the error is about, when there is one.
    pub fn column(&self) -> Option<&str> {
        match self {
            MigrationError::NullNotAllowed { column } => Some(column),
            MigrationError::TypeCoercion { column, .. } => Some(column),
            _ => None,
        }
    }

    /// Errors that end the current table but not the run.
    pub fn is_table_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::SchemaNotFound { .. }
                | MigrationError::ConnectionFailure(_)
                | MigrationError::Database(_)
                | MigrationError::MalformedCsv(_)
                | MigrationError::ColumnMismatch { .. }
                | MigrationError::Encoding { .. }
                | MigrationError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_are_connection_failures() {
        let err: MigrationError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, MigrationError::ConnectionFailure(_)));
        assert!(err.is_table_fatal());
    }

    #[test]
    fn statement_errors_stay_database_errors() {
        let err: MigrationError = DbError::Query("no such table".into()).into();
        assert!(matches!(err, MigrationError::Database(_)));
    }

    #[test]
    fn coercion_errors_name_their_column() {
        let err = MigrationError::TypeCoercion {
            column: "amt".into(),
            raw_value: "abc".into(),
            target: TypeCategory::Decimal,
        };
        assert_eq!(err.column(), Some("amt"));
        assert_eq!(err.to_string(), "Column 'amt': cannot convert 'abc' to decimal");
        assert!(!err.is_table_fatal());
    }

    #[test]
    fn column_mismatch_lists_both_sides() {
        let err = MigrationError::ColumnMismatch {
            missing: vec!["id".into()],
            unexpected: vec!["ID2".into(), "x".into()],
        };
        assert_eq!(
            err.to_string(),
            "Columns do not match table schema (missing: [id], unexpected: [ID2, x])"
        );
    }
}
