mod error;

pub use error::{DbError, MigrationError};

/// Result type for store operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for import/export operations
pub type MigrationResult<T> = Result<T, MigrationError>;
