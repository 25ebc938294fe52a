use async_trait::async_trait;

use crate::domains::coercion::TypedRow;
use crate::domains::import::CancelSignal;
use crate::domains::schema::{CatalogColumn, TableSchema};
use crate::errors::DbResult;

pub mod sqlite;
pub mod types;

pub use sqlite::{quote_identifier, SqliteStore};
pub use types::{InsertOutcome, ScalarStream, ScalarValue, TableCursor};

/// Hands out store sessions; one session per table operation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn open_session(&self) -> DbResult<Box<dyn StoreSession>>;
}

/// A single exclusively-owned store connection
#[async_trait]
pub trait StoreSession: Send {
    /// Catalog rows for `table`, ordered by physical column position. Empty when the table is unknown.
    async fn table_columns(&mut self, table: &str) -> DbResult<Vec<CatalogColumn>>;

    /// User table names, ordered by name.
    async fn table_names(&mut self) -> DbResult<Vec<String>>;

    /// Full-table read as a lazy stream bound to this session's cursor.
    async fn read_table<'a>(&'a mut self, table: &'a str) -> DbResult<TableCursor<'a>>;

    /// Remove every row of `table`; returns the number removed.
    async fn truncate(&mut self, table: &str) -> DbResult<u64>;

    /// Insert `rows` inside one transaction: all of them are committed or none are.
    ///
    /// `cancel` is honoured until the commit is issued. A commit that has started always
    /// runs to completion and is reported as `Committed`.
    async fn insert_batch(
        &mut self,
        schema: &TableSchema,
        rows: &[TypedRow],
        cancel: &CancelSignal,
    ) -> DbResult<InsertOutcome>;
}
