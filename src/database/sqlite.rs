use async_trait::async_trait;
use futures::stream::StreamExt;
use sqlx::pool::PoolConnection;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{
    Connection, Decode, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction, TypeInfo,
    ValueRef,
};
use std::str::FromStr;

use crate::domains::coercion::{parse_temporal, TypedRow, TypedValue};
use crate::domains::import::CancelSignal;
use crate::domains::schema::{CatalogColumn, TableSchema, TypeCategory};
use crate::errors::{DbError, DbResult};

use super::types::{InsertOutcome, ScalarValue, TableCursor};
use super::{Store, StoreSession};

/// SQLite's default ceiling on bound parameters per statement.
const SQLITE_MAX_PARAMETERS: usize = 32766;

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// SQLite store backed by an sqlx pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with a `sqlite:` URL. Database files are created when missing.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbError::Connection(format!("Invalid connection string: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(format!("Database connection failed: {}", e)))?;

        log::debug!("Connected to {}", url);
        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn open_session(&self) -> DbResult<Box<dyn StoreSession>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to acquire connection: {}", e)))?;
        Ok(Box::new(SqliteSession {
            conn,
            select_sql: String::new(),
        }))
    }
}

pub struct SqliteSession {
    conn: PoolConnection<Sqlite>,
    /// owns the text of the statement behind an open table cursor
    select_sql: String,
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn table_columns(&mut self, table: &str) -> DbResult<Vec<CatalogColumn>> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            r#"SELECT cid, name, type, "notnull" FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(cid, name, declared_type, not_null)| CatalogColumn {
                ordinal: cid.max(0) as usize,
                name,
                declared_type,
                not_null: not_null != 0,
            })
            .collect())
    }

    async fn table_names(&mut self) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(names)
    }

    async fn read_table<'a>(&'a mut self, table: &'a str) -> DbResult<TableCursor<'a>> {
        let catalog = self.table_columns(table).await?;
        if catalog.is_empty() {
            return Err(DbError::Query(format!("no such table: {}", table)));
        }

        let columns: Vec<String> = catalog.iter().map(|c| c.name.clone()).collect();
        // SQLite keeps dates as text; the declared type tells us which text is temporal
        let temporal: Vec<bool> = catalog
            .iter()
            .map(|c| TypeCategory::from_type_name(&c.declared_type) == TypeCategory::Temporal)
            .collect();

        self.select_sql = format!(
            "SELECT {} FROM {}",
            columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
            quote_identifier(table)
        );
        log::debug!("Reading table with: {}", self.select_sql);

        let SqliteSession { conn, select_sql } = self;
        let sql: &'a str = select_sql.as_str();
        let connection: &'a mut SqliteConnection = &mut **conn;

        let rows = sqlx::query(sql)
            .fetch(connection)
            .map(move |row| decode_row(&row?, &temporal))
            .boxed();

        Ok(TableCursor { columns, rows })
    }

    async fn truncate(&mut self, table: &str) -> DbResult<u64> {
        let sql = format!("DELETE FROM {}", quote_identifier(table));
        let result = sqlx::query(&sql).execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    async fn insert_batch(
        &mut self,
        schema: &TableSchema,
        rows: &[TypedRow],
        cancel: &CancelSignal,
    ) -> DbResult<InsertOutcome> {
        if rows.is_empty() {
            return Ok(InsertOutcome::Committed(0));
        }

        let mut tx = self.conn.begin().await?;
        let inserted = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            inserted = insert_rows(&mut tx, schema, rows) => Some(inserted),
        };

        match inserted {
            Some(Ok(inserted)) if !cancel.is_cancelled() => {
                // past this point the batch is committed even if cancel arrives
                tx.commit().await?;
                Ok(InsertOutcome::Committed(inserted))
            }
            Some(Ok(_)) | None => {
                rollback(tx, &schema.table).await;
                Ok(InsertOutcome::RolledBack)
            }
            Some(Err(e)) => {
                rollback(tx, &schema.table).await;
                Err(e)
            }
        }
    }
}

async fn rollback(tx: Transaction<'_, Sqlite>, table: &str) {
    if let Err(e) = tx.rollback().await {
        log::warn!("Rollback on '{}' failed: {}", table, e);
    }
}

/// Multi-row INSERTs sized to stay under the parameter ceiling.
async fn insert_rows(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
    rows: &[TypedRow],
) -> DbResult<u64> {
    let column_list = schema
        .column_names()
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(", ");
    let prefix = format!("INSERT INTO {} ({}) ", quote_identifier(&schema.table), column_list);
    let rows_per_statement = (SQLITE_MAX_PARAMETERS / schema.len().max(1)).max(1);

    let mut inserted = 0;
    for chunk in rows.chunks(rows_per_statement) {
        if let Some(row) = chunk.iter().find(|row| row.len() != schema.len()) {
            return Err(DbError::Query(format!(
                "row has {} values but '{}' has {} columns",
                row.len(),
                schema.table,
                schema.len()
            )));
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(prefix.as_str());
        builder.push_values(chunk, |mut separated, row| {
            for value in row.values() {
                push_typed(&mut separated, value);
            }
        });
        inserted += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(inserted)
}

fn push_typed(separated: &mut Separated<'_, '_, Sqlite, &'static str>, value: &TypedValue) {
    match value {
        TypedValue::Null => separated.push_bind(Option::<String>::None),
        TypedValue::Integer64(v) => separated.push_bind(*v),
        TypedValue::Integer32(v) => separated.push_bind(*v),
        TypedValue::Integer16(v) => separated.push_bind(*v),
        TypedValue::Identifier(_)
        | TypedValue::Decimal(_)
        | TypedValue::Temporal(_)
        | TypedValue::Text(_) => separated.push_bind(value.to_string()),
    };
}

fn decode_column<T>(row: &SqliteRow, index: usize) -> DbResult<T>
where
    T: for<'r> Decode<'r, Sqlite>,
{
    let raw = row.try_get_raw(index)?;
    T::decode(raw).map_err(|e| DbError::Query(format!("Failed to decode column {}: {}", index, e)))
}

fn decode_row(row: &SqliteRow, temporal: &[bool]) -> DbResult<Vec<ScalarValue>> {
    (0..row.len())
        .map(|index| {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                return Ok(ScalarValue::Null);
            }
            let kind = raw.type_info().name().to_string();

            let value = match kind.as_str() {
                "INTEGER" => ScalarValue::Integer(decode_column(row, index)?),
                "REAL" => ScalarValue::Real(decode_column(row, index)?),
                "BLOB" => ScalarValue::Bytes(decode_column(row, index)?),
                _ => {
                    let text: String = decode_column(row, index)?;
                    match temporal.get(index).copied().unwrap_or(false) {
                        true => match parse_temporal(text.trim()) {
                            Some(at) => ScalarValue::Temporal(at),
                            None => ScalarValue::Text(text),
                        },
                        false => ScalarValue::Text(text),
                    }
                }
            };
            Ok(value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("Order Lines"), "\"Order Lines\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
