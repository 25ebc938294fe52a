use crate::database::StoreSession;
use crate::errors::{MigrationError, MigrationResult};

use super::types::{ColumnDescriptor, TableSchema, TypeAliases};

/// Reads column metadata from the store catalog
#[derive(Debug, Clone, Default)]
pub struct SchemaIntrospector {
    aliases: TypeAliases,
}

impl SchemaIntrospector {
    pub fn new(aliases: TypeAliases) -> Self {
        Self { aliases }
    }

    /// Ordered column descriptors for `table`; `SchemaNotFound` when the catalog has none.
    pub async fn fetch_schema(
        &self,
        session: &mut dyn StoreSession,
        table: &str,
    ) -> MigrationResult<TableSchema> {
        let catalog = session.table_columns(table).await?;
        if catalog.is_empty() {
            return Err(MigrationError::SchemaNotFound {
                table: table.to_string(),
            });
        }

        let columns = catalog
            .into_iter()
            .map(|column| ColumnDescriptor::from_catalog(column, &self.aliases))
            .collect();
        let schema = TableSchema::new(table, columns);

        log::debug!(
            "Schema for {}: {}",
            table,
            schema
                .columns
                .iter()
                .map(|c| format!("{} {}{}", c.name, c.category, if c.nullable { "" } else { " not null" }))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(schema)
    }
}
