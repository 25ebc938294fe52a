pub mod repository;
pub mod types;

pub use repository::SchemaIntrospector;
pub use types::{name_key, CatalogColumn, ColumnDescriptor, TableSchema, TypeAliases, TypeCategory};
