use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of scalar categories a column can be coerced into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Identifier,
    Integer64,
    Integer32,
    /// small integers and boolean flags
    Integer16,
    Decimal,
    Temporal,
    Text,
}

impl TypeCategory {
    /// Map a declared column type (`decimal(18,2)`, `UNIQUEIDENTIFIER`, ...) to its category.
    pub fn from_type_name(type_name: &str) -> Self {
        let base = base_type_name(type_name);
        match base.as_str() {
            "uniqueidentifier" | "uuid" | "guid" => TypeCategory::Identifier,
            "bigint" | "int8" | "integer" => TypeCategory::Integer64,
            "int" | "int4" | "mediumint" => TypeCategory::Integer32,
            "smallint" | "tinyint" | "bit" | "bool" | "boolean" => TypeCategory::Integer16,
            "decimal" | "numeric" | "money" | "smallmoney" | "float" | "real" | "double"
            | "double precision" => TypeCategory::Decimal,
            "date" | "datetime" | "smalldatetime" | "datetime2" | "timestamp" => {
                TypeCategory::Temporal
            }
            _ => TypeCategory::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeCategory::Identifier => "identifier",
            TypeCategory::Integer64 => "integer64",
            TypeCategory::Integer32 => "integer32",
            TypeCategory::Integer16 => "integer16",
            TypeCategory::Decimal => "decimal",
            TypeCategory::Temporal => "temporal",
            TypeCategory::Text => "text",
        }
    }
}

impl fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased type name without its `(..)` arguments.
fn base_type_name(type_name: &str) -> String {
    let base = match type_name.find('(') {
        Some(idx) => &type_name[..idx],
        None => type_name,
    };
    base.trim().to_ascii_lowercase()
}

/// Numeric arguments of a declared type: `decimal(18, 2)` -> `[18, 2]`, `nvarchar(max)` -> `[]`.
fn type_arguments(type_name: &str) -> Vec<u32> {
    let (Some(open), Some(close)) = (type_name.find('('), type_name.rfind(')')) else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    type_name[open + 1..close]
        .split(',')
        .filter_map(|arg| arg.trim().parse::<u32>().ok())
        .collect()
}

/// Extra declared-type names mapped to a category, consulted before the built-in table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeAliases(HashMap<String, TypeCategory>);

impl TypeAliases {
    pub fn new(aliases: HashMap<String, TypeCategory>) -> Self {
        Self(
            aliases
                .into_iter()
                .map(|(name, category)| (name.to_ascii_lowercase(), category))
                .collect(),
        )
    }

    pub fn resolve(&self, type_name: &str) -> TypeCategory {
        self.0
            .get(&base_type_name(type_name))
            .copied()
            .unwrap_or_else(|| TypeCategory::from_type_name(type_name))
    }
}

/// Raw catalog row as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub ordinal: usize,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
}

/// Per-column metadata, immutable once fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub category: TypeCategory,
    pub nullable: bool,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub ordinal: usize,
}

impl ColumnDescriptor {
    pub fn from_catalog(column: CatalogColumn, aliases: &TypeAliases) -> Self {
        let category = aliases.resolve(&column.declared_type);
        let args = type_arguments(&column.declared_type);
        let (length, precision, scale) = match category {
            TypeCategory::Decimal => (None, args.first().copied(), args.get(1).copied()),
            _ => (args.first().copied(), None, None),
        };
        Self {
            name: column.name,
            declared_type: column.declared_type,
            category,
            nullable: !column.not_null,
            length,
            precision,
            scale,
            ordinal: column.ordinal,
        }
    }
}

/// Key under which table and column names compare equal, regardless of case.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Ordered column list of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, mut columns: Vec<ColumnDescriptor>) -> Self {
        columns.sort_by_key(|c| c.ordinal);
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Case-insensitive column lookup.
    pub fn position(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.columns.iter().position(|c| name_key(&c.name) == key)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.position(name).map(|idx| &self.columns[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(ordinal: usize, name: &str, declared_type: &str, not_null: bool) -> CatalogColumn {
        CatalogColumn {
            ordinal,
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            not_null,
        }
    }

    #[test]
    fn test_declared_types_map_to_categories() {
        assert_eq!(TypeCategory::from_type_name("uniqueidentifier"), TypeCategory::Identifier);
        assert_eq!(TypeCategory::from_type_name("BIGINT"), TypeCategory::Integer64);
        assert_eq!(TypeCategory::from_type_name("INTEGER"), TypeCategory::Integer64);
        assert_eq!(TypeCategory::from_type_name("int"), TypeCategory::Integer32);
        assert_eq!(TypeCategory::from_type_name("bit"), TypeCategory::Integer16);
        assert_eq!(TypeCategory::from_type_name("smallint"), TypeCategory::Integer16);
        assert_eq!(TypeCategory::from_type_name("decimal(18, 2)"), TypeCategory::Decimal);
        assert_eq!(TypeCategory::from_type_name("money"), TypeCategory::Decimal);
        assert_eq!(TypeCategory::from_type_name("float"), TypeCategory::Decimal);
        assert_eq!(TypeCategory::from_type_name("smalldatetime"), TypeCategory::Temporal);
        assert_eq!(TypeCategory::from_type_name("DateTime"), TypeCategory::Temporal);
        assert_eq!(TypeCategory::from_type_name("nvarchar(50)"), TypeCategory::Text);
        assert_eq!(TypeCategory::from_type_name(""), TypeCategory::Text);
    }

    #[test]
    fn test_type_arguments_fill_length_or_precision() {
        let aliases = TypeAliases::default();
        let money = ColumnDescriptor::from_catalog(catalog(0, "amt", "decimal(18,2)", false), &aliases);
        assert_eq!((money.precision, money.scale, money.length), (Some(18), Some(2), None));
        assert!(!money.nullable);

        let name = ColumnDescriptor::from_catalog(catalog(1, "name", "nvarchar(50)", true), &aliases);
        assert_eq!((name.length, name.precision), (Some(50), None));
        assert!(name.nullable);

        let memo = ColumnDescriptor::from_catalog(catalog(2, "memo", "nvarchar(max)", true), &aliases);
        assert_eq!(memo.length, None);
    }

    #[test]
    fn test_aliases_take_precedence() {
        let aliases = TypeAliases::new(HashMap::from([("CITEXT".to_string(), TypeCategory::Text), ("serial".to_string(), TypeCategory::Integer32)]));
        assert_eq!(aliases.resolve("serial"), TypeCategory::Integer32);
        assert_eq!(aliases.resolve("citext"), TypeCategory::Text);
        assert_eq!(aliases.resolve("bigint"), TypeCategory::Integer64);
    }

    #[test]
    fn test_schema_orders_by_ordinal_and_matches_case_insensitively() {
        let aliases = TypeAliases::default();
        let schema = TableSchema::new(
            "T",
            vec![
                ColumnDescriptor::from_catalog(catalog(1, "Amt", "decimal", false), &aliases),
                ColumnDescriptor::from_catalog(catalog(0, "Id", "uniqueidentifier", false), &aliases),
            ],
        );
        assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["Id", "Amt"]);
        assert_eq!(schema.position("AMT"), Some(1));
        assert!(schema.column("missing").is_none());
    }

    #[test]
    fn test_names_fold_beyond_ascii() {
        assert_eq!(name_key("ÄMT"), name_key("ämt"));
        assert_ne!(name_key("Straße"), name_key("STRASSE"));

        let schema = TableSchema::new(
            "T",
            vec![ColumnDescriptor::from_catalog(catalog(0, "ämt", "decimal", false), &TypeAliases::default())],
        );
        assert_eq!(schema.position("ÄMT"), Some(0));
    }
}
