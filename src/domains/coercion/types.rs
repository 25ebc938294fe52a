use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// Canonical text form used for temporal values in files and in the store.
pub const TEMPORAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A cell after coercion against its column descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Identifier(Uuid),
    Integer64(i64),
    Integer32(i32),
    Integer16(i16),
    Decimal(Decimal),
    Temporal(NaiveDateTime),
    Text(String),
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => Ok(()),
            TypedValue::Identifier(id) => write!(f, "{}", id),
            TypedValue::Integer64(v) => write!(f, "{}", v),
            TypedValue::Integer32(v) => write!(f, "{}", v),
            TypedValue::Integer16(v) => write!(f, "{}", v),
            TypedValue::Decimal(v) => write!(f, "{}", v),
            // sub-second precision is kept on the way into the store
            TypedValue::Temporal(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            TypedValue::Text(v) => f.write_str(v),
        }
    }
}

/// One row coerced against a `TableSchema`; values follow the schema's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    values: Vec<TypedValue>,
}

impl TypedRow {
    pub(crate) fn new(values: Vec<TypedValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(index)
    }
}
