use chrono::NaiveDateTime;
use futures::stream::BoxStream;
use std::borrow::Cow;

use crate::domains::coercion::TEMPORAL_FORMAT;
use crate::errors::DbResult;

/// A value as read from the store, tagged by its runtime kind
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    Temporal(NaiveDateTime),
}

impl ScalarValue {
    /// Text written into a CSV field for this value.
    pub fn to_field(&self) -> Cow<'_, str> {
        match self {
            ScalarValue::Null => Cow::Borrowed(""),
            ScalarValue::Integer(v) => Cow::Owned(v.to_string()),
            ScalarValue::Real(v) => Cow::Owned(v.to_string()),
            ScalarValue::Text(v) => Cow::Borrowed(v.as_str()),
            ScalarValue::Bytes(v) => Cow::Owned(hex::encode(v)),
            ScalarValue::Temporal(v) => Cow::Owned(v.format(TEMPORAL_FORMAT).to_string()),
        }
    }
}

/// How a batch insert ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Committed(u64),
    /// Cancelled before commit; the transaction was rolled back.
    RolledBack,
}

/// Rows of a full-table read, in catalog column order.
pub type ScalarStream<'a> = BoxStream<'a, DbResult<Vec<ScalarValue>>>;

/// Column names plus the live cursor over a table's rows
pub struct TableCursor<'a> {
    pub columns: Vec<String>,
    pub rows: ScalarStream<'a>,
}
