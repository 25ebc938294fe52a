use std::sync::Arc;

use crate::domains::schema::name_key;
use crate::errors::{MigrationError, MigrationResult};

/// One CSV data row keyed by the file's header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    header: Arc<[String]>,
    values: Vec<String>,
}

impl RowRecord {
    pub fn new(header: Arc<[String]>, values: Vec<String>) -> MigrationResult<Self> {
        if header.len() != values.len() {
            return Err(MigrationError::malformed(format!(
                "row has {} fields but the header has {}",
                values.len(),
                header.len()
            )));
        }
        Ok(Self { header, values })
    }

    /// Build a record from `(column, value)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> MigrationResult<Self> {
        let header: Arc<[String]> = pairs.iter().map(|(name, _)| name.to_string()).collect();
        let values = pairs.iter().map(|(_, value)| value.to_string()).collect();
        Self::new(header, values)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Case-insensitive lookup by column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        let key = name_key(column);
        self.header
            .iter()
            .position(|name| name_key(name) == key)
            .and_then(|idx| self.value(idx))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Counters reported when a CSV file is finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub rows_written: u64,
    pub bytes_written: u64,
}
