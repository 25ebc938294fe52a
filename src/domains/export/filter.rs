use std::collections::HashSet;

use crate::domains::schema::name_key;

/// Decides which tables an export visits.
pub trait TableFilter: Send + Sync {
    fn include(&self, table: &str) -> bool;
}

/// Every table, empty ones included
#[derive(Debug, Clone, Copy, Default)]
pub struct AllTables;

impl TableFilter for AllTables {
    fn include(&self, _table: &str) -> bool {
        true
    }
}

/// A fixed list of table names, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct NamedTables {
    names: HashSet<String>,
}

impl NamedTables {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name_key(name.as_ref().trim()))
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl TableFilter for NamedTables {
    fn include(&self, table: &str) -> bool {
        self.names.contains(&name_key(table))
    }
}

impl<F> TableFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn include(&self, table: &str) -> bool {
        self(table)
    }
}
