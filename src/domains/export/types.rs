use serde::Serialize;
use std::path::PathBuf;

use crate::domains::csv::WriteStats;
use crate::errors::MigrationError;

/// One table written to one CSV file
#[derive(Debug, Clone)]
pub struct TableExportReport {
    pub table: String,
    pub path: PathBuf,
    pub stats: WriteStats,
}

#[derive(Debug)]
pub struct ExportSummary {
    pub directory: PathBuf,
    pub exported: Vec<TableExportReport>,
    pub failed: Vec<(String, MigrationError)>,
}

impl ExportSummary {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            exported: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.exported.iter().map(|t| t.stats.rows_written).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A finished, packaged backup
#[derive(Debug)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub summary: ExportSummary,
}

/// A column holding at least one text value that matched a scan pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellMatch {
    pub table: String,
    pub column: String,
}

impl std::fmt::Display for CellMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table, self.column)
    }
}
