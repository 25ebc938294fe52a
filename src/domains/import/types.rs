use std::path::PathBuf;

use crate::errors::MigrationError;

/// Result of one transactional batch
#[derive(Debug)]
pub enum BatchOutcome {
    Committed { batch: usize, rows: u64 },
    Failed { batch: usize, rows: usize, error: MigrationError },
}

impl BatchOutcome {
    pub fn batch(&self) -> usize {
        match self {
            BatchOutcome::Committed { batch, .. } | BatchOutcome::Failed { batch, .. } => *batch,
        }
    }

    pub fn committed_rows(&self) -> u64 {
        match self {
            BatchOutcome::Committed { rows, .. } => *rows,
            BatchOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, BatchOutcome::Committed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// every batch committed
    Loaded,
    /// some batches committed, some failed, or the load was cancelled
    Partial,
    /// batches ran and none committed
    Failed,
}

/// Per-table aggregate of batch outcomes
#[derive(Debug)]
pub struct TableLoadReport {
    pub table: String,
    pub truncated_rows: u64,
    pub batches: Vec<BatchOutcome>,
    pub cancelled: bool,
}

impl TableLoadReport {
    pub fn new(table: impl Into<String>, truncated_rows: u64) -> Self {
        Self {
            table: table.into(),
            truncated_rows,
            batches: Vec::new(),
            cancelled: false,
        }
    }

    pub fn committed_rows(&self) -> u64 {
        self.batches.iter().map(BatchOutcome::committed_rows).sum()
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| !b.is_committed())
    }

    pub fn status(&self) -> TableStatus {
        let failed = self.failed_batches().count();
        if failed == 0 && !self.cancelled {
            TableStatus::Loaded
        } else if self.committed_rows() == 0 && failed > 0 {
            TableStatus::Failed
        } else {
            TableStatus::Partial
        }
    }
}

/// One CSV file's import result inside a directory run
#[derive(Debug)]
pub struct TableImportResult {
    pub table: String,
    pub file: PathBuf,
    pub outcome: Result<TableLoadReport, MigrationError>,
}

impl TableImportResult {
    pub fn committed_rows(&self) -> u64 {
        self.outcome.as_ref().map(TableLoadReport::committed_rows).unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        matches!(&self.outcome, Ok(report) if report.status() == TableStatus::Loaded)
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub tables: Vec<TableImportResult>,
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn committed_rows(&self) -> u64 {
        self.tables.iter().map(TableImportResult::committed_rows).sum()
    }

    pub fn incomplete_tables(&self) -> impl Iterator<Item = &TableImportResult> {
        self.tables.iter().filter(|t| !t.is_complete())
    }
}
