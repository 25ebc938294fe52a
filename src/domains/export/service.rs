use chrono::Local;
use futures::StreamExt;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::database::{ScalarValue, Store, StoreSession};
use crate::domains::csv::{CsvTableWriter, TextEncoding};
use crate::errors::{MigrationError, MigrationResult};

use super::archive::{create_zip_from_dir, sha256_file};
use super::filter::{AllTables, TableFilter};
use super::types::{BackupArchive, CellMatch, ExportSummary, TableExportReport};

/// Timestamp suffix of backup folders and archives.
pub const BACKUP_STAMP_FORMAT: &str = "%y%m%d%H%M%S";

/// Streams store tables out to one CSV file each.
pub struct ExportOrchestrator {
    store: Arc<dyn Store>,
    encoding: TextEncoding,
    filter: Box<dyn TableFilter>,
}

impl ExportOrchestrator {
    pub fn new(store: Arc<dyn Store>, encoding: TextEncoding) -> Self {
        Self {
            store,
            encoding,
            filter: Box::new(AllTables),
        }
    }

    pub fn with_filter(mut self, filter: impl TableFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Names of the tables an export would visit, in store order.
    pub async fn target_tables(&self) -> MigrationResult<Vec<String>> {
        let mut session = self.store.open_session().await?;
        let tables = session.table_names().await?;
        Ok(tables
            .into_iter()
            .filter(|table| self.filter.include(table))
            .collect())
    }

    /// Write `table` to `path`: header first, then every row as the store returns it.
    pub async fn export_table(
        &self,
        session: &mut dyn StoreSession,
        table: &str,
        path: &Path,
    ) -> MigrationResult<TableExportReport> {
        let cursor = session.read_table(table).await?;
        let mut writer = CsvTableWriter::create(path, &cursor.columns, self.encoding)?;

        let mut rows = cursor.rows;
        while let Some(row) = rows.next().await {
            writer.write_row(&row?)?;
        }
        let stats = writer.finish()?;

        Ok(TableExportReport {
            table: table.to_string(),
            path: path.to_path_buf(),
            stats,
        })
    }

    /// Export every selected table into `dir` as `<table>.csv`.
    ///
    /// A table that fails is logged, its partial file removed, and the export continues.
    pub async fn export_tables(&self, dir: &Path) -> MigrationResult<ExportSummary> {
        std::fs::create_dir_all(dir)?;
        let tables = self.target_tables().await?;
        log::info!("Exporting {} table(s) to {}", tables.len(), dir.display());

        let mut summary = ExportSummary::new(dir);
        for table in tables {
            let path = dir.join(format!("{}.csv", table));
            log::info!("Exporting {}...", table);

            match self.export_one(&table, &path).await {
                Ok(report) => {
                    log::info!(
                        "{}: {} row(s), {} byte(s)",
                        table,
                        report.stats.rows_written,
                        report.stats.bytes_written
                    );
                    summary.exported.push(report);
                }
                Err(error) => {
                    log::warn!("Error exporting {}: {}", table, error);
                    if path.exists() {
                        if let Err(e) = std::fs::remove_file(&path) {
                            log::warn!("Could not remove partial file {}: {}", path.display(), e);
                        }
                    }
                    summary.failed.push((table, error));
                }
            }
        }

        log::info!(
            "Export finished: {} table(s), {} row(s), {} failed",
            summary.exported.len(),
            summary.rows_written(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Export into `<folder>/<prefix>_<yyMMddHHmmss>/`, zip that folder next to it and
    /// remove the staging copy.
    pub async fn run_backup(&self, folder: &Path, prefix: &str) -> MigrationResult<BackupArchive> {
        let name = backup_name(prefix, Local::now().naive_local());
        let staging = folder.join(&name);
        let archive = folder.join(format!("{}.zip", name));
        if staging.exists() || archive.exists() {
            return Err(MigrationError::Archive(format!(
                "backup {} already exists in {}",
                name,
                folder.display()
            )));
        }

        let summary = self.export_tables(&staging).await?;

        create_zip_from_dir(&staging, &archive)?;
        std::fs::remove_dir_all(&staging)?;

        let sha256 = sha256_file(&archive)?;
        let size_bytes = std::fs::metadata(&archive)?.len();
        log::info!("Backup written to {} (sha256 {})", archive.display(), sha256);

        Ok(BackupArchive {
            path: archive,
            sha256,
            size_bytes,
            summary,
        })
    }

    /// Every distinct `table:column` holding a text value that matches `pattern`.
    pub async fn scan_text_cells(&self, pattern: &Regex) -> MigrationResult<Vec<CellMatch>> {
        let mut found = Vec::new();
        for table in self.target_tables().await? {
            match self.scan_table(&table, pattern).await {
                Ok(columns) => {
                    for column in columns {
                        let hit = CellMatch {
                            table: table.clone(),
                            column,
                        };
                        log::info!("{}", hit);
                        found.push(hit);
                    }
                }
                Err(error) => log::warn!("Error scanning {}: {}", table, error),
            }
        }
        Ok(found)
    }

    async fn export_one(&self, table: &str, path: &Path) -> MigrationResult<TableExportReport> {
        let mut session = self.store.open_session().await?;
        self.export_table(session.as_mut(), table, path).await
    }

    async fn scan_table(&self, table: &str, pattern: &Regex) -> MigrationResult<Vec<String>> {
        let mut session = self.store.open_session().await?;
        let cursor = session.read_table(table).await?;

        let mut matched = vec![false; cursor.columns.len()];
        let mut rows = cursor.rows;
        while let Some(row) = rows.next().await {
            for (index, value) in row?.iter().enumerate() {
                if let (Some(seen), ScalarValue::Text(text)) = (matched.get_mut(index), value) {
                    if !*seen && pattern.is_match(text) {
                        *seen = true;
                    }
                }
            }
            if matched.iter().all(|&seen| seen) {
                break;
            }
        }

        Ok(cursor
            .columns
            .into_iter()
            .zip(matched)
            .filter_map(|(column, seen)| seen.then_some(column))
            .collect())
    }
}

fn backup_name(prefix: &str, at: chrono::NaiveDateTime) -> String {
    format!("{}_{}", prefix, at.format(BACKUP_STAMP_FORMAT))
}

/// Where a backup run writes: the configured folder, or the working directory.
pub fn backup_folder(configured: Option<&str>) -> PathBuf {
    match configured.map(str::trim) {
        Some(folder) if !folder.is_empty() => PathBuf::from(folder),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_backup_name_uses_short_timestamp() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(7, 5, 1).unwrap();
        assert_eq!(backup_name("shop", at), "shop_240309070501");
    }

    #[test]
    fn test_backup_folder_defaults_to_cwd() {
        assert_eq!(backup_folder(None), PathBuf::from("."));
        assert_eq!(backup_folder(Some("  ")), PathBuf::from("."));
        assert_eq!(backup_folder(Some("/var/backups")), PathBuf::from("/var/backups"));
    }
}
