use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::database::{InsertOutcome, Store, StoreSession};
use crate::domains::coercion::{coerce_rows, ColumnPlan, TypedRow};
use crate::domains::csv::{CsvRowReader, RowRecord, TextEncoding};
use crate::domains::schema::{SchemaIntrospector, TableSchema};
use crate::errors::{MigrationError, MigrationResult};

use super::cancel::CancelSignal;
use super::partition::batches;
use super::types::{BatchOutcome, ImportSummary, TableImportResult, TableLoadReport, TableStatus};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Truncates a table and reloads it in independently committed batches.
pub struct BatchLoader {
    introspector: SchemaIntrospector,
    batch_size: NonZeroUsize,
    cancel: CancelSignal,
}

impl BatchLoader {
    pub fn new(introspector: SchemaIntrospector, batch_size: NonZeroUsize) -> Self {
        Self {
            introspector,
            batch_size,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Load `rows` into `table`, replacing whatever it held.
    ///
    /// Table-level failures (unknown table, truncate failure) come back as `Err`. Everything
    /// that goes wrong inside a batch is recorded in the report and the next batch still runs.
    pub async fn load<I>(
        &self,
        session: &mut dyn StoreSession,
        table: &str,
        rows: I,
    ) -> MigrationResult<TableLoadReport>
    where
        I: IntoIterator<Item = MigrationResult<RowRecord>>,
    {
        let schema = self.introspector.fetch_schema(session, table).await?;
        self.load_into(session, &schema, rows).await
    }

    /// Like [`load`](Self::load), but rejects a CSV whose header does not name the table's
    /// columns before the table is truncated.
    pub async fn load_csv<R: Read>(
        &self,
        session: &mut dyn StoreSession,
        table: &str,
        reader: CsvRowReader<R>,
    ) -> MigrationResult<TableLoadReport> {
        let schema = self.introspector.fetch_schema(session, table).await?;
        ColumnPlan::new(reader.header(), &schema)?;
        log::debug!("Header of {} matches {}", reader.source(), table);
        self.load_into(session, &schema, reader).await
    }

    async fn load_into<I>(
        &self,
        session: &mut dyn StoreSession,
        schema: &TableSchema,
        rows: I,
    ) -> MigrationResult<TableLoadReport>
    where
        I: IntoIterator<Item = MigrationResult<RowRecord>>,
    {
        let table = schema.table.as_str();
        let removed = session.truncate(table).await?;
        log::info!("Cleared {} existing row(s) from {}", removed, table);

        let mut report = TableLoadReport::new(table, removed);

        for (index, group) in batches(rows, self.batch_size).enumerate() {
            let batch = index + 1;
            if self.cancel.is_cancelled() {
                log::warn!("Import of {} cancelled before batch {}", table, batch);
                report.cancelled = true;
                break;
            }

            let size = group.len();
            let outcome = match prepare_batch(group, schema) {
                Ok(typed) => self.commit_batch(session, schema, batch, &typed).await,
                Err(error) => BatchOutcome::Failed {
                    batch,
                    rows: size,
                    error,
                },
            };

            let cancelled = match &outcome {
                BatchOutcome::Committed { rows, .. } => {
                    log::info!("{}: batch {} committed {} row(s)", table, batch, rows);
                    false
                }
                BatchOutcome::Failed { error, .. } => {
                    log_batch_failure(table, &outcome);
                    matches!(error, MigrationError::Cancelled)
                }
            };
            report.batches.push(outcome);

            if cancelled {
                report.cancelled = true;
                break;
            }
        }

        log::info!(
            "{}: {} row(s) committed, {} of {} batch(es) failed",
            table,
            report.committed_rows(),
            report.failed_batches().count(),
            report.batches.len()
        );
        Ok(report)
    }

    /// One transaction. A cancel raised before the commit rolls the whole batch back.
    async fn commit_batch(
        &self,
        session: &mut dyn StoreSession,
        schema: &TableSchema,
        batch: usize,
        typed: &[TypedRow],
    ) -> BatchOutcome {
        let error = match session.insert_batch(schema, typed, &self.cancel).await {
            Ok(InsertOutcome::Committed(rows)) => return BatchOutcome::Committed { batch, rows },
            Ok(InsertOutcome::RolledBack) => MigrationError::Cancelled,
            Err(source) => MigrationError::BatchInsertFailure {
                table: schema.table.clone(),
                batch,
                source,
            },
        };
        BatchOutcome::Failed {
            batch,
            rows: typed.len(),
            error,
        }
    }
}

/// Collect a raw group and coerce it; any bad record fails the whole group.
fn prepare_batch(
    group: Vec<MigrationResult<RowRecord>>,
    schema: &TableSchema,
) -> MigrationResult<Vec<TypedRow>> {
    let records = group.into_iter().collect::<MigrationResult<Vec<_>>>()?;
    coerce_rows(&records, schema)
}

fn log_batch_failure(table: &str, outcome: &BatchOutcome) {
    let BatchOutcome::Failed { rows, error, .. } = outcome else {
        return;
    };
    let batch = outcome.batch();
    match error.column() {
        Some(column) => log::warn!(
            "{}: batch {} ({} rows) rolled back, column {}: {}",
            table,
            batch,
            rows,
            column,
            error
        ),
        None => log::warn!("{}: batch {} ({} rows) rolled back: {}", table, batch, rows, error),
    }
}

/// Imports every CSV file of a directory, one table per file.
pub struct ImportRunner {
    store: Arc<dyn Store>,
    loader: BatchLoader,
    encoding: TextEncoding,
}

impl ImportRunner {
    pub fn new(store: Arc<dyn Store>, loader: BatchLoader, encoding: TextEncoding) -> Self {
        Self {
            store,
            loader,
            encoding,
        }
    }

    /// Each `<table>.csv` in `folder` (sorted by name) replaces the contents of `<table>`.
    /// A table that cannot be loaded is reported and the run moves on.
    pub async fn import_directory(&self, folder: &Path) -> MigrationResult<ImportSummary> {
        let files = csv_files(folder)?;
        log::info!("Importing {} CSV file(s) from {}", files.len(), folder.display());

        let mut summary = ImportSummary::default();
        for (table, file) in files {
            if self.loader.cancel_signal().is_cancelled() {
                log::warn!("Import cancelled; {} and later files were skipped", table);
                summary.cancelled = true;
                break;
            }

            log::info!("Importing {} from {}", table, file.display());
            let outcome = match self.import_file(&file, &table).await {
                Ok(report) => {
                    match report.status() {
                        TableStatus::Loaded => log::info!(
                            "{} loaded: {} row(s)",
                            table,
                            report.committed_rows()
                        ),
                        status => log::warn!(
                            "{} finished {:?}: {} row(s) committed, {} batch(es) failed",
                            table,
                            status,
                            report.committed_rows(),
                            report.failed_batches().count()
                        ),
                    }
                    summary.cancelled |= report.cancelled;
                    Ok(report)
                }
                Err(error) if error.is_table_fatal() => {
                    log::warn!("Error importing {}: {}", table, error);
                    Err(error)
                }
                Err(error) => return Err(error),
            };

            summary.tables.push(TableImportResult {
                table,
                file,
                outcome,
            });
            if summary.cancelled {
                break;
            }
        }

        log::info!(
            "Import finished: {} table(s), {} row(s) committed, {} incomplete",
            summary.tables.len(),
            summary.committed_rows(),
            summary.incomplete_tables().count()
        );
        Ok(summary)
    }

    /// Load one file into `table` on a session of its own.
    pub async fn import_file(&self, path: &Path, table: &str) -> MigrationResult<TableLoadReport> {
        let reader = CsvRowReader::open(path, self.encoding)?;
        let mut session = self.store.open_session().await?;
        self.loader.load_csv(session.as_mut(), table, reader).await
    }
}

/// `(table, path)` for every top-level `.csv` file, ordered by file name.
fn csv_files(folder: &Path) -> MigrationResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv || !path.is_file() {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => files.push((stem.to_string(), path.clone())),
            None => log::warn!("Skipping {}: file name is not valid UTF-8", path.display()),
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}
