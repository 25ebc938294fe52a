use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::database::ScalarValue;
use crate::errors::{MigrationError, MigrationResult};

use super::encoding::TextEncoding;
use super::types::WriteStats;

/// Streaming CSV writer: one header record, then one record per row in column order.
///
/// Each record is rendered as UTF-8 first, then re-encoded into the target encoding as a
/// whole, so multi-byte sequences are never split. The output is a `BufWriter` by default,
/// which flushes on drop when an error cuts the export short.
pub struct CsvTableWriter<W: Write = BufWriter<File>> {
    inner: W,
    record: csv::Writer<Vec<u8>>,
    encoding: TextEncoding,
    columns: usize,
    stats: WriteStats,
}

impl CsvTableWriter<BufWriter<File>> {
    pub fn create(path: &Path, columns: &[String], encoding: TextEncoding) -> MigrationResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::with_capacity(1024 * 1024, file), columns, encoding)
    }
}

impl<W: Write> CsvTableWriter<W> {
    pub fn new(inner: W, columns: &[String], encoding: TextEncoding) -> MigrationResult<Self> {
        let mut writer = Self {
            inner,
            record: csv::WriterBuilder::new().from_writer(Vec::with_capacity(4096)),
            encoding,
            columns: columns.len(),
            stats: WriteStats::default(),
        };
        writer.write_fields(columns.iter().map(String::as_str))?;
        Ok(writer)
    }

    pub fn write_row(&mut self, values: &[ScalarValue]) -> MigrationResult<()> {
        if values.len() != self.columns {
            return Err(MigrationError::malformed(format!(
                "row has {} values but the header has {} columns",
                values.len(),
                self.columns
            )));
        }
        let fields: Vec<_> = values.iter().map(ScalarValue::to_field).collect();
        self.write_fields(fields.iter().map(|f| &**f))?;
        self.stats.rows_written += 1;
        Ok(())
    }

    /// Write every row of `rows`, stopping at the first failure.
    pub fn write_rows<I>(&mut self, rows: I) -> MigrationResult<WriteStats>
    where
        I: IntoIterator<Item = MigrationResult<Vec<ScalarValue>>>,
    {
        for row in rows {
            self.write_row(&row?)?;
        }
        Ok(self.stats)
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Flush everything and hand back the final counters.
    pub fn finish(mut self) -> MigrationResult<WriteStats> {
        self.inner.flush()?;
        Ok(self.stats)
    }

    fn write_fields<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> MigrationResult<()> {
        self.record
            .write_record(fields)
            .and_then(|_| self.record.flush().map_err(csv::Error::from))
            .map_err(|e| MigrationError::malformed(format!("failed to render record: {}", e)))?;

        let rendered = std::mem::replace(
            &mut self.record,
            csv::WriterBuilder::new().from_writer(Vec::with_capacity(4096)),
        )
        .into_inner()
        .map_err(|e| MigrationError::malformed(format!("failed to render record: {}", e.error())))?;
        let text = String::from_utf8(rendered)
            .map_err(|e| MigrationError::encoding("UTF-8", e.to_string()))?;
        let bytes = self.encoding.encode(&text)?;

        self.inner.write_all(&bytes)?;
        self.stats.bytes_written += bytes.len() as u64;
        Ok(())
    }
}
