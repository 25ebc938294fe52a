use csv::ByteRecord;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::domains::schema::name_key;
use crate::errors::{MigrationError, MigrationResult};

use super::encoding::TextEncoding;
use super::types::RowRecord;

/// Lazy, non-restartable sequence of `RowRecord`s read from an encoded CSV source.
///
/// The header is read and validated on construction, before any data row. The underlying
/// reader is dropped as soon as the input is exhausted or fails, or when this value is dropped.
pub struct CsvRowReader<R: Read = File> {
    reader: Option<csv::Reader<R>>,
    header: Arc<[String]>,
    encoding: TextEncoding,
    source: String,
    record: ByteRecord,
}

impl CsvRowReader<File> {
    pub fn open(path: &Path, encoding: TextEncoding) -> MigrationResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(path.display().to_string(), file, encoding)
    }
}

impl<R: Read> CsvRowReader<R> {
    pub fn from_reader(source: impl Into<String>, input: R, encoding: TextEncoding) -> MigrationResult<Self> {
        let source = source.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut record = ByteRecord::new();
        let has_header = reader
            .read_byte_record(&mut record)
            .map_err(|e| csv_error(&source, e))?;
        if !has_header {
            return Err(MigrationError::malformed(format!("{}: missing header", source)));
        }

        let header = decode_header(&record, encoding, &source)?;
        log::debug!("{}: header [{}]", source, header.join(", "));

        Ok(Self {
            reader: Some(reader),
            header: header.into(),
            encoding,
            source,
            record,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn release(&mut self) {
        self.reader = None;
    }

    fn decode_record(&self) -> MigrationResult<RowRecord> {
        let line = self.record.position().map(|p| p.line()).unwrap_or_default();
        if self.record.len() != self.header.len() {
            return Err(MigrationError::malformed(format!(
                "{} line {}: expected {} fields, found {}",
                self.source,
                line,
                self.header.len(),
                self.record.len()
            )));
        }

        let values = self
            .record
            .iter()
            .map(|field| self.encoding.decode(field).map(|text| text.into_owned()))
            .collect::<MigrationResult<Vec<_>>>()
            .map_err(|e| match e {
                MigrationError::Encoding { encoding, detail } => MigrationError::Encoding {
                    encoding,
                    detail: format!("{} line {}: {}", self.source, line, detail),
                },
                other => other,
            })?;

        RowRecord::new(Arc::clone(&self.header), values)
    }
}

impl<R: Read> Iterator for CsvRowReader<R> {
    type Item = MigrationResult<RowRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match reader.read_byte_record(&mut self.record) {
            Ok(true) => Some(self.decode_record()),
            Ok(false) => {
                self.release();
                None
            }
            Err(e) => {
                let fatal = e.is_io_error();
                let error = csv_error(&self.source, e);
                if fatal {
                    self.release();
                }
                Some(Err(error))
            }
        }
    }
}

fn decode_header(record: &ByteRecord, encoding: TextEncoding, source: &str) -> MigrationResult<Vec<String>> {
    let mut names = Vec::with_capacity(record.len());
    let mut seen = HashSet::with_capacity(record.len());

    for (idx, field) in record.iter().enumerate() {
        let field = if idx == 0 { encoding.strip_bom(field) } else { field };
        let name = encoding.decode(field)?.into_owned();

        if name.trim().is_empty() {
            return Err(MigrationError::malformed(format!(
                "{}: header column {} has no name",
                source,
                idx + 1
            )));
        }
        if !seen.insert(name_key(&name)) {
            return Err(MigrationError::malformed(format!(
                "{}: duplicate header column '{}'",
                source, name
            )));
        }
        names.push(name);
    }

    Ok(names)
}

fn csv_error(source: &str, error: csv::Error) -> MigrationError {
    match error.into_kind() {
        csv::ErrorKind::Io(io) => MigrationError::Io(io),
        other => MigrationError::malformed(format!("{}: {:?}", source, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(text: &str) -> MigrationResult<CsvRowReader<Cursor<Vec<u8>>>> {
        CsvRowReader::from_reader("test.csv", Cursor::new(text.as_bytes().to_vec()), TextEncoding::default())
    }

    /// Counts how many bytes the csv parser pulled from the source.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        consumed: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.consumed.fetch_add(n, std::sync::atomic::Ordering::SeqCst);
            Ok(n)
        }
    }

    #[test]
    fn test_reads_header_then_rows() {
        let rows: Vec<_> = reader("id,name\n1,\"a, b\"\n2,\n")
            .unwrap()
            .collect::<MigrationResult<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].header(), &["id".to_string(), "name".to_string()]);
        assert_eq!(rows[0].get("NAME"), Some("a, b"));
        assert_eq!(rows[1].get("name"), Some(""));
    }

    #[test]
    fn test_duplicate_header_fails_before_rows() {
        let consumed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut text = String::from("name,name,amt\n");
        for i in 0..20_000 {
            text.push_str(&format!("n{},n{},{}\n", i, i, i));
        }
        let source = CountingReader {
            inner: Cursor::new(text.clone().into_bytes()),
            consumed: Arc::clone(&consumed),
        };

        let err = CsvRowReader::from_reader("dup.csv", source, TextEncoding::default())
            .err()
            .expect("duplicate header must fail");
        assert!(matches!(err, MigrationError::MalformedCsv(ref msg) if msg.contains("duplicate")));
        // only the parser's first buffer fill was read, not the data rows
        assert!(consumed.load(std::sync::atomic::Ordering::SeqCst) < text.len());
    }

    #[test]
    fn test_duplicate_header_is_case_insensitive() {
        assert!(matches!(reader("Id,ID\n1,2\n"), Err(MigrationError::MalformedCsv(_))));
    }

    #[test]
    fn test_missing_header_fails() {
        assert!(matches!(reader(""), Err(MigrationError::MalformedCsv(ref msg)) if msg.contains("missing header")));
        assert!(matches!(reader("id,\n1,2\n"), Err(MigrationError::MalformedCsv(_))));
    }

    #[test]
    fn test_short_row_is_reported_and_reading_continues() {
        let results: Vec<_> = reader("a,b\n1,2\n3\n4,5\n").unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(MigrationError::MalformedCsv(ref msg)) if msg.contains("expected 2 fields")));
        assert_eq!(results[2].as_ref().unwrap().get("a"), Some("4"));
    }

    #[test]
    fn test_bom_is_removed_from_first_header() {
        let rows: Vec<_> = reader("\u{feff}id,v\n1,x\n").unwrap().collect::<MigrationResult<_>>().unwrap();
        assert_eq!(rows[0].get("id"), Some("1"));
    }

    #[test]
    fn test_gbk_input_is_decoded() {
        let gbk = TextEncoding::for_label("gbk").unwrap();
        let bytes = gbk.encode("名称,数量\n苹果,3\n").unwrap().into_owned();
        let rows: Vec<_> = CsvRowReader::from_reader("gbk.csv", Cursor::new(bytes), gbk)
            .unwrap()
            .collect::<MigrationResult<_>>()
            .unwrap();
        assert_eq!(rows[0].get("名称"), Some("苹果"));
    }

    #[test]
    fn test_undecodable_bytes_fail_the_row() {
        let mut bytes = b"id,v\n1,".to_vec();
        bytes.extend_from_slice(b"\xFF\xFE");
        bytes.extend_from_slice(b"\n2,ok\n");
        let results: Vec<_> = CsvRowReader::from_reader("bad.csv", Cursor::new(bytes), TextEncoding::default())
            .unwrap()
            .collect();
        assert!(matches!(results[0], Err(MigrationError::Encoding { .. })));
        assert!(results[1].is_ok());
    }
}
