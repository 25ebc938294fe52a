pub mod encoding;
pub mod reader;
pub mod types;
pub mod writer;

pub use encoding::TextEncoding;
pub use reader::CsvRowReader;
pub use types::{RowRecord, WriteStats};
pub use writer::CsvTableWriter;
