pub mod archive;
pub mod filter;
pub mod service;
pub mod types;

pub use archive::{create_zip_from_dir, sha256_file};
pub use filter::{AllTables, NamedTables, TableFilter};
pub use service::{backup_folder, ExportOrchestrator, BACKUP_STAMP_FORMAT};
pub use types::{BackupArchive, CellMatch, ExportSummary, TableExportReport};
