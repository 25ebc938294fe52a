pub mod cancel;
pub mod partition;
pub mod service;
pub mod types;

pub use cancel::CancelSignal;
pub use partition::{batches, Batches};
pub use service::{BatchLoader, ImportRunner, DEFAULT_BATCH_SIZE};
pub use types::{BatchOutcome, ImportSummary, TableImportResult, TableLoadReport, TableStatus};
