pub mod service;
pub mod types;

pub use service::{coerce, coerce_row, coerce_rows, parse_temporal, ColumnPlan};
pub use types::{TypedRow, TypedValue, TEMPORAL_FORMAT};
