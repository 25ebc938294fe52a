pub mod coercion;
pub mod csv;
pub mod export;
pub mod import;
pub mod schema;
