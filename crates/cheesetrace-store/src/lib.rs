//! SQLite store for generated traceability data.
//!
//! Owns the schema files and is the only place tables get created. Also
//! provides read-side helpers used after a run: introspection, row
//! counts, the traceability view and CSV export.

pub mod connection;
pub mod counts;
pub mod error;
pub mod export;
pub mod introspect;
pub mod loader;
pub mod views;

pub use connection::{configure, open_in_memory, open_store, reset_store};
pub use counts::{TableCounts, missing_tables, quote_ident, require_tables, table_counts, table_names};
pub use error::{StoreError, StoreResult};
pub use export::{ExportedTable, export_tables};
pub use introspect::introspect_store;
pub use loader::{
    LoadReport, REQUIRED_FILES, SchemaFile, SchemaPhase, SchemaSource, apply_indexes, load_schema,
};
pub use views::{LotTraceabilityRow, lot_traceability};

pub use rusqlite::Connection;
