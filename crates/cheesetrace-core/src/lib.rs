//! Core contracts and helpers for cheesetrace.
//!
//! This crate defines the lot number format, the per-date generation
//! context, the table catalog, and the store schema snapshot types shared
//! by the store, generator, and verification crates.

pub mod context;
pub mod error;
pub mod format;
pub mod graph;
pub mod lot;
pub mod schema;
pub mod tables;

pub use context::{DateRange, GenerationContext};
pub use error::{Error, Result};
pub use graph::{FkGraphReport, FkGraphSummary, build_fk_graph_report};
pub use lot::{DEFAULT_LOT_PREFIX, LotNumber, LotStatus};
pub use schema::{Column, ForeignKey, Index, StoreSchema, Table, TableKind};
pub use tables::{Subsystem, TableSpec};

/// Current contract version for `schema.json` artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
