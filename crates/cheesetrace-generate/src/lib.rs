//! Deterministic generation of cheese traceability data (lots and every
//! stage that hangs off them) into a SQLite store.
//!
//! The [`Orchestrator`] resets the store, loads the schema, then walks a
//! date range running each [`Stage`] once per date. Stages only talk to
//! each other through the store.

pub mod engine;
pub mod errors;
pub mod lots;
pub mod model;
pub mod stages;
pub mod values;

pub use engine::Orchestrator;
pub use errors::GenerationError;
pub use lots::{LotResolution, LotRow, find_lot, resolve_lot};
pub use model::{
    GenerateOptions, GenerationReport, MissingParentPolicy, RunState, StageFailure, StageReport,
};
pub use stages::{Stage, StageEnv, StageOutcome, default_stages, run_stage};
pub use values::{ValueSource, hash_seed};
