//! Post-run integrity checks for a generated store.

pub mod checks;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod report;
pub mod schema_metrics;

pub use engine::Verifier;
pub use errors::EvalError;
pub use metrics::{CheckStats, CheckSummary, METRICS_VERSION, MetricsReport, TableMetrics};
pub use model::{VerificationResult, VerifyOptions, Violation};
pub use report::render_report;
pub use schema_metrics::{
    LotLinks, SchemaCounts, SchemaMetrics, SubsystemTables, collect_schema_metrics,
};
