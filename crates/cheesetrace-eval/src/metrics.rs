use serde::{Deserialize, Serialize};

/// Metrics contract version for store verification.
pub const METRICS_VERSION: &str = "0.1";

/// Machine-readable metrics for a verification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    pub metrics_version: String,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub lots: u64,
    pub fixture_lots: u64,
    pub tables: Vec<TableMetrics>,
    pub checks: CheckSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<WarningItem>,
    pub performance: PerformanceMetrics,
}

/// Per-table row counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetrics {
    pub table: String,
    pub rows_found: u64,
    /// Distinct lots referenced, for tables that hang off a lot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lots_covered: Option<u64>,
}

/// Outcome of each check family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSummary {
    pub lot_numbers: CheckStats,
    pub foreign_keys: CheckStats,
    pub coverage: CheckStats,
    pub ranges: CheckStats,
    pub chronology: CheckStats,
}

impl CheckSummary {
    pub fn rows(&self) -> [(&'static str, &CheckStats); 5] {
        [
            ("lot_numbers", &self.lot_numbers),
            ("foreign_keys", &self.foreign_keys),
            ("coverage", &self.coverage),
            ("ranges", &self.ranges),
            ("chronology", &self.chronology),
        ]
    }

    pub fn total_violations(&self) -> u64 {
        self.rows().iter().map(|(_, stats)| stats.violations).sum()
    }
}

/// Generic check counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStats {
    pub checked: u64,
    pub violations: u64,
}

/// Structured warning entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningItem {
    pub code: String,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Timings for the verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub introspect_ms: u128,
    pub validate_ms: u128,
    pub total_ms: u128,
}
