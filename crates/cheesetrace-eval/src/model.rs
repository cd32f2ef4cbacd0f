use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cheesetrace_core::DEFAULT_LOT_PREFIX;

use crate::metrics::MetricsReport;

/// Options for store verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Prefix every lot number is expected to carry.
    pub lot_prefix: String,
    /// Fail on violations.
    pub strict: bool,
    /// Limit the number of examples emitted in the report.
    pub max_examples: usize,
    /// Emit violations.json with the full list of violations.
    pub write_violations: bool,
    /// Directory for metrics.json and report.md; nothing is written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            lot_prefix: DEFAULT_LOT_PREFIX.to_string(),
            strict: false,
            max_examples: 20,
            write_violations: false,
            out_dir: None,
        }
    }
}

/// Structured violation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub path: String,
    pub message: String,
    /// SQLite rowid of the offending row, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl Violation {
    pub fn new(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
            row_index: None,
            example: None,
        }
    }

    pub fn at_row(mut self, row: i64) -> Self {
        self.row_index = u64::try_from(row).ok();
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }
}

/// Result of a verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub metrics: MetricsReport,
    pub report: String,
    pub violations: Vec<Violation>,
    pub metrics_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub violations_path: Option<PathBuf>,
}

impl VerificationResult {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations carrying the given code.
    pub fn by_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.code == code)
    }
}
