use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cheesetrace_core::DEFAULT_LOT_PREFIX;

use crate::errors::GenerationError;
use crate::stages::StageOutcome;

/// What a dependent stage does when the day's lot does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingParentPolicy {
    /// Insert a placeholder lot flagged `is_fixture = 1` and continue.
    #[default]
    Synthesize,
    /// Produce nothing for that date and report the stage as skipped.
    Skip,
}

impl MissingParentPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingParentPolicy::Synthesize => "synthesize",
            MissingParentPolicy::Skip => "skip",
        }
    }
}

impl fmt::Display for MissingParentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingParentPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synthesize" => Ok(MissingParentPolicy::Synthesize),
            "skip" => Ok(MissingParentPolicy::Skip),
            other => Err(format!(
                "unknown missing-parent policy '{other}' (expected synthesize or skip)"
            )),
        }
    }
}

/// Options for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Root seed; every stage and date derives its own stream from it.
    pub seed: u64,
    pub lot_prefix: String,
    pub product_code: String,
    pub facility_code: String,
    /// Chance that a new lot gets a mixed-batch parent link.
    pub genealogy_probability: f64,
    pub missing_parent_policy: MissingParentPolicy,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            lot_prefix: DEFAULT_LOT_PREFIX.to_string(),
            product_code: "TALEGGIO".to_string(),
            facility_code: "FAC001".to_string(),
            genealogy_probability: 0.3,
            missing_parent_policy: MissingParentPolicy::Synthesize,
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(0.0..=1.0).contains(&self.genealogy_probability) {
            return Err(GenerationError::InvalidOptions(format!(
                "genealogy_probability must be within [0, 1], got {}",
                self.genealogy_probability
            )));
        }
        if self.product_code.trim().is_empty() || self.facility_code.trim().is_empty() {
            return Err(GenerationError::InvalidOptions(
                "product_code and facility_code must not be empty".to_string(),
            ));
        }
        // Surfaces a bad prefix before any date is generated.
        cheesetrace_core::LotNumber::new(&self.lot_prefix, NaiveDate::MIN)?;
        Ok(())
    }
}

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "date", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    SchemaLoaded,
    Generating(NaiveDate),
    Generated(NaiveDate),
    Done,
}

/// Per-stage totals across all dates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageReport {
    pub invocations: u64,
    pub rows_inserted: BTreeMap<String, u64>,
    /// Dates the stage produced nothing because the lot was missing.
    pub skipped: u64,
    /// Dates the stage had to synthesize a placeholder lot.
    pub fixture_lots: u64,
    pub failures: u64,
}

/// A stage error caught by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageFailure {
    pub date: NaiveDate,
    pub stage: String,
    pub message: String,
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub seed: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub lots_processed: u32,
    pub state: RunState,
    pub stages: BTreeMap<String, StageReport>,
    pub failures: Vec<StageFailure>,
    pub table_counts: BTreeMap<String, u64>,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(run_id: String, seed: u64, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            run_id,
            seed,
            start_date,
            end_date,
            lots_processed: 0,
            state: RunState::Pending,
            stages: BTreeMap::new(),
            failures: Vec::new(),
            table_counts: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    pub fn record_outcome(&mut self, stage: &str, outcome: &StageOutcome) {
        let entry = self.stages.entry(stage.to_string()).or_default();
        entry.invocations += 1;
        for (table, rows) in &outcome.inserted {
            *entry.rows_inserted.entry((*table).to_string()).or_insert(0) += rows;
        }
        if outcome.skipped.is_some() {
            entry.skipped += 1;
        }
        if outcome.fixture_lot {
            entry.fixture_lots += 1;
        }
    }

    pub fn record_failure(&mut self, stage: &str, date: NaiveDate, message: String) {
        let entry = self.stages.entry(stage.to_string()).or_default();
        entry.invocations += 1;
        entry.failures += 1;
        self.failures.push(StageFailure {
            date,
            stage: stage.to_string(),
            message,
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Rows inserted by one stage into one table over the whole run.
    pub fn rows_inserted(&self, stage: &str, table: &str) -> u64 {
        self.stages
            .get(stage)
            .and_then(|report| report.rows_inserted.get(table))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Skip".parse::<MissingParentPolicy>(), Ok(MissingParentPolicy::Skip));
        assert!("retry".parse::<MissingParentPolicy>().is_err());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let options = GenerateOptions {
            genealogy_probability: 1.5,
            ..GenerateOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(GenerateOptions::default().validate().is_ok());
    }

    #[test]
    fn run_state_serializes_with_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).expect("date");
        let json = serde_json::to_value(RunState::Generated(date)).expect("serialize");
        assert_eq!(json["state"], "generated");
        assert_eq!(json["date"], "2024-01-02");
    }
}
