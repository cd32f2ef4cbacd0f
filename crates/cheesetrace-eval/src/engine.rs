use std::collections::BTreeSet;
use std::time::Instant;

use rusqlite::Connection;
use tracing::{info, warn};

use cheesetrace_core::tables::{all_table_names, lot_owned_tables};
use cheesetrace_store::{introspect_store, require_tables, table_counts};

use crate::checks::{
    CHRONOLOGY_RULES, CheckOutcome, RANGE_RULES, chronology, foreign_keys, lot_coverage,
    lot_numbers, lots_covered, value_ranges,
};
use crate::errors::EvalError;
use crate::metrics::{
    CheckSummary, METRICS_VERSION, MetricsReport, PerformanceMetrics, TableMetrics, WarningItem,
};
use crate::model::{VerificationResult, VerifyOptions, Violation};
use crate::report::render_report;

/// Verifies a generated store.
#[derive(Debug, Clone)]
pub struct Verifier {
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Runs every check against `conn`. `database` only labels the report.
    pub fn run(
        &self,
        conn: &Connection,
        database: Option<String>,
    ) -> Result<VerificationResult, EvalError> {
        let total_start = Instant::now();
        let required: Vec<&str> = all_table_names().collect();
        require_tables(conn, &required)?;

        let schema = introspect_store(conn, database.clone())?;
        let introspect_ms = total_start.elapsed().as_millis();
        let validate_start = Instant::now();

        let mut checks = CheckSummary::default();
        let mut violations = Vec::new();
        let mut absorb = |outcome: CheckOutcome| {
            violations.extend(outcome.violations);
            outcome.stats
        };
        checks.lot_numbers = absorb(lot_numbers(conn, &self.options.lot_prefix)?);
        checks.foreign_keys = absorb(foreign_keys(conn, &schema)?);
        checks.coverage = absorb(lot_coverage(conn)?);
        checks.ranges = absorb(value_ranges(conn, RANGE_RULES)?);
        checks.chronology = absorb(chronology(conn, CHRONOLOGY_RULES)?);
        sort_violations(&mut violations);

        let counts = table_counts(conn)?;
        let owned: BTreeSet<&str> = lot_owned_tables().map(|spec| spec.name).collect();
        let mut tables = Vec::new();
        for (table, rows) in counts.iter() {
            let lots_covered = if owned.contains(table) {
                Some(lots_covered(conn, table)?)
            } else {
                None
            };
            tables.push(TableMetrics {
                table: table.to_string(),
                rows_found: rows,
                lots_covered,
            });
        }

        let (lots, fixture_lots): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_fixture), 0) FROM lot_master",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut warnings: Vec<WarningItem> = counts
            .empty_tables()
            .into_iter()
            .map(|table| WarningItem {
                code: "empty_table".to_string(),
                path: table.to_string(),
                message: "table has no rows".to_string(),
                hint: None,
            })
            .collect();
        if fixture_lots > 0 {
            warnings.push(WarningItem {
                code: "fixture_lots".to_string(),
                path: "lot_master".to_string(),
                message: format!("{fixture_lots} lot(s) were synthesized by dependent stages"),
                hint: Some("filter on is_fixture = 0 for production-only queries".to_string()),
            });
        }
        warnings.sort_by(|a, b| (&a.path, &a.code).cmp(&(&b.path, &b.code)));

        let metrics = MetricsReport {
            metrics_version: METRICS_VERSION.to_string(),
            schema_version: schema.schema_version.clone(),
            database,
            lots: lots as u64,
            fixture_lots: fixture_lots as u64,
            tables,
            checks,
            warnings,
            performance: PerformanceMetrics {
                introspect_ms,
                validate_ms: validate_start.elapsed().as_millis(),
                total_ms: total_start.elapsed().as_millis(),
            },
        };
        let report = render_report(&metrics, &violations, self.options.max_examples);

        let mut result = VerificationResult {
            metrics,
            report,
            violations,
            metrics_path: None,
            report_path: None,
            violations_path: None,
        };
        if let Some(out_dir) = &self.options.out_dir {
            std::fs::create_dir_all(out_dir)?;
            let metrics_path = out_dir.join("metrics.json");
            std::fs::write(&metrics_path, serde_json::to_vec_pretty(&result.metrics)?)?;
            let report_path = out_dir.join("report.md");
            std::fs::write(&report_path, result.report.as_bytes())?;
            if self.options.write_violations {
                let path = out_dir.join("violations.json");
                std::fs::write(&path, serde_json::to_vec_pretty(&result.violations)?)?;
                result.violations_path = Some(path);
            }
            result.metrics_path = Some(metrics_path);
            result.report_path = Some(report_path);
        }

        let total = result.violations.len() as u64;
        if total > 0 {
            warn!(violations = total, "verification found violations");
        } else {
            info!(lots, "verification passed");
        }
        if self.options.strict && total > 0 {
            return Err(EvalError::Violations(total));
        }
        Ok(result)
    }
}

fn sort_violations(violations: &mut [Violation]) {
    violations.sort_by(|a, b| {
        (&a.path, &a.code, a.row_index.unwrap_or_default()).cmp(&(
            &b.path,
            &b.code,
            b.row_index.unwrap_or_default(),
        ))
    });
}
