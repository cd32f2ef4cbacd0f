use std::path::Path;
use std::time::Instant;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use cheesetrace_core::{DateRange, Subsystem};
use cheesetrace_store::{SchemaSource, load_schema, reset_store, table_counts};

use crate::errors::GenerationError;
use crate::model::{GenerateOptions, GenerationReport, RunState};
use crate::stages::{Stage, check_tables, default_stages, execute_stage};

/// Drives a generation run: reset, schema, then every stage for every date.
pub struct Orchestrator {
    options: GenerateOptions,
    stages: Vec<Box<dyn Stage>>,
    run_id: Option<String>,
}

impl Orchestrator {
    pub fn new(options: GenerateOptions) -> Self {
        Self::with_stages(options, default_stages())
    }

    pub fn with_stages(options: GenerateOptions, stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            options,
            stages,
            run_id: None,
        }
    }

    /// Uses `run_id` in the report instead of a fresh random one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Deletes the store at `path`, rebuilds it and generates `range`.
    /// The connection is closed before returning.
    pub fn run(
        &self,
        path: &Path,
        range: DateRange,
        source: &SchemaSource,
    ) -> Result<GenerationReport, GenerationError> {
        let conn = reset_store(path)?;
        let report = self.run_on(&conn, range, source)?;
        conn.close().map_err(|(_, err)| GenerationError::Sqlite(err))?;
        info!(path = %path.display(), "store closed");
        Ok(report)
    }

    /// Same as [`Orchestrator::run`] on a caller-provided empty store.
    pub fn run_on(
        &self,
        conn: &Connection,
        range: DateRange,
        source: &SchemaSource,
    ) -> Result<GenerationReport, GenerationError> {
        self.options.validate()?;
        let start = Instant::now();
        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut report =
            GenerationReport::new(run_id.clone(), self.options.seed, range.start(), range.end());
        info!(
            run_id = %run_id,
            seed = self.options.seed,
            start = %range.start(),
            end = %range.end(),
            days = range.days(),
            stages = self.stages.len(),
            "generation started"
        );

        let schema = load_schema(conn, source)?;
        for stage in &self.stages {
            check_tables(conn, stage.as_ref())?;
        }
        transition(&mut report, RunState::SchemaLoaded);
        debug!(files = schema.files_applied.len(), "schema ready");

        for ctx in range.contexts() {
            transition(&mut report, RunState::Generating(ctx.date));
            for stage in &self.stages {
                match execute_stage(conn, stage.as_ref(), &self.options, &ctx) {
                    Ok(outcome) => {
                        if let Some(reason) = &outcome.skipped {
                            warn!(stage = stage.id(), date = %ctx.date, reason = %reason, "stage skipped");
                        }
                        debug!(
                            stage = stage.id(),
                            date = %ctx.date,
                            rows = outcome.total_rows(),
                            "stage completed"
                        );
                        report.record_outcome(stage.id(), &outcome);
                    }
                    Err(err) => {
                        warn!(stage = stage.id(), date = %ctx.date, error = %err, "stage failed");
                        report.record_failure(stage.id(), ctx.date, err.to_string());
                    }
                }
            }
            report.lots_processed = ctx.lot_count;
            transition(&mut report, RunState::Generated(ctx.date));
            info!(date = %ctx.date, lot_count = ctx.lot_count, "date generated");
        }

        let counts = table_counts(conn)?;
        for subsystem in Subsystem::ALL {
            let table = subsystem.primary_table();
            info!(table, rows = counts.get(table), "final count");
        }
        let empty = counts.empty_tables();
        if !empty.is_empty() {
            warn!(tables = %empty.join(", "), "tables left empty");
        }
        report.table_counts = counts.0;
        report.duration_ms = start.elapsed().as_millis() as u64;
        transition(&mut report, RunState::Done);
        info!(
            run_id = %run_id,
            lots = report.lots_processed,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "generation completed"
        );
        Ok(report)
    }
}

fn transition(report: &mut GenerationReport, next: RunState) {
    debug!(event = "state_changed", from = ?report.state, to = ?next);
    report.state = next;
}
