//! Stage generators, one per subsystem.
//!
//! A stage resolves the day's lot through [`StageEnv::lot`], reads whatever
//! upstream rows it needs from the store, and inserts its own rows through
//! [`StageEnv::insert`]. Catalog rows use `INSERT OR IGNORE` with fixed keys
//! so re-running a stage never duplicates them.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, Params};
use serde::Serialize;
use tracing::debug;

use cheesetrace_core::format::parse_date;
use cheesetrace_core::{GenerationContext, Subsystem};
use cheesetrace_store::{missing_tables, quote_ident};

use crate::errors::GenerationError;
use crate::lots::{LotResolution, LotRow, resolve_lot};
use crate::model::GenerateOptions;
use crate::values::ValueSource;

pub mod aging;
pub mod labeling;
pub mod lot_master;
pub mod manufacturing;
pub mod packaging;
pub mod preprocessing;
pub mod quality;
pub mod raw_materials;
pub mod sensory;
pub mod shipping;
pub mod weighing;

/// One generation stage.
pub trait Stage {
    fn subsystem(&self) -> Subsystem;

    fn id(&self) -> &'static str {
        self.subsystem().id()
    }

    /// Tables owned by other subsystems that this stage reads.
    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master"]
    }

    /// Every table that must exist before the stage can run.
    fn required_tables(&self) -> Vec<&'static str> {
        let mut tables = self.subsystem().table_names();
        for table in self.upstream_tables() {
            if !tables.contains(table) {
                tables.push(table);
            }
        }
        tables
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError>;
}

/// What one stage invocation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageOutcome {
    pub inserted: BTreeMap<&'static str, u64>,
    pub fixture_lot: bool,
    pub skipped: Option<String>,
}

impl StageOutcome {
    pub fn rows(&self, table: &str) -> u64 {
        self.inserted.get(table).copied().unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.inserted.values().sum()
    }
}

/// Everything a stage can touch during one invocation.
pub struct StageEnv<'a> {
    pub conn: &'a Connection,
    pub options: &'a GenerateOptions,
    pub values: ValueSource,
    outcome: StageOutcome,
}

impl<'a> StageEnv<'a> {
    pub fn new(conn: &'a Connection, options: &'a GenerateOptions, values: ValueSource) -> Self {
        Self {
            conn,
            options,
            values,
            outcome: StageOutcome::default(),
        }
    }

    /// Executes one insert and counts the rows it actually wrote.
    pub fn insert<P: Params>(
        &mut self,
        table: &'static str,
        sql: &str,
        params: P,
    ) -> Result<usize, GenerationError> {
        let written = self.conn.prepare_cached(sql)?.execute(params)?;
        self.record(table, written as u64);
        Ok(written)
    }

    pub fn record(&mut self, table: &'static str, rows: u64) {
        if rows > 0 {
            *self.outcome.inserted.entry(table).or_insert(0) += rows;
        }
    }

    /// Resolves the context date's lot according to the missing-parent
    /// policy. `None` means the stage should produce nothing.
    pub fn lot(&mut self, ctx: &GenerationContext) -> Result<Option<LotRow>, GenerationError> {
        match resolve_lot(self.conn, &mut self.values, self.options, ctx)? {
            LotResolution::Existing(lot) => Ok(Some(lot)),
            LotResolution::Synthesized(lot) => {
                self.outcome.fixture_lot = true;
                self.record("lot_master", 1);
                Ok(Some(lot))
            }
            LotResolution::Missing => {
                debug!(date = %ctx.date, "no lot, skipping");
                self.outcome.skipped = Some(format!("no lot for {}", ctx.date_key()));
                Ok(None)
            }
        }
    }

    pub fn into_outcome(self) -> StageOutcome {
        self.outcome
    }
}

/// Stages in generation order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(lot_master::CoreStage),
        Box::new(raw_materials::RawMaterialsStage),
        Box::new(preprocessing::PreprocessingStage),
        Box::new(manufacturing::ManufacturingStage),
        Box::new(aging::AgingStage),
        Box::new(quality::QualityStage),
        Box::new(sensory::SensoryStage),
        Box::new(packaging::PackagingStage),
        Box::new(labeling::LabelingStage),
        Box::new(weighing::WeighingStage),
        Box::new(shipping::ShippingStage),
    ]
}

/// Runs one stage for one date on its own, outside the orchestrator.
///
/// Fails with [`GenerationError::MissingTables`] when the schema has not
/// been loaded.
pub fn run_stage(
    conn: &Connection,
    stage: &dyn Stage,
    options: &GenerateOptions,
    ctx: &GenerationContext,
) -> Result<StageOutcome, GenerationError> {
    check_tables(conn, stage)?;
    execute_stage(conn, stage, options, ctx)
}

pub(crate) fn check_tables(conn: &Connection, stage: &dyn Stage) -> Result<(), GenerationError> {
    let missing = missing_tables(conn, &stage.required_tables())?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GenerationError::MissingTables {
            stage: stage.id().to_string(),
            tables: missing,
        })
    }
}

/// One transaction per invocation; an error rolls back that date's rows
/// for this stage only.
pub(crate) fn execute_stage(
    conn: &Connection,
    stage: &dyn Stage,
    options: &GenerateOptions,
    ctx: &GenerationContext,
) -> Result<StageOutcome, GenerationError> {
    let tx = conn.unchecked_transaction()?;
    let invocation = prior_rows(&tx, stage.subsystem(), ctx)?;
    let values = ValueSource::for_stage(options.seed, stage.id(), ctx, invocation);
    let mut env = StageEnv::new(&tx, options, values);
    stage.populate(&mut env, ctx)?;
    let outcome = env.into_outcome();
    tx.commit()?;
    Ok(outcome)
}

/// Rows the stage's primary table already holds for the date's lots. Any
/// invocation that writes raises it, which keeps re-runs apart while a
/// first run always sees zero. Core and raw materials are keyed by date
/// and insert-or-ignore, so their re-runs replay the first stream.
fn prior_rows(
    conn: &Connection,
    subsystem: Subsystem,
    ctx: &GenerationContext,
) -> Result<u64, GenerationError> {
    if matches!(subsystem, Subsystem::Core | Subsystem::RawMaterials) {
        return Ok(0);
    }
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE lot_uuid IN \
         (SELECT lot_uuid FROM lot_master WHERE lot_date = ?1)",
        quote_ident(subsystem.primary_table())
    );
    let rows: i64 = conn.query_row(&sql, [ctx.date_key()], |row| row.get(0))?;
    Ok(rows as u64)
}

/// `date` at `hour:minute`.
pub fn clock(date: NaiveDate, hour: i64, minute: i64) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::minutes(hour * 60 + minute)
}

/// Adds fractional minutes with second precision.
pub(crate) fn plus_minutes(at: NaiveDateTime, minutes: f64) -> NaiveDateTime {
    at + Duration::seconds((minutes * 60.0).round() as i64)
}

pub(crate) fn plus_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Latest packaging date recorded for a lot, if packaging ran.
pub(crate) fn latest_packaging_date(
    conn: &Connection,
    lot_uuid: &str,
) -> Result<Option<NaiveDate>, GenerationError> {
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(packaging_date) FROM packaging_operations WHERE lot_uuid = ?1",
        [lot_uuid],
        |row| row.get(0),
    )?;
    latest.as_deref().map(parse_date).transpose().map_err(Into::into)
}

/// A lot's packages as `(package_uuid, net_weight_g)`, in serial order.
pub(crate) fn lot_packages(
    conn: &Connection,
    lot_uuid: &str,
) -> Result<Vec<(String, f64)>, GenerationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT package_uuid, net_weight_g FROM individual_packages \
         WHERE lot_uuid = ?1 ORDER BY package_serial",
    )?;
    let packages = stmt
        .query_map([lot_uuid], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(packages)
}

/// Single text column query, collected in order.
pub(crate) fn query_strings<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<String>, GenerationError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

pub(crate) fn operator(values: &mut ValueSource) -> String {
    format!("OP-{}", values.int(101, 120))
}
