//! Vat batches and the timed cheese-making steps that follow.
//!
//! All times are offsets from the batch anchor at 10:00 on the lot date:
//! cutting at T+52 min, second cut T+86, agitation T+103, whey extraction
//! T+115, pressing from T+2h for 18h.

use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use cheesetrace_core::format::format_timestamp;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, operator, plus_minutes};
use crate::errors::GenerationError;
use crate::lots::LotRow;

/// Yield uplift of the vat batch over the lot's nominal size.
const BATCH_SCALE: f64 = 1.03;
const MILK_LITRES_PER_KG: f64 = 10.0;

const FIRST_CUT_MIN: f64 = 52.0;
const SECOND_CUT_MIN: f64 = 86.0;
const AGITATION_MIN: f64 = 103.0;
const WHEY_EXTRACTION_MIN: f64 = 115.0;
const PRESS_START_MIN: f64 = 120.0;
const PRESS_HOURS: f64 = 18.0;

/// `(step, nominal minutes, temperature range)`; each step lasts ±2 min.
const STEP_LOG: [(&str, f64, (f64, f64)); 5] = [
    ("PASTEURIZATION", 15.0, (72.0, 75.0)),
    ("INOCULATION", 5.0, (30.0, 33.0)),
    ("COAGULATION", 45.0, (32.0, 35.0)),
    ("CUTTING", 10.0, (32.0, 35.0)),
    ("FORMING", 20.0, (20.0, 25.0)),
];

#[derive(Debug, Serialize)]
struct PressPhase {
    phase: u8,
    pressure_bar: f64,
    hours: f64,
}

pub struct ManufacturingStage;

impl Stage for ManufacturingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Manufacturing
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master", "standardization_records"]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };
        let anchor = clock(ctx.date, 10, 0);
        let batch_uuid = insert_batch(env, ctx, &lot, anchor)?;
        coagulate(env, &batch_uuid, anchor)?;
        process_curd(env, &batch_uuid, anchor, lot.batch_size_kg)?;
        press(env, &batch_uuid, anchor)?;
        log_steps(env, &lot.lot_uuid, &batch_uuid, anchor)?;
        Ok(())
    }
}

fn insert_batch(
    env: &mut StageEnv<'_>,
    ctx: &GenerationContext,
    lot: &LotRow,
    anchor: NaiveDateTime,
) -> Result<String, GenerationError> {
    let standardization: Option<String> = env
        .conn
        .query_row(
            "SELECT standardization_uuid FROM standardization_records \
             WHERE lot_uuid = ?1 ORDER BY recorded_at, standardization_uuid LIMIT 1",
            [&lot.lot_uuid],
            |row| row.get(0),
        )
        .optional()?;
    let existing: i64 = env.conn.query_row(
        "SELECT COUNT(*) FROM cheese_manufacturing_batches WHERE lot_uuid = ?1",
        [&lot.lot_uuid],
        |row| row.get(0),
    )?;

    let batch_uuid = env.values.uuid();
    let batch_size = (lot.batch_size_kg * BATCH_SCALE * 100.0).round() / 100.0;
    let vat = format!("VAT-{:02}", env.values.int(1, 3));
    let operator = operator(&mut env.values);
    env.insert(
        "cheese_manufacturing_batches",
        "INSERT INTO cheese_manufacturing_batches \
         (batch_uuid, batch_number, lot_uuid, standardization_uuid, batch_start, batch_end, \
          milk_volume_l, batch_size_kg, vat_id, operator_id, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'COMPLETED')",
        params![
            batch_uuid,
            format!("MB-{}-{:02}", ctx.compact_date(), existing + 1),
            lot.lot_uuid,
            standardization,
            format_timestamp(anchor),
            format_timestamp(plus_minutes(anchor, 6.0 * 60.0)),
            batch_size * MILK_LITRES_PER_KG,
            batch_size,
            vat,
            operator,
        ],
    )?;
    Ok(batch_uuid)
}

fn coagulate(
    env: &mut StageEnv<'_>,
    batch_uuid: &str,
    anchor: NaiveDateTime,
) -> Result<(), GenerationError> {
    let minutes = env.values.round(38.0, 42.0, 1);
    let cutting = plus_minutes(anchor, FIRST_CUT_MIN);
    let rennet_added = plus_minutes(cutting, -minutes);
    let coagulation_uuid = env.values.uuid();
    let dose = env.values.round(15.0, 25.0, 1);
    let milk_temperature = env.values.round(32.0, 35.0, 1);
    let ph = env.values.round(6.2, 6.3, 2);
    env.insert(
        "coagulation_records",
        "INSERT INTO coagulation_records \
         (coagulation_uuid, batch_uuid, rennet_added_at, rennet_dose_ml, milk_temperature_c, \
          coagulation_minutes, cutting_time, ph_at_cutting) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            coagulation_uuid,
            batch_uuid,
            format_timestamp(rennet_added),
            dose,
            milk_temperature,
            minutes,
            format_timestamp(cutting),
            ph,
        ],
    )?;
    Ok(())
}

fn process_curd(
    env: &mut StageEnv<'_>,
    batch_uuid: &str,
    anchor: NaiveDateTime,
    lot_size_kg: f64,
) -> Result<(), GenerationError> {
    let curd_uuid = env.values.uuid();
    let curd_size = env.values.round(5.0, 10.0, 1);
    let whey_fraction = env.values.uniform(0.80, 0.85);
    let whey = (lot_size_kg * BATCH_SCALE * MILK_LITRES_PER_KG * whey_fraction * 10.0).round() / 10.0;
    let temperature = env.values.round(36.0, 40.0, 1);
    env.insert(
        "curd_processing_records",
        "INSERT INTO curd_processing_records \
         (curd_uuid, batch_uuid, first_cut_at, second_cut_at, agitation_start_at, \
          whey_extraction_at, curd_size_mm, whey_removed_l, curd_temperature_c) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            curd_uuid,
            batch_uuid,
            format_timestamp(plus_minutes(anchor, FIRST_CUT_MIN)),
            format_timestamp(plus_minutes(anchor, SECOND_CUT_MIN)),
            format_timestamp(plus_minutes(anchor, AGITATION_MIN)),
            format_timestamp(plus_minutes(anchor, WHEY_EXTRACTION_MIN)),
            curd_size,
            whey,
            temperature,
        ],
    )?;
    Ok(())
}

fn press(
    env: &mut StageEnv<'_>,
    batch_uuid: &str,
    anchor: NaiveDateTime,
) -> Result<(), GenerationError> {
    let start = plus_minutes(anchor, PRESS_START_MIN);
    let end = plus_minutes(start, PRESS_HOURS * 60.0);
    let sequence = [(1, 0.5, 2.0), (2, 1.0, 4.0), (3, 1.5, 12.0)]
        .map(|(phase, pressure_bar, hours)| PressPhase {
            phase,
            pressure_bar,
            hours,
        });
    let pressing_uuid = env.values.uuid();
    let final_ph = env.values.round(5.2, 5.4, 2);
    let molds = env.values.int(8, 12);
    env.insert(
        "pressing_records",
        "INSERT INTO pressing_records \
         (pressing_uuid, batch_uuid, press_start, press_end, press_hours, press_sequence, \
          final_ph, mold_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            pressing_uuid,
            batch_uuid,
            format_timestamp(start),
            format_timestamp(end),
            PRESS_HOURS,
            serde_json::to_string(&sequence)?,
            final_ph,
            molds,
        ],
    )?;
    Ok(())
}

fn log_steps(
    env: &mut StageEnv<'_>,
    lot_uuid: &str,
    batch_uuid: &str,
    anchor: NaiveDateTime,
) -> Result<(), GenerationError> {
    let mut started = anchor;
    for (sequence, (step, nominal, (min_temp, max_temp))) in (1i64..).zip(STEP_LOG) {
        let minutes = env.values.around(nominal, 2.0, 1);
        let ended = plus_minutes(started, minutes);
        let step_uuid = env.values.uuid();
        let temperature = env.values.round(min_temp, max_temp, 1);
        let operator = operator(&mut env.values);
        env.insert(
            "manufacturing_batches",
            "INSERT INTO manufacturing_batches \
             (step_uuid, lot_uuid, batch_uuid, step_sequence, step_name, started_at, ended_at, \
              duration_minutes, temperature_c, operator_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                step_uuid,
                lot_uuid,
                batch_uuid,
                sequence,
                step,
                format_timestamp(started),
                format_timestamp(ended),
                minutes,
                temperature,
                operator,
            ],
        )?;
        started = ended;
    }
    Ok(())
}
