//! Aging caves, aging lots, cave climate and the care schedule.
//!
//! Aging lots are a snapshot at generation time: each lot is some number
//! of days into a planned aging period, and only the activities whose
//! scheduled day has already passed are recorded.

use chrono::NaiveDate;
use rusqlite::params;

use cheesetrace_core::format::{format_date, format_timestamp, parse_date};
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, operator, plus_days};
use crate::errors::GenerationError;

/// `(cave_id, name, capacity, target °C, target humidity %)`
const CAVES: [(&str, &str, i64, f64, f64); 3] = [
    ("CAVE-01", "North Cave", 500, 12.0, 85.0),
    ("CAVE-02", "South Cave", 400, 11.0, 88.0),
    ("CAVE-03", "Deep Cave", 300, 10.0, 90.0),
];

/// Fraction of batch weight that ends up as wheels entering the cave.
const YIELD_FRACTION: f64 = 0.12;

const WASHING_DAYS: [u32; 3] = [5, 10, 15];
const TURNING_DAYS: [u32; 7] = [3, 7, 12, 18, 25, 35, 45];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Washing,
    Turning,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Washing => "WASHING",
            Activity::Turning => "TURNING",
        }
    }

    fn note(self) -> &'static str {
        match self {
            Activity::Washing => "Rind washed with brine",
            Activity::Turning => "Wheels turned",
        }
    }
}

/// Care activities due by `actual_days` into aging, ordered by day.
pub fn activity_schedule(actual_days: u32) -> Vec<(u32, Activity)> {
    let mut schedule: Vec<(u32, Activity)> = WASHING_DAYS
        .iter()
        .map(|day| (*day, Activity::Washing))
        .chain(TURNING_DAYS.iter().map(|day| (*day, Activity::Turning)))
        .filter(|(day, _)| *day <= actual_days)
        .collect();
    schedule.sort_by_key(|(day, activity)| (*day, activity.as_str()));
    schedule
}

/// Weight after moisture loss, rounded to grams.
pub fn aged_weight(initial_kg: f64, loss_fraction: f64) -> f64 {
    (initial_kg * (1.0 - loss_fraction) * 1000.0).round() / 1000.0
}

pub struct AgingStage;

impl Stage for AgingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Aging
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master", "cheese_manufacturing_batches"]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_caves(env)?;
        record_climate(env, ctx)?;

        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        let mut stmt = env.conn.prepare_cached(
            "SELECT batch_uuid, batch_start, batch_size_kg FROM cheese_manufacturing_batches \
             WHERE lot_uuid = ?1 ORDER BY batch_start, batch_uuid",
        )?;
        let batches = stmt
            .query_map([&lot.lot_uuid], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        if batches.is_empty() {
            // Manufacturing has not run for this lot; age the lot itself.
            age(env, &lot.lot_uuid, None, lot.lot_date, lot.batch_size_kg)?;
        }
        for (batch_uuid, batch_start, batch_size) in batches {
            // Timestamps start with the date.
            let start = parse_date(batch_start.get(..10).unwrap_or(&batch_start))?;
            age(env, &lot.lot_uuid, Some(&batch_uuid), start, batch_size)?;
        }
        Ok(())
    }
}

fn ensure_caves(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, capacity, temperature, humidity) in CAVES {
        env.insert(
            "aging_caves",
            "INSERT OR IGNORE INTO aging_caves \
             (cave_id, cave_name, capacity_wheels, target_temperature_c, target_humidity_pct, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![id, name, capacity, temperature, humidity],
        )?;
    }
    Ok(())
}

/// Hourly readings for every cave on the context date.
fn record_climate(env: &mut StageEnv<'_>, ctx: &GenerationContext) -> Result<(), GenerationError> {
    for (cave_id, _, _, temperature, humidity) in CAVES {
        for hour in 0..24 {
            let reading_uuid = env.values.uuid();
            let measured_temperature = env.values.around(temperature, 1.0, 1);
            let measured_humidity = env.values.around(humidity, 3.0, 1);
            let co2 = env.values.round(800.0, 1500.0, 0);
            env.insert(
                "environmental_monitoring",
                "INSERT OR IGNORE INTO environmental_monitoring \
                 (reading_uuid, cave_id, recorded_at, temperature_c, humidity_pct, co2_ppm) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    reading_uuid,
                    cave_id,
                    format_timestamp(clock(ctx.date, hour, 0)),
                    measured_temperature,
                    measured_humidity,
                    co2,
                ],
            )?;
        }
    }
    Ok(())
}

fn age(
    env: &mut StageEnv<'_>,
    lot_uuid: &str,
    batch_uuid: Option<&str>,
    start: NaiveDate,
    batch_size_kg: f64,
) -> Result<(), GenerationError> {
    let cave_ids = CAVES.map(|(id, ..)| id);
    let cave_id = *env.values.pick(&cave_ids).unwrap_or(&cave_ids[0]);
    let planned = env.values.int(40, 60);
    let actual = env.values.int(15, planned);
    let initial = (batch_size_kg * YIELD_FRACTION * 1000.0).round() / 1000.0;
    let loss = env.values.uniform(0.05, 0.15);
    let current = aged_weight(initial, loss);
    let wheels = env.values.int(8, 12);
    let status = if actual >= planned { "READY" } else { "AGING" };

    let aging_lot_uuid = env.values.uuid();
    env.insert(
        "aging_lots",
        "INSERT INTO aging_lots \
         (aging_lot_uuid, lot_uuid, batch_uuid, cave_id, aging_start_date, planned_aging_days, \
          actual_aging_days, initial_weight_kg, current_weight_kg, weight_loss_pct, wheel_count, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            aging_lot_uuid,
            lot_uuid,
            batch_uuid,
            cave_id,
            format_date(start),
            planned,
            actual,
            initial,
            current,
            (loss * 10_000.0).round() / 100.0,
            wheels,
            status,
        ],
    )?;

    for (day, activity) in activity_schedule(actual as u32) {
        let activity_uuid = env.values.uuid();
        let operator = operator(&mut env.values);
        env.insert(
            "aging_activities",
            "INSERT INTO aging_activities \
             (activity_uuid, aging_lot_uuid, activity_type, activity_day, activity_date, operator_id, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                activity_uuid,
                aging_lot_uuid,
                activity.as_str(),
                day,
                format_date(plus_days(start, day as i64)),
                operator,
                activity.note(),
            ],
        )?;
    }

    for wheel in 1..=wheels {
        let position_uuid = env.values.uuid();
        let rack = format!("R{:02}", env.values.int(1, 10));
        let shelf = env.values.int(1, 5);
        let slot = env.values.int(1, 20);
        env.insert(
            "wheel_positions",
            "INSERT INTO wheel_positions \
             (position_uuid, aging_lot_uuid, cave_id, rack, shelf, slot, wheel_number) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![position_uuid, aging_lot_uuid, cave_id, rack, shelf, slot, wheel],
        )?;
    }
    Ok(())
}
