//! Pasteurization and fat standardization for the day's lot.

use rusqlite::{OptionalExtension, params};

use cheesetrace_core::format::format_timestamp;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, operator, plus_minutes};
use crate::errors::GenerationError;

/// `(step, target °C, actual range, duration range in minutes)`
const STEPS: [(&str, f64, (f64, f64), (f64, f64)); 2] = [
    ("HEATING", 72.0, (72.0, 75.0), (14.0, 16.0)),
    ("COOLING", 40.0, (39.0, 41.0), (11.0, 13.0)),
];

const TARGET_FAT_PCT: f64 = 3.2;

pub struct PreprocessingStage;

impl Stage for PreprocessingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Preprocessing
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master", "raw_material_lots"]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        // Standardization precedes pasteurization on the same morning.
        let milk: Option<(String, f64)> = env
            .conn
            .query_row(
                "SELECT raw_lot_uuid, quantity FROM raw_material_lots \
                 WHERE received_date = ?1 AND material_type = 'RAW_MILK' \
                 ORDER BY raw_lot_number LIMIT 1",
                [ctx.date_key()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (raw_lot_uuid, volume) = match milk {
            Some((uuid, quantity)) => (Some(uuid), quantity),
            None => (None, env.values.round(4000.0, 6000.0, 1)),
        };
        let input_fat = env.values.round(3.5, 4.2, 2);
        let standardization_uuid = env.values.uuid();
        let final_fat = env.values.round(TARGET_FAT_PCT - 0.1, TARGET_FAT_PCT + 0.1, 2);
        let cream_added = env.values.round(0.0, 50.0, 1);
        let temperature = env.values.round(4.0, 8.0, 1);
        env.insert(
            "standardization_records",
            "INSERT INTO standardization_records \
             (standardization_uuid, lot_uuid, raw_lot_uuid, recorded_at, input_volume_l, \
              input_fat_pct, target_fat_pct, final_fat_pct, cream_added_l, temperature_c) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                standardization_uuid,
                lot.lot_uuid,
                raw_lot_uuid,
                format_timestamp(clock(ctx.date, 6, 30)),
                volume,
                input_fat,
                TARGET_FAT_PCT,
                final_fat,
                cream_added,
                temperature,
            ],
        )?;

        let mut started = clock(ctx.date, 7, 0);
        for (step, target, (min_temp, max_temp), (min_minutes, max_minutes)) in STEPS {
            let actual = env.values.round(min_temp, max_temp, 1);
            let minutes = env.values.round(min_minutes, max_minutes, 1);
            let ended = plus_minutes(started, minutes);
            let passed = (actual - target).abs() <= 3.0;
            let pasteurization_uuid = env.values.uuid();
            let operator = operator(&mut env.values);
            env.insert(
                "pasteurization_batches",
                "INSERT INTO pasteurization_batches \
                 (pasteurization_uuid, lot_uuid, step_name, started_at, ended_at, \
                  target_temperature_c, actual_temperature_c, duration_minutes, operator_id, passed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    pasteurization_uuid,
                    lot.lot_uuid,
                    step,
                    format_timestamp(started),
                    format_timestamp(ended),
                    target,
                    actual,
                    minutes,
                    operator,
                    passed as i64,
                ],
            )?;
            started = ended;
        }
        Ok(())
    }
}
