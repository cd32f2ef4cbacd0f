//! Final weighing and pricing of a lot, with one catch-weight line per
//! package and the production inventory movement.

use rusqlite::{OptionalExtension, params};

use cheesetrace_core::format::{format_date, format_timestamp};
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, latest_packaging_date, lot_packages};
use crate::errors::GenerationError;

/// `(equipment_id, name, type, max kg, precision g, last calibration)`
const EQUIPMENT: [(&str, &str, &str, f64, f64, &str); 2] = [
    ("SCALE-01", "Floor platform scale", "PLATFORM", 300.0, 50.0, "2023-12-15"),
    ("SCALE-02", "Inline checkweigher", "CHECKWEIGHER", 5.0, 0.5, "2023-12-20"),
];

/// `(grade, price per kg in EUR)`
const GRADES: [(&str, f64); 3] = [("PREMIUM", 24.50), ("STANDARD", 19.90), ("ECONOMY", 15.50)];

pub struct WeighingStage;

impl Stage for WeighingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Weighing
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master", "packaging_operations", "individual_packages"]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_catalogs(env)?;
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        let weighed_on = latest_packaging_date(env.conn, &lot.lot_uuid)?.unwrap_or(ctx.date);
        let weighed_at = format_timestamp(clock(weighed_on, 15, 0));
        let packages = lot_packages(env.conn, &lot.lot_uuid)?;

        let grade = if env.values.chance(0.6) {
            "PREMIUM"
        } else if env.values.chance(0.7) {
            "STANDARD"
        } else {
            "ECONOMY"
        };
        let (rule_id, price_per_kg): (String, f64) = env
            .conn
            .query_row(
                "SELECT rule_id, price_per_kg FROM pricing_rules \
                 WHERE product_code = ?1 AND grade = ?2",
                params![env.options.product_code, grade],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| {
                GenerationError::MissingReference(format!("no pricing rule for grade {grade}"))
            })?;

        let total_kg = if packages.is_empty() {
            // Unpackaged lots are weighed as whole wheels.
            round(lot.batch_size_kg * 0.12, 3)
        } else {
            round(packages.iter().map(|(_, grams)| grams).sum::<f64>() / 1000.0, 3)
        };
        let weighing_uuid = env.values.uuid();
        let equipment = if packages.is_empty() { "SCALE-01" } else { "SCALE-02" };
        env.insert(
            "weighing_pricing",
            "INSERT INTO weighing_pricing \
             (weighing_uuid, lot_uuid, equipment_id, rule_id, weighed_at, grade, total_weight_kg, \
              price_per_kg, total_price) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                weighing_uuid,
                lot.lot_uuid,
                equipment,
                rule_id,
                weighed_at,
                grade,
                total_kg,
                price_per_kg,
                round(total_kg * price_per_kg, 2),
            ],
        )?;

        for (package_uuid, net_g) in &packages {
            let tare = env.values.round(8.0, 12.0, 1);
            let gross = round(net_g + tare, 1);
            let net = round(gross - tare, 1);
            let transaction_uuid = env.values.uuid();
            env.insert(
                "catch_weight_transactions",
                "INSERT INTO catch_weight_transactions \
                 (transaction_uuid, weighing_uuid, package_uuid, gross_weight_g, tare_weight_g, \
                  net_weight_g, unit_price, line_total) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    transaction_uuid,
                    weighing_uuid,
                    package_uuid,
                    gross,
                    tare,
                    net,
                    price_per_kg,
                    round(net / 1000.0 * price_per_kg, 2),
                ],
            )?;
        }

        let inventory_uuid = env.values.uuid();
        env.insert(
            "inventory_transactions",
            "INSERT INTO inventory_transactions \
             (inventory_uuid, lot_uuid, transaction_type, transaction_date, quantity_kg, location, \
              reference) \
             VALUES (?1, ?2, 'PRODUCTION', ?3, ?4, 'WH-01', ?5)",
            params![
                inventory_uuid,
                lot.lot_uuid,
                format_date(weighed_on),
                total_kg,
                lot.lot_number,
            ],
        )?;
        Ok(())
    }
}

fn ensure_catalogs(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, kind, max_kg, precision, calibrated) in EQUIPMENT {
        env.insert(
            "weighing_equipment",
            "INSERT OR IGNORE INTO weighing_equipment \
             (equipment_id, equipment_name, equipment_type, max_capacity_kg, precision_g, \
              last_calibration_date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, name, kind, max_kg, precision, calibrated],
        )?;
    }
    let product = env.options.product_code.clone();
    for (grade, price) in GRADES {
        env.insert(
            "pricing_rules",
            "INSERT OR IGNORE INTO pricing_rules \
             (rule_id, product_code, grade, price_per_kg, currency, effective_from) \
             VALUES (?1, ?2, ?3, ?4, 'EUR', '2024-01-01')",
            params![format!("PR-{product}-{grade}"), product, grade, price],
        )?;
    }
    Ok(())
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
