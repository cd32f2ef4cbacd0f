//! Suppliers and the raw material lots received each day.
//!
//! Not tied to production lots: raw lots are keyed by received date and
//! later linked from standardization records.

use rusqlite::params;

use cheesetrace_core::format::format_date;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, plus_days, query_strings};
use crate::errors::GenerationError;

/// `(supplier_id, name, supplier_type, country, email)`
const SUPPLIERS: [(&str, &str, &str, &str, &str); 5] = [
    ("SUP001", "Valsassina Dairy Cooperative", "RAW_MILK", "IT", "orders@valsassina-coop.example"),
    ("SUP002", "Bergamo Cream Works", "CREAM", "IT", "sales@bergamocream.example"),
    ("SUP003", "Lactic Cultures SpA", "STARTER_CULTURE", "IT", "info@lacticcultures.example"),
    ("SUP004", "Alpine Rennet GmbH", "RENNET", "AT", "service@alpinerennet.example"),
    ("SUP005", "Lombardy Packaging Solutions", "PACKAGING", "IT", "support@lombardypack.example"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Material {
    RawMilk,
    Cream,
    StarterCulture,
    Rennet,
}

const MATERIALS: [Material; 4] = [
    Material::RawMilk,
    Material::Cream,
    Material::StarterCulture,
    Material::Rennet,
];

impl Material {
    fn code(self) -> &'static str {
        match self {
            Material::RawMilk => "RAW_MILK",
            Material::Cream => "CREAM",
            Material::StarterCulture => "STARTER_CULTURE",
            Material::Rennet => "RENNET",
        }
    }

    /// `(min, max, unit)` received per delivery.
    fn quantity(self) -> (f64, f64, &'static str) {
        match self {
            Material::RawMilk => (4000.0, 6000.0, "L"),
            Material::Cream => (100.0, 300.0, "L"),
            Material::StarterCulture => (0.5, 2.0, "KG"),
            Material::Rennet => (1.0, 5.0, "L"),
        }
    }

    /// Storage temperature range in °C. Cultures arrive freeze-dried and
    /// are kept refrigerated.
    fn storage_temperature(self) -> (f64, f64) {
        match self {
            Material::RawMilk | Material::Cream => (2.0, 4.0),
            Material::StarterCulture => (2.0, 6.0),
            Material::Rennet => (2.0, 8.0),
        }
    }

    fn shelf_life_days(self) -> i64 {
        match self {
            Material::RawMilk => 3,
            Material::Cream => 7,
            Material::StarterCulture => 365,
            Material::Rennet => 180,
        }
    }
}

pub struct RawMaterialsStage;

impl Stage for RawMaterialsStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::RawMaterials
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &[]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_suppliers(env)?;

        let deliveries = env.values.int(2, 4);
        for seq in 1..=deliveries {
            // The first delivery of the day is always milk.
            let material = if seq == 1 {
                Material::RawMilk
            } else {
                *env.values.pick(&MATERIALS).unwrap_or(&Material::RawMilk)
            };
            receive(env, ctx, seq, material)?;
        }
        Ok(())
    }
}

fn ensure_suppliers(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, kind, country, email) in SUPPLIERS {
        env.insert(
            "suppliers",
            "INSERT OR IGNORE INTO suppliers \
             (supplier_id, supplier_name, supplier_type, country, contact_email, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![id, name, kind, country, email],
        )?;
        let certification_uuid = env.values.uuid();
        env.insert(
            "supplier_certifications",
            "INSERT OR IGNORE INTO supplier_certifications \
             (certification_uuid, supplier_id, cert_type, cert_number, issued_date, expiry_date) \
             VALUES (?1, ?2, 'HACCP', ?3, '2023-01-01', '2026-01-01')",
            params![certification_uuid, id, format!("HACCP-{id}")],
        )?;
    }
    Ok(())
}

fn receive(
    env: &mut StageEnv<'_>,
    ctx: &GenerationContext,
    seq: i64,
    material: Material,
) -> Result<(), GenerationError> {
    let suppliers = query_strings(
        env.conn,
        "SELECT supplier_id FROM suppliers \
         WHERE supplier_type = ?1 AND is_active = 1 ORDER BY supplier_id",
        [material.code()],
    )?;
    let supplier = env.values.pick(&suppliers).cloned().ok_or_else(|| {
        GenerationError::MissingReference(format!("no active {} supplier", material.code()))
    })?;

    let raw_lot_uuid = env.values.uuid();
    let (min_qty, max_qty, unit) = material.quantity();
    let quantity = env.values.round(min_qty, max_qty, 1);
    let (min_temp, max_temp) = material.storage_temperature();
    let storage_temperature = env.values.round(min_temp, max_temp, 1);
    let inserted = env.insert(
        "raw_material_lots",
        "INSERT OR IGNORE INTO raw_material_lots \
         (raw_lot_uuid, raw_lot_number, material_type, supplier_id, received_date, quantity, unit, \
          storage_temperature_c, expiry_date, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'RECEIVED')",
        params![
            raw_lot_uuid,
            format!("RM-{}-{seq:03}", ctx.compact_date()),
            material.code(),
            supplier,
            ctx.date_key(),
            quantity,
            unit,
            storage_temperature,
            format_date(plus_days(ctx.date, material.shelf_life_days())),
        ],
    )?;
    // Already received on an earlier run for this date.
    if inserted == 0 {
        return Ok(());
    }

    match material {
        Material::RawMilk => test_milk(env, ctx, &raw_lot_uuid, storage_temperature),
        Material::StarterCulture => {
            test_ingredient(env, ctx, &raw_lot_uuid, "ACTIVITY", (85.0, 99.0), "%")
        }
        Material::Rennet => {
            test_ingredient(env, ctx, &raw_lot_uuid, "STRENGTH", (180.0, 220.0), "IMCU/ml")
        }
        Material::Cream => Ok(()),
    }
}

fn test_milk(
    env: &mut StageEnv<'_>,
    ctx: &GenerationContext,
    raw_lot_uuid: &str,
    temperature: f64,
) -> Result<(), GenerationError> {
    let test_uuid = env.values.uuid();
    let fat = env.values.round(3.5, 4.2, 2);
    let protein = env.values.round(3.0, 3.5, 2);
    let somatic_cells = env.values.int(100_000, 300_000);
    let bacteria = env.values.int(5_000, 50_000);
    let ph = env.values.round(6.6, 6.8, 2);
    let antibiotic = if env.values.chance(0.05) {
        "POSITIVE"
    } else {
        "NEGATIVE"
    };
    let result = if antibiotic == "POSITIVE" { "FAIL" } else { "PASS" };
    env.insert(
        "milk_quality_tests",
        "INSERT INTO milk_quality_tests \
         (test_uuid, raw_lot_uuid, test_date, fat_pct, protein_pct, somatic_cell_count, \
          bacteria_count, ph, temperature_c, antibiotic_result, result) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            test_uuid,
            raw_lot_uuid,
            ctx.date_key(),
            fat,
            protein,
            somatic_cells,
            bacteria,
            ph,
            temperature,
            antibiotic,
            result,
        ],
    )?;
    Ok(())
}

fn test_ingredient(
    env: &mut StageEnv<'_>,
    ctx: &GenerationContext,
    raw_lot_uuid: &str,
    test_type: &str,
    (min, max): (f64, f64),
    unit: &str,
) -> Result<(), GenerationError> {
    let test_uuid = env.values.uuid();
    let measured = env.values.round(min, max, 1);
    env.insert(
        "ingredient_quality_tests",
        "INSERT INTO ingredient_quality_tests \
         (test_uuid, raw_lot_uuid, test_date, test_type, measured_value, unit, result) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PASS')",
        params![test_uuid, raw_lot_uuid, ctx.date_key(), test_type, measured, unit],
    )?;
    Ok(())
}
