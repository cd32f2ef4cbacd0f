//! Packaging operations, runs, individual packages and their labels, plus
//! the lot's traceability code and its first tracking events.

use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};

use cheesetrace_core::format::{format_date, format_timestamp};
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, operator, plus_days, plus_minutes};
use crate::errors::GenerationError;
use crate::lots::LotRow;

/// `(line_id, name, type, capacity per hour)`
const LINES: [(&str, &str, &str, i64); 3] = [
    ("LINE-01", "Portioning line", "CUTTING", 400),
    ("LINE-02", "Vacuum packing line", "VACUUM", 300),
    ("LINE-03", "Labeling and boxing line", "LABELING", 500),
];

/// `(material_id, name, type)`
const MATERIALS: [(&str, &str, &str); 2] = [
    ("PKG-VAC", "Multilayer vacuum film", "FILM"),
    ("PKG-BOX", "Corrugated shipping box", "CARTON"),
];

/// Operation order on the packaging day, with the line that runs it.
const OPERATIONS: [(&str, &str); 4] = [
    ("CUTTING", "LINE-01"),
    ("VACUUM_SEALING", "LINE-02"),
    ("LABELING", "LINE-03"),
    ("BOXING", "LINE-03"),
];

const TARGET_PACKAGE_G: f64 = 250.0;

pub struct PackagingStage;

impl Stage for PackagingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Packaging
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["lot_master", "aging_lots", "suppliers"]
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

        let packaging_date = plus_days(ctx.date, env.values.int(25, 35));
        run_operations(env, &lot, packaging_date)?;

        let mut stmt = env.conn.prepare_cached(
            "SELECT aging_lot_uuid FROM aging_lots WHERE lot_uuid = ?1 \
             ORDER BY aging_start_date, aging_lot_uuid",
        )?;
        let aging_lots = stmt
            .query_map([&lot.lot_uuid], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let previous_runs: i64 = env.conn.query_row(
            "SELECT COUNT(*) FROM packaging_runs WHERE lot_uuid = ?1",
            [&lot.lot_uuid],
            |row| row.get(0),
        )?;
        let sources: Vec<Option<String>> = if aging_lots.is_empty() {
            vec![None]
        } else {
            aging_lots.into_iter().map(Some).collect()
        };

        let mut packages = 0;
        for (offset, aging_lot) in (1..).zip(sources) {
            packages += pack_run(
                env,
                &lot,
                aging_lot.as_deref(),
                packaging_date,
                previous_runs + offset,
            )?;
        }

        assign_traceability(env, ctx, &lot, packaging_date, packages)?;
        Ok(())
    }
}

fn ensure_catalogs(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, kind, capacity) in LINES {
        env.insert(
            "packaging_lines",
            "INSERT OR IGNORE INTO packaging_lines \
             (line_id, line_name, line_type, capacity_per_hour, is_active) \
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![id, name, kind, capacity],
        )?;
    }

    let supplier: Option<String> = env
        .conn
        .query_row(
            "SELECT supplier_id FROM suppliers WHERE supplier_type = 'PACKAGING' \
             ORDER BY supplier_id LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    for (id, name, kind) in MATERIALS {
        env.insert(
            "packaging_materials",
            "INSERT OR IGNORE INTO packaging_materials \
             (material_id, material_name, material_type, supplier_id, food_contact_approved) \
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![id, name, kind, supplier],
        )?;
    }

    let product = env.options.product_code.clone();
    for language in ["EN", "IT"] {
        env.insert(
            "product_labels",
            "INSERT OR IGNORE INTO product_labels \
             (label_template_id, product_code, label_format, language, version) \
             VALUES (?1, ?2, '100x60 thermal', ?3, 1)",
            params![label_template(&product, language), product, language],
        )?;
    }
    Ok(())
}

fn label_template(product: &str, language: &str) -> String {
    format!("LBL-{product}-{language}")
}

/// Records the four packaging operations back to back from 08:00.
fn run_operations(
    env: &mut StageEnv<'_>,
    lot: &LotRow,
    packaging_date: NaiveDate,
) -> Result<(), GenerationError> {
    let units = env.values.int(50, 120);
    let mut started = clock(packaging_date, 8, 0);
    for (operation, line) in OPERATIONS {
        let minutes = env.values.round(30.0, 90.0, 0);
        let ended = plus_minutes(started, minutes);
        let operation_uuid = env.values.uuid();
        let operator = operator(&mut env.values);
        env.insert(
            "packaging_operations",
            "INSERT INTO packaging_operations \
             (operation_uuid, lot_uuid, line_id, operation_type, packaging_date, started_at, \
              ended_at, units_processed, operator_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                operation_uuid,
                lot.lot_uuid,
                line,
                operation,
                format_date(packaging_date),
                format_timestamp(started),
                format_timestamp(ended),
                units,
                operator,
            ],
        )?;
        started = ended;
    }
    Ok(())
}

/// Packs one run and labels each package. Returns the package count.
fn pack_run(
    env: &mut StageEnv<'_>,
    lot: &LotRow,
    aging_lot: Option<&str>,
    packaging_date: NaiveDate,
    run_seq: i64,
) -> Result<i64, GenerationError> {
    let run_uuid = env.values.uuid();
    let count = env.values.int(6, 12);
    env.insert(
        "packaging_runs",
        "INSERT INTO packaging_runs \
         (run_uuid, lot_uuid, aging_lot_uuid, line_id, material_id, packaging_date, \
          package_count, target_weight_g) \
         VALUES (?1, ?2, ?3, 'LINE-02', 'PKG-VAC', ?4, ?5, ?6)",
        params![
            run_uuid,
            lot.lot_uuid,
            aging_lot,
            format_date(packaging_date),
            count,
            TARGET_PACKAGE_G,
        ],
    )?;

    let template = label_template(&env.options.product_code, "EN");
    // Unique per lot, run and package; the batch code carries the lot date.
    let barcode_prefix = lot.number()?.batch_code().replace('-', "");
    for seq in 1..=count {
        let package_uuid = env.values.uuid();
        let serial = format!("{}-R{run_seq:02}-{seq:03}", lot.lot_number);
        let weight = env.values.around(TARGET_PACKAGE_G, 10.0, 1);
        let packaged_at = clock(packaging_date, 10, seq);
        env.insert(
            "individual_packages",
            "INSERT INTO individual_packages \
             (package_uuid, run_uuid, lot_uuid, package_serial, net_weight_g, packaged_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                package_uuid,
                run_uuid,
                lot.lot_uuid,
                serial,
                weight,
                format_timestamp(packaged_at),
            ],
        )?;

        let package_label_uuid = env.values.uuid();
        let barcode = format!("{barcode_prefix}{run_seq:02}{seq:03}");
        env.insert(
            "package_labels",
            "INSERT INTO package_labels \
             (package_label_uuid, package_uuid, label_template_id, barcode, printed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                package_label_uuid,
                package_uuid,
                template,
                barcode,
                format_timestamp(packaged_at),
            ],
        )?;
    }
    Ok(count)
}

/// Assigns the lot's traceability code on first packaging and records the
/// creation, transformation and packing events in time order.
fn assign_traceability(
    env: &mut StageEnv<'_>,
    ctx: &GenerationContext,
    lot: &LotRow,
    packaging_date: NaiveDate,
    packages: i64,
) -> Result<(), GenerationError> {
    let tlc_uuid = env.values.uuid();
    let tlc = format!("TLC-{}-{}", env.options.facility_code, lot.lot_number);
    let assigned = env.insert(
        "traceability_lot_codes",
        "INSERT OR IGNORE INTO traceability_lot_codes (tlc_uuid, lot_uuid, tlc, assigned_date) \
         VALUES (?1, ?2, ?3, ?4)",
        params![tlc_uuid, lot.lot_uuid, tlc, ctx.date_key()],
    )?;
    if assigned == 0 {
        return Ok(());
    }

    let facility = env.options.facility_code.clone();
    let events = [
        ("CREATION", clock(ctx.date, 6, 0), lot.batch_size_kg, "KG"),
        ("TRANSFORMATION", clock(ctx.date, 10, 0), lot.batch_size_kg, "KG"),
        ("INITIAL_PACKING", clock(packaging_date, 8, 0), packages as f64, "UNITS"),
    ];
    for (event_type, at, quantity, unit) in events {
        let cte_uuid = env.values.uuid();
        env.insert(
            "critical_tracking_events",
            "INSERT INTO critical_tracking_events \
             (cte_uuid, tlc_uuid, event_type, event_time, location, quantity, unit) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![cte_uuid, tlc_uuid, event_type, format_timestamp(at), facility, quantity, unit],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_runs_on_a_known_line() {
        for (_, line) in OPERATIONS {
            assert!(LINES.iter().any(|(id, ..)| *id == line));
        }
    }

    #[test]
    fn label_templates_are_per_language() {
        assert_eq!(label_template("TALEGGIO", "EN"), "LBL-TALEGGIO-EN");
    }
}
