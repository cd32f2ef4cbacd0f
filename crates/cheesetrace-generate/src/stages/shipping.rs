//! Shipments of a lot's packages, cold-chain readings in transit and
//! delivery confirmations.

use rusqlite::{OptionalExtension, params};

use cheesetrace_core::format::{format_date, format_timestamp};
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{
    Stage, StageEnv, clock, latest_packaging_date, lot_packages, plus_days, query_strings,
};
use crate::errors::GenerationError;

/// `(carrier_id, name, service)`
const CARRIERS: [(&str, &str, &str); 3] = [
    ("CARR-01", "Alpine Cold Logistics", "REFRIGERATED_LTL"),
    ("CARR-02", "Express Fresh", "EXPRESS_REFRIGERATED"),
    ("CARR-03", "Po Valley Dairy Freight", "REFRIGERATED_FTL"),
];

const DESTINATIONS: [&str; 5] = [
    "Milano Distribution Center",
    "Torino Retail Hub",
    "Verona Wholesale Market",
    "Bologna Gourmet Foods",
    "Munich Import Warehouse",
];

const RECEIVERS: [&str; 4] = ["A. Conti", "M. Esposito", "K. Huber", "F. Marino"];

/// Hours between cold-chain readings while in transit.
const READING_INTERVAL_H: i64 = 2;

pub struct ShippingStage;

impl Stage for ShippingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Shipping
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &[
            "lot_master",
            "packaging_operations",
            "individual_packages",
            "traceability_lot_codes",
            "critical_tracking_events",
        ]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_carriers(env)?;
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        let packaged_on = latest_packaging_date(env.conn, &lot.lot_uuid)?;
        let packages = lot_packages(env.conn, &lot.lot_uuid)?;
        let carriers = query_strings(
            env.conn,
            "SELECT carrier_id FROM shipping_carriers WHERE is_active = 1 ORDER BY carrier_id",
            [],
        )?;
        let tlc_uuid: Option<String> = env
            .conn
            .query_row(
                "SELECT tlc_uuid FROM traceability_lot_codes WHERE lot_uuid = ?1",
                [&lot.lot_uuid],
                |row| row.get(0),
            )
            .optional()?;
        let previous: i64 = env.conn.query_row(
            "SELECT COUNT(*) FROM shipments WHERE lot_uuid = ?1",
            [&lot.lot_uuid],
            |row| row.get(0),
        )?;

        let shipments = env.values.int(1, 3);
        for index in 0..shipments {
            let carrier = env
                .values
                .pick(&carriers)
                .cloned()
                .ok_or_else(|| GenerationError::MissingReference("no active carrier".into()))?;
            let pickup = match packaged_on {
                Some(date) => plus_days(date, env.values.int(1, 5)),
                None => plus_days(ctx.date, env.values.int(30, 60)),
            };
            let transit_days = env.values.int(1, 4);
            let delivery = plus_days(pickup, transit_days);
            let destination = *env.values.pick(&DESTINATIONS).unwrap_or(&DESTINATIONS[0]);

            // Packages are dealt round-robin across the lot's shipments.
            let contents: Vec<&(String, f64)> = packages
                .iter()
                .enumerate()
                .filter(|(i, _)| *i as i64 % shipments == index)
                .map(|(_, package)| package)
                .collect();
            let loose_units = if packages.is_empty() {
                env.values.int(10, 50)
            } else {
                0
            };
            let package_count = if packages.is_empty() {
                loose_units
            } else {
                contents.len() as i64
            };
            let total_kg = if packages.is_empty() {
                round3(loose_units as f64 * 0.25)
            } else {
                round3(contents.iter().map(|(_, grams)| grams).sum::<f64>() / 1000.0)
            };

            let shipment_uuid = env.values.uuid();
            env.insert(
                "shipments",
                "INSERT INTO shipments \
                 (shipment_uuid, lot_uuid, carrier_id, tracking_number, destination, pickup_date, \
                  expected_delivery_date, status, package_count, total_weight_kg) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'DELIVERED', ?8, ?9)",
                params![
                    shipment_uuid,
                    lot.lot_uuid,
                    carrier,
                    format!(
                        "TRK{}{:03}{:02}",
                        ctx.compact_date(),
                        ctx.lot_count,
                        previous + index + 1
                    ),
                    destination,
                    format_date(pickup),
                    format_date(delivery),
                    package_count,
                    total_kg,
                ],
            )?;

            if contents.is_empty() {
                let content_uuid = env.values.uuid();
                env.insert(
                    "shipment_contents",
                    "INSERT INTO shipment_contents \
                     (content_uuid, shipment_uuid, package_uuid, quantity, weight_kg) \
                     VALUES (?1, ?2, NULL, ?3, ?4)",
                    params![content_uuid, shipment_uuid, package_count, total_kg],
                )?;
            }
            for (package_uuid, grams) in contents {
                let content_uuid = env.values.uuid();
                env.insert(
                    "shipment_contents",
                    "INSERT INTO shipment_contents \
                     (content_uuid, shipment_uuid, package_uuid, quantity, weight_kg) \
                     VALUES (?1, ?2, ?3, 1, ?4)",
                    params![content_uuid, shipment_uuid, package_uuid, round3(grams / 1000.0)],
                )?;
            }

            let departed = clock(pickup, 8, 0);
            for step in 0..(transit_days * 24 / READING_INTERVAL_H) {
                let reading_uuid = env.values.uuid();
                let temperature = env.values.round(2.0, 8.0, 1);
                env.insert(
                    "temperature_monitoring",
                    "INSERT INTO temperature_monitoring \
                     (reading_uuid, shipment_uuid, recorded_at, temperature_c, location) \
                     VALUES (?1, ?2, ?3, ?4, 'IN_TRANSIT')",
                    params![
                        reading_uuid,
                        shipment_uuid,
                        format_timestamp(departed + chrono::Duration::hours(step * READING_INTERVAL_H)),
                        temperature,
                    ],
                )?;
            }

            let confirmation_uuid = env.values.uuid();
            let receiver = *env.values.pick(&RECEIVERS).unwrap_or(&RECEIVERS[0]);
            let arrival_temperature = env.values.round(3.0, 6.0, 1);
            env.insert(
                "delivery_confirmations",
                "INSERT INTO delivery_confirmations \
                 (confirmation_uuid, shipment_uuid, delivered_at, received_by, condition, \
                  temperature_on_arrival_c) \
                 VALUES (?1, ?2, ?3, ?4, 'GOOD', ?5)",
                params![
                    confirmation_uuid,
                    shipment_uuid,
                    format_timestamp(clock(delivery, 14, 0)),
                    receiver,
                    arrival_temperature,
                ],
            )?;

            if let Some(tlc_uuid) = &tlc_uuid {
                let cte_uuid = env.values.uuid();
                env.insert(
                    "critical_tracking_events",
                    "INSERT INTO critical_tracking_events \
                     (cte_uuid, tlc_uuid, event_type, event_time, location, quantity, unit) \
                     VALUES (?1, ?2, 'SHIPPING', ?3, ?4, ?5, 'UNITS')",
                    params![
                        cte_uuid,
                        tlc_uuid,
                        format_timestamp(departed),
                        destination,
                        package_count as f64,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

fn ensure_carriers(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, service) in CARRIERS {
        env.insert(
            "shipping_carriers",
            "INSERT OR IGNORE INTO shipping_carriers \
             (carrier_id, carrier_name, service_type, refrigerated, is_active) \
             VALUES (?1, ?2, ?3, 1, 1)",
            params![id, name, service],
        )?;
    }
    Ok(())
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
