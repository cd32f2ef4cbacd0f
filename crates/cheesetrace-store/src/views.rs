use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::StoreResult;

/// One row of `v_lot_traceability`.
#[derive(Debug, Clone, Serialize)]
pub struct LotTraceabilityRow {
    pub lot_number: String,
    pub lot_date: String,
    pub status: String,
    pub is_fixture: bool,
    pub batch_count: i64,
    pub aging_lot_count: i64,
    pub quality_test_count: i64,
    pub quality_tests_passed: i64,
    pub package_count: i64,
    pub shipment_count: i64,
    pub first_packaging_date: Option<String>,
    pub first_pickup_date: Option<String>,
}

/// Reads the traceability view ordered by lot date.
pub fn lot_traceability(conn: &Connection, limit: usize) -> StoreResult<Vec<LotTraceabilityRow>> {
    let mut stmt = conn.prepare(
        "SELECT lot_number, lot_date, status, is_fixture, batch_count, aging_lot_count, \
                quality_test_count, quality_tests_passed, package_count, shipment_count, \
                first_packaging_date, first_pickup_date \
         FROM v_lot_traceability ORDER BY lot_date, lot_number LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(LotTraceabilityRow {
                lot_number: row.get(0)?,
                lot_date: row.get(1)?,
                status: row.get(2)?,
                is_fixture: row.get::<_, i64>(3)? != 0,
                batch_count: row.get(4)?,
                aging_lot_count: row.get(5)?,
                quality_test_count: row.get(6)?,
                quality_tests_passed: row.get(7)?,
                package_count: row.get(8)?,
                shipment_count: row.get(9)?,
                first_packaging_date: row.get(10)?,
                first_pickup_date: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
