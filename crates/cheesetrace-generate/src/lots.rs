//! Lookup and creation of the day's lot.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use cheesetrace_core::format::{format_date, format_timestamp};
use cheesetrace_core::{GenerationContext, LotNumber, LotStatus};

use crate::errors::GenerationError;
use crate::model::{GenerateOptions, MissingParentPolicy};
use crate::stages::clock;
use crate::values::ValueSource;

/// The columns of `lot_master` stages work with.
#[derive(Debug, Clone, PartialEq)]
pub struct LotRow {
    pub lot_uuid: String,
    pub lot_number: String,
    pub lot_date: NaiveDate,
    pub batch_size_kg: f64,
    pub is_fixture: bool,
}

impl LotRow {
    pub fn number(&self) -> Result<LotNumber, GenerationError> {
        Ok(LotNumber::parse(&self.lot_number)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LotResolution {
    Existing(LotRow),
    /// A placeholder lot was inserted because none existed.
    Synthesized(LotRow),
    /// No lot exists and the policy says to skip.
    Missing,
}

/// Finds the lot for `date` whose number follows the `<prefix>-` convention.
pub fn find_lot(
    conn: &Connection,
    prefix: &str,
    date: NaiveDate,
) -> Result<Option<LotRow>, GenerationError> {
    let lot = conn
        .query_row(
            "SELECT lot_uuid, lot_number, batch_size_kg, is_fixture FROM lot_master \
             WHERE lot_date = ?1 AND lot_number LIKE ?2 ORDER BY lot_number LIMIT 1",
            params![format_date(date), LotNumber::like_pattern(prefix)],
            |row| {
                Ok(LotRow {
                    lot_uuid: row.get(0)?,
                    lot_number: row.get(1)?,
                    lot_date: date,
                    batch_size_kg: row.get(2)?,
                    is_fixture: row.get::<_, i64>(3)? != 0,
                })
            },
        )
        .optional()?;
    Ok(lot)
}

/// Inserts the canonical lot for the context date unless one already
/// exists. Returns the new row, or `None` when the insert was ignored.
pub fn insert_lot(
    conn: &Connection,
    values: &mut ValueSource,
    options: &GenerateOptions,
    ctx: &GenerationContext,
    status: LotStatus,
) -> Result<Option<LotRow>, GenerationError> {
    let number = LotNumber::new(&options.lot_prefix, ctx.date)?;
    let row = LotRow {
        lot_uuid: values.uuid(),
        lot_number: number.to_string(),
        lot_date: ctx.date,
        batch_size_kg: values.round(45.0, 55.0, 2),
        is_fixture: status == LotStatus::Fixture,
    };
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO lot_master \
         (lot_uuid, lot_number, lot_date, product_code, facility_code, batch_size_kg, status, is_fixture, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            row.lot_uuid,
            row.lot_number,
            ctx.date_key(),
            options.product_code,
            options.facility_code,
            row.batch_size_kg,
            status.as_str(),
            row.is_fixture as i64,
            format_timestamp(clock(ctx.date, 6, 0)),
        ],
    )?;
    Ok((inserted > 0).then_some(row))
}

/// Applies the missing-parent policy for the context date.
pub fn resolve_lot(
    conn: &Connection,
    values: &mut ValueSource,
    options: &GenerateOptions,
    ctx: &GenerationContext,
) -> Result<LotResolution, GenerationError> {
    if let Some(lot) = find_lot(conn, &options.lot_prefix, ctx.date)? {
        return Ok(LotResolution::Existing(lot));
    }
    match options.missing_parent_policy {
        MissingParentPolicy::Skip => Ok(LotResolution::Missing),
        MissingParentPolicy::Synthesize => {
            let lot = insert_lot(conn, values, options, ctx, LotStatus::Fixture)?;
            match lot {
                Some(lot) => {
                    warn!(lot_number = %lot.lot_number, "synthesized fixture lot");
                    Ok(LotResolution::Synthesized(lot))
                }
                // The lot number exists under another date or prefix casing.
                None => Err(GenerationError::MissingReference(format!(
                    "lot for {} could not be found or created",
                    ctx.date_key()
                ))),
            }
        }
    }
}
