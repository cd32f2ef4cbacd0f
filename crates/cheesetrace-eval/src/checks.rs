//! Individual integrity checks. Each returns the rows it looked at and the
//! violations it found; none of them modify the store.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{Connection, Params};

use cheesetrace_core::format::{format_date, parse_date};
use cheesetrace_core::tables::lot_owned_tables;
use cheesetrace_core::{LotNumber, StoreSchema, Subsystem};
use cheesetrace_store::quote_ident;

use crate::errors::EvalError;
use crate::metrics::CheckStats;
use crate::model::Violation;

/// Stats plus violations for one check family.
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub stats: CheckStats,
    pub violations: Vec<Violation>,
}

impl CheckOutcome {
    fn push(&mut self, violation: Violation) {
        self.stats.violations += 1;
        self.violations.push(violation);
    }

    fn merge(&mut self, other: CheckOutcome) {
        self.stats.checked += other.stats.checked;
        self.stats.violations += other.stats.violations;
        self.violations.extend(other.violations);
    }
}

/// Lot numbers are well formed, unique, carry `prefix`, agree with their
/// `lot_date`, and the dates form one lot per day without gaps.
pub fn lot_numbers(conn: &Connection, prefix: &str) -> Result<CheckOutcome, EvalError> {
    let rows: Vec<(i64, String, String)> = collect(
        conn,
        "SELECT rowid, lot_number, lot_date FROM lot_master ORDER BY lot_date, lot_number",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut outcome = CheckOutcome::default();
    let mut seen = BTreeSet::new();
    let mut per_date: BTreeMap<String, u64> = BTreeMap::new();
    for (rowid, number, date) in &rows {
        outcome.stats.checked += 1;
        if !seen.insert(number.as_str()) {
            outcome.push(
                Violation::new("lot_number_duplicate", "lot_master.lot_number", "duplicate lot number")
                    .at_row(*rowid)
                    .with_example(number.clone()),
            );
        }
        *per_date.entry(date.clone()).or_insert(0) += 1;

        let parsed = match LotNumber::parse(number) {
            Ok(parsed) => parsed,
            Err(err) => {
                outcome.push(
                    Violation::new("lot_number_format", "lot_master.lot_number", err.to_string())
                        .at_row(*rowid)
                        .with_example(number.clone()),
                );
                continue;
            }
        };
        if parsed.prefix() != prefix {
            outcome.push(
                Violation::new(
                    "lot_number_prefix",
                    "lot_master.lot_number",
                    format!("expected prefix '{prefix}'"),
                )
                .at_row(*rowid)
                .with_example(number.clone()),
            );
        }
        if format_date(parsed.date()) != *date {
            outcome.push(
                Violation::new(
                    "lot_number_date",
                    "lot_master.lot_number",
                    format!("lot number does not match lot_date {date}"),
                )
                .at_row(*rowid)
                .with_example(number.clone()),
            );
        }
    }

    let mut dates = Vec::with_capacity(per_date.len());
    for (date, count) in &per_date {
        if *count > 1 {
            outcome.push(
                Violation::new(
                    "lot_date_duplicate",
                    "lot_master.lot_date",
                    format!("{count} lots share one date"),
                )
                .with_example(date.clone()),
            );
        }
        match parse_date(date) {
            Ok(parsed) => dates.push(parsed),
            Err(err) => outcome.push(
                Violation::new("lot_date_format", "lot_master.lot_date", err.to_string())
                    .with_example(date.clone()),
            ),
        }
    }
    for pair in dates.windows(2) {
        if (pair[1] - pair[0]).num_days() > 1 {
            outcome.push(
                Violation::new(
                    "lot_date_gap",
                    "lot_master.lot_date",
                    format!("no lot between {} and {}", pair[0], pair[1]),
                )
                .with_example(format_date(pair[1])),
            );
        }
    }
    Ok(outcome)
}

/// Every non-null foreign key value in every base table points at an
/// existing parent row. The keys come from introspection, not from a
/// hard-coded list.
pub fn foreign_keys(conn: &Connection, schema: &StoreSchema) -> Result<CheckOutcome, EvalError> {
    let mut outcome = CheckOutcome::default();
    for table in schema.base_tables() {
        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
                outcome.push(Violation::new(
                    "fk_unresolved",
                    format!("{}.{}", table.name, fk.columns.join(",")),
                    format!("cannot match columns against {}", fk.referenced_table),
                ));
                continue;
            }
            let child = quote_ident(&table.name);
            let parent = quote_ident(&fk.referenced_table);
            let present = fk
                .columns
                .iter()
                .map(|column| format!("c.{} IS NOT NULL", quote_ident(column)))
                .collect::<Vec<_>>()
                .join(" AND ");
            let matches = fk
                .columns
                .iter()
                .zip(&fk.referenced_columns)
                .map(|(column, referenced)| {
                    format!("p.{} = c.{}", quote_ident(referenced), quote_ident(column))
                })
                .collect::<Vec<_>>()
                .join(" AND ");

            let checked: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {child} c WHERE {present}"),
                [],
                |row| row.get(0),
            )?;
            outcome.stats.checked += checked as u64;

            let path = format!("{}.{}", table.name, fk.columns.join(","));
            let orphans: Vec<(i64, String)> = collect(
                conn,
                &format!(
                    "SELECT c.rowid, CAST(c.{first} AS TEXT) FROM {child} c \
                     WHERE {present} AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE {matches}) \
                     ORDER BY c.rowid",
                    first = quote_ident(&fk.columns[0]),
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            for (rowid, value) in orphans {
                outcome.push(
                    Violation::new(
                        "fk_orphan",
                        path.clone(),
                        format!("no matching row in {}", fk.referenced_table),
                    )
                    .at_row(rowid)
                    .with_example(value),
                );
            }
        }
    }
    Ok(outcome)
}

/// Every lot has at least one row in each lot-owned stage table.
pub fn lot_coverage(conn: &Connection) -> Result<CheckOutcome, EvalError> {
    let lots: i64 = conn.query_row("SELECT COUNT(*) FROM lot_master", [], |row| row.get(0))?;
    let owned: BTreeSet<&str> = lot_owned_tables().map(|spec| spec.name).collect();

    let mut outcome = CheckOutcome::default();
    for subsystem in Subsystem::ALL {
        let table = subsystem.primary_table();
        if !owned.contains(table) {
            continue;
        }
        outcome.stats.checked += lots as u64;
        let uncovered: Vec<(i64, String)> = collect(
            conn,
            &format!(
                "SELECT l.rowid, l.lot_number FROM lot_master l \
                 WHERE NOT EXISTS (SELECT 1 FROM {} x WHERE x.lot_uuid = l.lot_uuid) \
                 ORDER BY l.lot_date, l.lot_number",
                quote_ident(table)
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        for (rowid, lot_number) in uncovered {
            outcome.push(
                Violation::new(
                    "lot_coverage",
                    table,
                    format!("{} produced nothing for this lot", subsystem.id()),
                )
                .at_row(rowid)
                .with_example(lot_number),
            );
        }
    }
    Ok(outcome)
}

/// Distinct lots a lot-owned table references.
pub fn lots_covered(conn: &Connection, table: &str) -> Result<u64, EvalError> {
    let covered: i64 = conn.query_row(
        &format!("SELECT COUNT(DISTINCT lot_uuid) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(covered as u64)
}

/// A bounded measurement column.
#[derive(Debug, Clone, Copy)]
pub struct RangeRule {
    pub code: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub min: f64,
    pub max: f64,
    /// Extra `WHERE` predicate selecting the rows the rule applies to.
    pub filter: Option<&'static str>,
}

const fn range(
    code: &'static str,
    table: &'static str,
    column: &'static str,
    min: f64,
    max: f64,
) -> RangeRule {
    RangeRule {
        code,
        table,
        column,
        min,
        max,
        filter: None,
    }
}

pub const RANGE_RULES: &[RangeRule] = &[
    range("ph_range", "milk_quality_tests", "ph", 4.0, 8.0),
    range("ph_range", "coagulation_records", "ph_at_cutting", 4.0, 8.0),
    range("ph_range", "pressing_records", "final_ph", 4.0, 8.0),
    RangeRule {
        filter: Some("method_code = 'PH'"),
        ..range("ph_range", "quality_tests", "result_value", 4.0, 8.0)
    },
    range("temperature_range", "raw_material_lots", "storage_temperature_c", 0.0, 100.0),
    range("temperature_range", "milk_quality_tests", "temperature_c", 0.0, 100.0),
    range("temperature_range", "pasteurization_batches", "target_temperature_c", 0.0, 100.0),
    range("temperature_range", "pasteurization_batches", "actual_temperature_c", 0.0, 100.0),
    range("temperature_range", "standardization_records", "temperature_c", 0.0, 100.0),
    range("temperature_range", "coagulation_records", "milk_temperature_c", 0.0, 100.0),
    range("temperature_range", "curd_processing_records", "curd_temperature_c", 0.0, 100.0),
    range("temperature_range", "manufacturing_batches", "temperature_c", 0.0, 100.0),
    range("temperature_range", "aging_caves", "target_temperature_c", 0.0, 100.0),
    range("temperature_range", "environmental_monitoring", "temperature_c", 0.0, 100.0),
    range("temperature_range", "microbiology_tests", "incubation_temperature_c", 0.0, 100.0),
    range("temperature_range", "temperature_monitoring", "temperature_c", 0.0, 100.0),
    range("temperature_range", "delivery_confirmations", "temperature_on_arrival_c", 0.0, 100.0),
    range("duration_range", "pasteurization_batches", "duration_minutes", 10.0, 20.0),
    range("duration_range", "coagulation_records", "coagulation_minutes", 30.0, 60.0),
    RangeRule {
        filter: Some("step_name = 'COAGULATION'"),
        ..range("duration_range", "manufacturing_batches", "duration_minutes", 30.0, 60.0)
    },
];

/// Measurements fall inside their physical bounds.
pub fn value_ranges(conn: &Connection, rules: &[RangeRule]) -> Result<CheckOutcome, EvalError> {
    let mut outcome = CheckOutcome::default();
    for rule in rules {
        outcome.merge(check_range(conn, rule)?);
    }
    Ok(outcome)
}

fn check_range(conn: &Connection, rule: &RangeRule) -> Result<CheckOutcome, EvalError> {
    let table = quote_ident(rule.table);
    let column = quote_ident(rule.column);
    let scope = rule.filter.unwrap_or("1 = 1");

    let mut outcome = CheckOutcome::default();
    let checked: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {scope}"),
        [],
        |row| row.get(0),
    )?;
    outcome.stats.checked = checked as u64;

    let out_of_range: Vec<(i64, f64)> = collect(
        conn,
        &format!(
            "SELECT rowid, {column} FROM {table} \
             WHERE ({scope}) AND ({column} < ?1 OR {column} > ?2) ORDER BY rowid"
        ),
        [rule.min, rule.max],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    for (rowid, value) in out_of_range {
        outcome.push(
            Violation::new(
                rule.code,
                format!("{}.{}", rule.table, rule.column),
                format!("outside [{}, {}]", rule.min, rule.max),
            )
            .at_row(rowid)
            .with_example(value.to_string()),
        );
    }
    Ok(outcome)
}

/// An ordering constraint between dates of related rows. `condition`
/// selects the offending rows of `table` (aliased `x`, with the owning lot
/// joined as `l` when `join_lot` is set).
#[derive(Debug, Clone, Copy)]
pub struct ChronologyRule {
    pub code: &'static str,
    pub table: &'static str,
    pub join_lot: bool,
    pub condition: &'static str,
    pub example: &'static str,
    pub message: &'static str,
}

pub const CHRONOLOGY_RULES: &[ChronologyRule] = &[
    ChronologyRule {
        code: "aging_before_lot",
        table: "aging_lots",
        join_lot: true,
        condition: "x.aging_start_date < l.lot_date",
        example: "l.lot_number || ' ' || x.aging_start_date",
        message: "aging starts before the lot was made",
    },
    ChronologyRule {
        code: "batch_before_lot",
        table: "cheese_manufacturing_batches",
        join_lot: true,
        condition: "substr(x.batch_start, 1, 10) < l.lot_date",
        example: "l.lot_number || ' ' || x.batch_start",
        message: "batch starts before the lot date",
    },
    // Packaging waits for the minimum ripening period of 25 days.
    ChronologyRule {
        code: "packaging_too_early",
        table: "packaging_operations",
        join_lot: true,
        condition: "julianday(x.packaging_date) - julianday(l.lot_date) < 25",
        example: "l.lot_number || ' ' || x.packaging_date",
        message: "packaged less than 25 days after the lot date",
    },
    ChronologyRule {
        code: "pickup_before_packaging",
        table: "shipments",
        join_lot: true,
        condition: "x.pickup_date <= (SELECT MAX(o.packaging_date) FROM packaging_operations o \
                    WHERE o.lot_uuid = x.lot_uuid)",
        example: "l.lot_number || ' ' || x.pickup_date",
        message: "picked up before the lot was packaged",
    },
    ChronologyRule {
        code: "cutting_before_rennet",
        table: "coagulation_records",
        join_lot: false,
        condition: "x.cutting_time <= x.rennet_added_at",
        example: "x.cutting_time",
        message: "curd cut before rennet was added",
    },
    ChronologyRule {
        code: "best_before_not_after_production",
        table: "labeling_regulatory",
        join_lot: false,
        condition: "x.best_before_date <= x.production_date",
        example: "x.best_before_date",
        message: "best-before date is not after production",
    },
];

/// Process steps happen in order.
pub fn chronology(conn: &Connection, rules: &[ChronologyRule]) -> Result<CheckOutcome, EvalError> {
    let mut outcome = CheckOutcome::default();
    for rule in rules {
        let join = if rule.join_lot {
            "JOIN lot_master l ON l.lot_uuid = x.lot_uuid"
        } else {
            ""
        };
        let table = quote_ident(rule.table);
        let checked: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} x {join}"),
            [],
            |row| row.get(0),
        )?;
        outcome.stats.checked += checked as u64;

        let offending: Vec<(i64, String)> = collect(
            conn,
            &format!(
                "SELECT x.rowid, {example} FROM {table} x {join} WHERE {condition} ORDER BY x.rowid",
                example = rule.example,
                condition = rule.condition,
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        for (rowid, example) in offending {
            outcome.push(
                Violation::new(rule.code, rule.table, rule.message)
                    .at_row(rowid)
                    .with_example(example),
            );
        }
    }
    Ok(outcome)
}

fn collect<T, P, F>(conn: &Connection, sql: &str, params: P, map: F) -> Result<Vec<T>, EvalError>
where
    P: Params,
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot_store(rows: &[(&str, &str)]) -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE lot_master (lot_uuid TEXT PRIMARY KEY, lot_number TEXT, lot_date TEXT);",
        )
        .expect("create");
        for (idx, (number, date)) in rows.iter().enumerate() {
            conn.execute(
                "INSERT INTO lot_master VALUES (?1, ?2, ?3)",
                rusqlite::params![format!("u{idx}"), number, date],
            )
            .expect("insert");
        }
        conn
    }

    #[test]
    fn clean_lots_pass() {
        let conn = lot_store(&[
            ("TAL-2024-01-01", "2024-01-01"),
            ("TAL-2024-01-02", "2024-01-02"),
        ]);
        let outcome = lot_numbers(&conn, "TAL").expect("check");
        assert_eq!(outcome.stats.checked, 2);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn flags_bad_numbers_and_gaps() {
        let conn = lot_store(&[
            ("TAL-2024-01-01", "2024-01-01"),
            ("TAL-2024-01-09", "2024-01-03"),
            ("tal_20240104", "2024-01-04"),
            ("BRI-2024-01-05", "2024-01-05"),
            ("TAL-2024-01-08", "2024-01-08"),
        ]);
        let outcome = lot_numbers(&conn, "TAL").expect("check");
        let codes: BTreeSet<&str> = outcome.violations.iter().map(|v| v.code.as_str()).collect();
        assert!(codes.contains("lot_number_date"));
        assert!(codes.contains("lot_number_format"));
        assert!(codes.contains("lot_number_prefix"));
        assert!(codes.contains("lot_date_gap"));
        assert_eq!(outcome.stats.violations as usize, outcome.violations.len());
    }

    #[test]
    fn range_rule_honors_filter() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(
            "CREATE TABLE quality_tests (method_code TEXT, result_value REAL);
             INSERT INTO quality_tests VALUES ('PH', 5.4), ('PH', 9.1), ('TPC', 50000.0);",
        )
        .expect("seed");
        let rules: Vec<RangeRule> = RANGE_RULES
            .iter()
            .copied()
            .filter(|rule| rule.table == "quality_tests")
            .collect();
        let outcome = value_ranges(&conn, &rules).expect("check");
        assert_eq!(outcome.stats.checked, 2);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].row_index, Some(2));
        assert_eq!(outcome.violations[0].example.as_deref(), Some("9.1"));
    }
}
