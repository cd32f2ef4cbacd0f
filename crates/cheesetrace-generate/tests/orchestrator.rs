use cheesetrace_core::{DateRange, GenerationContext, Subsystem};
use cheesetrace_generate::{
    GenerateOptions, GenerationError, Orchestrator, RunState, Stage, StageEnv, default_stages,
};
use cheesetrace_store::{Connection, SchemaSource, open_in_memory};
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn generate(days: u32, seed: u64) -> (Connection, cheesetrace_generate::GenerationReport) {
    let conn = open_in_memory().expect("open store");
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, days)).expect("range");
    let options = GenerateOptions {
        seed,
        ..GenerateOptions::default()
    };
    let report = Orchestrator::new(options)
        .run_on(&conn, range, &SchemaSource::Embedded)
        .expect("generation run");
    (conn, report)
}

fn scalar(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("scalar query")
}

fn dump(conn: &Connection, sql: &str) -> Vec<String> {
    let mut stmt = conn.prepare(sql).expect("prepare");
    let columns = stmt.column_count();
    stmt.query_map([], |row| {
        let mut fields = Vec::with_capacity(columns);
        for idx in 0..columns {
            let value: rusqlite::types::Value = row.get(idx)?;
            fields.push(format!("{value:?}"));
        }
        Ok(fields.join("|"))
    })
    .expect("query")
    .collect::<Result<Vec<_>, _>>()
    .expect("rows")
}

#[test]
fn three_days_yield_three_lots_referenced_by_every_stage() {
    let (conn, report) = generate(3, 42);

    assert!(report.failures.is_empty(), "failures: {:?}", report.failures);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM lot_master"), 3);
    let (min, max): (String, String) = conn
        .query_row("SELECT MIN(lot_date), MAX(lot_date) FROM lot_master", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .expect("date bounds");
    assert_eq!(min, "2024-01-01");
    assert_eq!(max, "2024-01-03");

    for table in [
        "manufacturing_batches",
        "quality_tests",
        "sensory_evaluations",
        "packaging_operations",
    ] {
        let distinct = scalar(
            &conn,
            &format!(
                "SELECT COUNT(DISTINCT t.lot_uuid) FROM {table} t \
                 JOIN lot_master l ON l.lot_uuid = t.lot_uuid"
            ),
        );
        assert_eq!(distinct, 3, "{table} does not cover every lot");
    }
}

#[test]
fn five_day_run_populates_every_primary_table() {
    let (conn, report) = generate(5, 42);

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.lots_processed, 5);
    for subsystem in Subsystem::ALL {
        let table = subsystem.primary_table();
        let rows = scalar(&conn, &format!("SELECT COUNT(*) FROM {table}"));
        assert!(rows > 0, "{table} is empty");
        assert_eq!(report.table_counts.get(table).copied(), Some(rows as u64));
        assert_eq!(report.stages[subsystem.id()].invocations, 5);
    }
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM lot_master WHERE is_fixture = 1"), 0);
}

#[test]
fn lot_numbers_follow_prefix_and_date() {
    let (conn, _) = generate(4, 7);
    let bad = scalar(
        &conn,
        "SELECT COUNT(*) FROM lot_master WHERE lot_number <> 'TAL-' || lot_date",
    );
    assert_eq!(bad, 0);
    assert_eq!(
        scalar(&conn, "SELECT COUNT(DISTINCT lot_number) FROM lot_master"),
        4
    );
}

#[test]
fn measured_values_stay_in_physical_ranges() {
    let (conn, _) = generate(5, 11);

    for (table, column) in [
        ("milk_quality_tests", "ph"),
        ("coagulation_records", "ph_at_cutting"),
        ("pressing_records", "final_ph"),
    ] {
        let out = scalar(
            &conn,
            &format!("SELECT COUNT(*) FROM {table} WHERE {column} < 4.0 OR {column} > 8.0"),
        );
        assert_eq!(out, 0, "{table}.{column} out of pH range");
    }
    let ph_results = scalar(
        &conn,
        "SELECT COUNT(*) FROM quality_tests WHERE method_code = 'PH' \
         AND (result_value < 4.0 OR result_value > 8.0)",
    );
    assert_eq!(ph_results, 0);

    for (table, column) in [
        ("raw_material_lots", "storage_temperature_c"),
        ("milk_quality_tests", "temperature_c"),
        ("standardization_records", "temperature_c"),
        ("pasteurization_batches", "actual_temperature_c"),
        ("coagulation_records", "milk_temperature_c"),
        ("curd_processing_records", "curd_temperature_c"),
        ("manufacturing_batches", "temperature_c"),
        ("environmental_monitoring", "temperature_c"),
        ("microbiology_tests", "incubation_temperature_c"),
        ("temperature_monitoring", "temperature_c"),
        ("delivery_confirmations", "temperature_on_arrival_c"),
    ] {
        let out = scalar(
            &conn,
            &format!("SELECT COUNT(*) FROM {table} WHERE {column} < 0 OR {column} > 100"),
        );
        assert_eq!(out, 0, "{table}.{column} out of temperature range");
    }

    assert_eq!(
        scalar(
            &conn,
            "SELECT COUNT(*) FROM pasteurization_batches \
             WHERE duration_minutes < 10 OR duration_minutes > 20"
        ),
        0
    );
    assert_eq!(
        scalar(
            &conn,
            "SELECT COUNT(*) FROM coagulation_records \
             WHERE coagulation_minutes < 30 OR coagulation_minutes > 60"
        ),
        0
    );
    assert_eq!(
        scalar(
            &conn,
            "SELECT COUNT(*) FROM manufacturing_batches WHERE step_name = 'COAGULATION' \
             AND (duration_minutes < 30 OR duration_minutes > 60)"
        ),
        0
    );
}

#[test]
fn process_steps_are_chronological() {
    let (conn, _) = generate(5, 3);

    let early_aging = scalar(
        &conn,
        "SELECT COUNT(*) FROM aging_lots a JOIN lot_master l ON l.lot_uuid = a.lot_uuid \
         WHERE a.aging_start_date < l.lot_date",
    );
    assert_eq!(early_aging, 0);

    let early_packaging = scalar(
        &conn,
        "SELECT COUNT(*) FROM packaging_operations o JOIN lot_master l ON l.lot_uuid = o.lot_uuid \
         WHERE julianday(o.packaging_date) - julianday(l.lot_date) < 25",
    );
    assert_eq!(early_packaging, 0);

    let early_shipping = scalar(
        &conn,
        "SELECT COUNT(*) FROM shipments s \
         WHERE s.pickup_date <= (SELECT MAX(o.packaging_date) FROM packaging_operations o \
                                 WHERE o.lot_uuid = s.lot_uuid)",
    );
    assert_eq!(early_shipping, 0);

    let cutting_before_rennet = scalar(
        &conn,
        "SELECT COUNT(*) FROM coagulation_records WHERE cutting_time <= rennet_added_at",
    );
    assert_eq!(cutting_before_rennet, 0);

    let out_of_order_events = scalar(
        &conn,
        "SELECT COUNT(*) FROM critical_tracking_events a JOIN critical_tracking_events b \
         ON a.tlc_uuid = b.tlc_uuid \
         WHERE a.event_type = 'CREATION' AND b.event_type = 'INITIAL_PACKING' \
         AND b.event_time <= a.event_time",
    );
    assert_eq!(out_of_order_events, 0);

    let inventory_off_weighing_day = scalar(
        &conn,
        "SELECT COUNT(*) FROM inventory_transactions i JOIN weighing_pricing w \
         ON w.lot_uuid = i.lot_uuid \
         WHERE i.transaction_date <> substr(w.weighed_at, 1, 10)",
    );
    assert_eq!(inventory_off_weighing_day, 0);
    let inventory_on_lot_day = scalar(
        &conn,
        "SELECT COUNT(*) FROM inventory_transactions i JOIN lot_master l \
         ON l.lot_uuid = i.lot_uuid WHERE i.transaction_date = l.lot_date",
    );
    assert_eq!(inventory_on_lot_day, 0);
}

#[test]
fn same_seed_reproduces_the_store() {
    let (first, _) = generate(3, 99);
    let (second, _) = generate(3, 99);
    let (other, _) = generate(3, 100);

    for sql in [
        "SELECT * FROM lot_master ORDER BY lot_number",
        "SELECT * FROM shipments ORDER BY tracking_number",
        "SELECT * FROM quality_tests ORDER BY test_uuid",
        "SELECT * FROM aging_activities ORDER BY activity_uuid",
    ] {
        assert_eq!(dump(&first, sql), dump(&second, sql), "{sql}");
    }
    assert_ne!(
        dump(&first, "SELECT * FROM lot_master ORDER BY lot_number"),
        dump(&other, "SELECT * FROM lot_master ORDER BY lot_number")
    );
}

#[test]
fn run_replaces_an_existing_store_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cheese.db");
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).expect("range");
    let orchestrator = Orchestrator::new(GenerateOptions::default()).with_run_id("fixed-run");

    orchestrator
        .run(&path, range, &SchemaSource::Embedded)
        .expect("first run");
    let report = orchestrator
        .run(&path, range, &SchemaSource::Embedded)
        .expect("second run");

    assert_eq!(report.run_id, "fixed-run");
    assert_eq!(report.table_counts["lot_master"], 2);
    let conn = cheesetrace_store::open_store(&path).expect("reopen");
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM lot_master"), 2);
}

struct BrokenStage;

impl Stage for BrokenStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Labeling
    }

    fn id(&self) -> &'static str {
        "broken"
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        env.lot(ctx)?;
        Err(GenerationError::MissingReference("always broken".to_string()))
    }
}

#[test]
fn a_failing_stage_does_not_stop_the_run() {
    let conn = open_in_memory().expect("open store");
    let mut stages = default_stages();
    stages.insert(3, Box::new(BrokenStage));
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 3)).expect("range");

    let report = Orchestrator::with_stages(GenerateOptions::default(), stages)
        .run_on(&conn, range, &SchemaSource::Embedded)
        .expect("run completes");

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.stage == "broken"));
    assert_eq!(report.stages["broken"].failures, 3);
    // Stages after the broken one still ran for every date.
    assert!(scalar(&conn, "SELECT COUNT(*) FROM shipments") > 0);
    assert_eq!(
        scalar(&conn, "SELECT COUNT(DISTINCT lot_uuid) FROM labeling_regulatory"),
        3
    );
}

struct NeedsUnknownTable;

impl Stage for NeedsUnknownTable {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Shipping
    }

    fn id(&self) -> &'static str {
        "customs"
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &["customs_declarations"]
    }

    fn populate(&self, _: &mut StageEnv<'_>, _: &GenerationContext) -> Result<(), GenerationError> {
        Ok(())
    }
}

#[test]
fn missing_table_aborts_before_any_date() {
    let conn = open_in_memory().expect("open store");
    let mut stages = default_stages();
    stages.push(Box::new(NeedsUnknownTable));
    let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 2)).expect("range");

    let err = Orchestrator::with_stages(GenerateOptions::default(), stages)
        .run_on(&conn, range, &SchemaSource::Embedded)
        .unwrap_err();

    match err {
        GenerationError::MissingTables { stage, tables } => {
            assert_eq!(stage, "customs");
            assert_eq!(tables, vec!["customs_declarations".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM lot_master"), 0);
}
