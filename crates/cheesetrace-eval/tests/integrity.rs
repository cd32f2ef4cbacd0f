use cheesetrace_core::DateRange;
use cheesetrace_eval::{EvalError, Verifier, VerifyOptions, collect_schema_metrics};
use cheesetrace_generate::{GenerateOptions, Orchestrator};
use cheesetrace_store::{Connection, SchemaSource, StoreError, introspect_store, open_in_memory};
use chrono::NaiveDate;

fn generated(days: u32) -> Connection {
    let conn = open_in_memory().expect("open store");
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
    let end = NaiveDate::from_ymd_opt(2024, 1, days).expect("date");
    let range = DateRange::new(start, end).expect("range");
    Orchestrator::new(GenerateOptions::default())
        .run_on(&conn, range, &SchemaSource::Embedded)
        .expect("generation run");
    conn
}

fn tamper(conn: &Connection, sql: &str) {
    conn.execute_batch(&format!("PRAGMA foreign_keys = OFF; {sql}; PRAGMA foreign_keys = ON;"))
        .expect("tamper");
}

fn verify(conn: &Connection) -> cheesetrace_eval::VerificationResult {
    Verifier::new(VerifyOptions::default())
        .run(conn, None)
        .expect("verification")
}

#[test]
fn generated_store_passes_every_check() {
    let conn = generated(5);
    let result = verify(&conn);

    assert!(result.passed(), "violations: {:#?}", result.violations);
    let checks = &result.metrics.checks;
    assert_eq!(checks.lot_numbers.checked, 5);
    assert!(checks.foreign_keys.checked > 0);
    // Nine primary tables hang off a lot; raw materials and the lot table do not.
    assert_eq!(checks.coverage.checked, 5 * 9);
    assert!(checks.ranges.checked > 0);
    assert!(checks.chronology.checked > 0);
    assert_eq!(result.metrics.lots, 5);
    assert_eq!(result.metrics.fixture_lots, 0);

    let quality = result
        .metrics
        .tables
        .iter()
        .find(|table| table.table == "quality_tests")
        .expect("quality metrics");
    assert_eq!(quality.lots_covered, Some(5));
}

#[test]
fn orphaned_reference_is_reported() {
    let conn = generated(2);
    tamper(
        &conn,
        "UPDATE quality_tests SET lot_uuid = 'no-such-lot' \
         WHERE rowid = (SELECT MIN(rowid) FROM quality_tests)",
    );

    let result = verify(&conn);
    let orphans: Vec<_> = result.by_code("fk_orphan").collect();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].path, "quality_tests.lot_uuid");
    assert_eq!(orphans[0].example.as_deref(), Some("no-such-lot"));
}

#[test]
fn lot_without_stage_rows_is_reported() {
    let conn = generated(3);
    tamper(
        &conn,
        "DELETE FROM labeling_regulatory WHERE lot_uuid = \
         (SELECT lot_uuid FROM lot_master WHERE lot_date = '2024-01-02')",
    );

    let result = verify(&conn);
    let uncovered: Vec<_> = result.by_code("lot_coverage").collect();
    assert_eq!(uncovered.len(), 1);
    assert_eq!(uncovered[0].path, "labeling_regulatory");
    assert_eq!(uncovered[0].example.as_deref(), Some("TAL-2024-01-02"));
}

#[test]
fn missing_day_is_a_gap() {
    let conn = generated(3);
    tamper(&conn, "DELETE FROM lot_master WHERE lot_date = '2024-01-02'");

    let result = verify(&conn);
    assert_eq!(result.by_code("lot_date_gap").count(), 1);
    assert!(result.by_code("fk_orphan").count() > 0);
}

#[test]
fn out_of_range_and_out_of_order_values_are_reported() {
    let conn = generated(2);
    tamper(
        &conn,
        "UPDATE pressing_records SET final_ph = 9.5 WHERE rowid = 1; \
         UPDATE aging_lots SET aging_start_date = '2023-12-01' WHERE rowid = 1",
    );

    let result = verify(&conn);
    let ph: Vec<_> = result.by_code("ph_range").collect();
    assert_eq!(ph.len(), 1);
    assert_eq!(ph[0].path, "pressing_records.final_ph");
    assert_eq!(ph[0].row_index, Some(1));
    assert_eq!(result.by_code("aging_before_lot").count(), 1);
    assert!(result.report.contains("### ph_range (1)"));
    assert!(result.report.contains("- pressing_records.final_ph (rowid 1): "));
}

#[test]
fn strict_mode_fails_and_still_writes_outputs() {
    let conn = generated(2);
    tamper(&conn, "UPDATE coagulation_records SET coagulation_minutes = 90");
    let dir = tempfile::tempdir().expect("tempdir");

    let err = Verifier::new(VerifyOptions {
        strict: true,
        write_violations: true,
        out_dir: Some(dir.path().to_path_buf()),
        ..VerifyOptions::default()
    })
    .run(&conn, Some("memory".to_string()))
    .unwrap_err();

    assert!(matches!(err, EvalError::Violations(2)));
    let report = std::fs::read_to_string(dir.path().join("report.md")).expect("report");
    assert!(report.starts_with("# Cheesetrace Verification Report"));
    assert!(report.contains("- database: memory"));
    assert!(dir.path().join("metrics.json").exists());
    assert!(dir.path().join("violations.json").exists());
}

#[test]
fn empty_store_is_rejected() {
    let conn = open_in_memory().expect("open store");
    let err = Verifier::new(VerifyOptions::default())
        .run(&conn, None)
        .unwrap_err();
    assert!(matches!(err, EvalError::Store(StoreError::MissingTables(_))));
}

#[test]
fn schema_metrics_of_a_generated_store() {
    let conn = generated(1);
    let schema = introspect_store(&conn, None).expect("introspect");
    let metrics = collect_schema_metrics(&schema);

    assert!(metrics.warnings.is_empty(), "{:?}", metrics.warnings);
    assert!(metrics.subsystems.iter().all(|entry| entry.missing.is_empty()));
    assert_eq!(metrics.lot_links.linked.len(), 15);
    assert!(metrics.lot_links.unlinked.is_empty());

    let order = metrics.load_order.expect("acyclic");
    let position = |name: &str| order.iter().position(|table| table == name).expect(name);
    assert!(position("lot_master") < position("quality_tests"));
    assert!(position("shipments") < position("delivery_confirmations"));
}
