use std::fs;

use cheesetrace_core::tables::{Subsystem, all_table_names};
use cheesetrace_store::{
    REQUIRED_FILES, SchemaSource, StoreError, apply_indexes, introspect_store, load_schema,
    lot_traceability, open_in_memory, require_tables, reset_store, table_counts,
};

#[test]
fn embedded_schema_creates_every_cataloged_table() {
    let conn = open_in_memory().expect("open");
    let report = load_schema(&conn, &SchemaSource::Embedded).expect("load schema");

    assert_eq!(report.files_applied.len(), REQUIRED_FILES.len());
    assert_eq!(report.views, 3);
    assert!(report.indexes >= 20);

    let all: Vec<&str> = all_table_names().collect();
    require_tables(&conn, &all).expect("all cataloged tables exist");
    assert_eq!(report.tables, all.len());

    let counts = table_counts(&conn).expect("counts");
    assert_eq!(counts.total_rows(), 0);
    assert_eq!(counts.empty_tables().len(), all.len());
}

#[test]
fn index_phase_can_be_reapplied() {
    let conn = open_in_memory().expect("open");
    load_schema(&conn, &SchemaSource::Embedded).expect("load schema");
    let applied = apply_indexes(&conn, &SchemaSource::Embedded).expect("reapply indexes");
    assert_eq!(applied, 1);
}

#[test]
fn reloading_tables_into_a_loaded_store_fails_fast() {
    let conn = open_in_memory().expect("open");
    load_schema(&conn, &SchemaSource::Embedded).expect("load schema");
    let err = load_schema(&conn, &SchemaSource::Embedded).unwrap_err();
    match err {
        StoreError::SchemaStatement { file, .. } => assert_eq!(file, REQUIRED_FILES[0]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn directory_source_requires_every_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (idx, file) in SchemaSource::Embedded.files().expect("files").into_iter().enumerate() {
        // Leave out the sensory file.
        if idx == 6 {
            continue;
        }
        fs::write(dir.path().join(&file.name), file.sql.as_bytes()).expect("write sql");
    }

    let conn = open_in_memory().expect("open");
    let err = load_schema(&conn, &SchemaSource::Directory(dir.path().to_path_buf())).unwrap_err();
    match err {
        StoreError::MissingSchemaFile { name, .. } => assert_eq!(name, "07_sensory_analysis.sql"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn directory_source_applies_files_in_numeric_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    for file in SchemaSource::Embedded.files().expect("files") {
        fs::write(dir.path().join(&file.name), file.sql.as_bytes()).expect("write sql");
    }
    fs::write(dir.path().join("README.txt"), "not sql").expect("write readme");

    let conn = open_in_memory().expect("open");
    let report =
        load_schema(&conn, &SchemaSource::Directory(dir.path().to_path_buf())).expect("load");
    assert_eq!(report.files_applied, REQUIRED_FILES);
}

#[test]
fn introspection_finds_lot_foreign_keys() {
    let conn = open_in_memory().expect("open");
    load_schema(&conn, &SchemaSource::Embedded).expect("load schema");
    let schema = introspect_store(&conn, None).expect("introspect");
    schema.validate().expect("foreign keys resolve");

    let shipments = schema.table("shipments").expect("shipments");
    assert!(
        shipments
            .foreign_keys
            .iter()
            .any(|fk| fk.referenced_table == "lot_master" && fk.columns == ["lot_uuid"])
    );
    assert!(schema.views().any(|view| view.name == "v_lot_traceability"));

    let lot_master = schema.table("lot_master").expect("lot_master");
    assert!(lot_master.indexes.iter().any(|idx| idx.is_unique && idx.columns == ["lot_number"]));

    for subsystem in Subsystem::ALL {
        assert!(schema.table(subsystem.primary_table()).is_some());
    }
}

#[test]
fn reset_store_replaces_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("cheese.db");

    {
        let conn = reset_store(&path).expect("create");
        load_schema(&conn, &SchemaSource::Embedded).expect("load schema");
    }
    assert!(path.is_file());

    let conn = reset_store(&path).expect("reset");
    let missing = cheesetrace_store::missing_tables(&conn, &["lot_master"]).expect("missing");
    assert_eq!(missing, vec!["lot_master".to_string()]);
    load_schema(&conn, &SchemaSource::Embedded).expect("reload after reset");
    assert!(lot_traceability(&conn, 10).expect("view").is_empty());
}
