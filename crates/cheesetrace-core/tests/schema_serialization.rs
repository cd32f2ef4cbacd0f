use cheesetrace_core::{Column, StoreSchema, Table, TableKind};
use schemars::schema_for;

fn lot_master() -> Table {
    Table {
        name: "lot_master".to_string(),
        kind: TableKind::Table,
        columns: vec![Column {
            ordinal_position: 0,
            name: "lot_uuid".to_string(),
            declared_type: "TEXT".to_string(),
            is_nullable: true,
            default: None,
            is_primary_key: true,
        }],
        foreign_keys: Vec::new(),
        indexes: Vec::new(),
    }
}

#[test]
fn serializes_schema_deterministically() {
    let schema = StoreSchema {
        schema_version: "0.1".to_string(),
        engine: "sqlite".to_string(),
        database: Some("cheese.db".to_string()),
        tables: Vec::new(),
    };

    let json = serde_json::to_string_pretty(&schema).expect("serialize schema");
    let expected = r#"{
  "schema_version": "0.1",
  "engine": "sqlite",
  "database": "cheese.db",
  "tables": []
}"#;
    assert_eq!(json, expected);
}

#[test]
fn table_kind_serializes_snake_case() {
    let json = serde_json::to_value(lot_master()).expect("serialize table");
    assert_eq!(json["kind"], "table");
    assert_eq!(json["columns"][0]["is_primary_key"], true);
}

#[test]
fn json_schema_describes_tables() {
    let generated = schema_for!(StoreSchema);
    let json = serde_json::to_value(&generated).expect("serialize generated schema");
    let properties = json["properties"].as_object().expect("properties");
    assert!(properties.contains_key("tables"));
    assert!(properties.contains_key("schema_version"));
}

#[test]
fn validate_rejects_dangling_foreign_key() {
    let mut child = lot_master();
    child.name = "shipments".to_string();
    child.foreign_keys.push(cheesetrace_core::ForeignKey {
        columns: vec!["lot_uuid".to_string()],
        referenced_table: "lot_master".to_string(),
        referenced_columns: vec!["lot_uuid".to_string()],
        on_update: "NO ACTION".to_string(),
        on_delete: "NO ACTION".to_string(),
    });

    let broken = StoreSchema {
        schema_version: "0.1".to_string(),
        engine: "sqlite".to_string(),
        database: None,
        tables: vec![child.clone()],
    };
    assert!(broken.validate().is_err());

    let fixed = StoreSchema {
        tables: vec![lot_master(), child],
        ..broken
    };
    assert!(fixed.validate().is_ok());
}
