//! Structural metrics for an introspected store, written by `inspect --metrics`.

use serde::Serialize;

use cheesetrace_core::tables::{TABLES, lot_owned_tables};
use cheesetrace_core::{StoreSchema, Subsystem, build_fk_graph_report};

#[derive(Debug, Clone, Serialize)]
pub struct SchemaMetrics {
    pub schema_version: String,
    pub counts: SchemaCounts,
    pub subsystems: Vec<SubsystemTables>,
    pub lot_links: LotLinks,
    /// Parents before children; `None` when the foreign keys form a cycle.
    pub load_order: Option<Vec<String>>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaCounts {
    pub tables: usize,
    pub views: usize,
    pub columns: usize,
    pub foreign_keys: usize,
    pub indexes: usize,
    pub unique_indexes: usize,
}

/// Catalog tables of one subsystem and which of them the store lacks.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemTables {
    pub subsystem: Subsystem,
    pub expected: usize,
    pub missing: Vec<String>,
}

/// Lot-owned tables and whether their `lot_uuid` is declared as a
/// foreign key to `lot_master`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LotLinks {
    pub linked: Vec<String>,
    pub unlinked: Vec<String>,
}

pub fn collect_schema_metrics(schema: &StoreSchema) -> SchemaMetrics {
    let mut counts = SchemaCounts {
        views: schema.views().count(),
        ..SchemaCounts::default()
    };
    let mut warnings = Vec::new();

    for table in schema.base_tables() {
        counts.tables += 1;
        counts.columns += table.columns.len();
        counts.foreign_keys += table.foreign_keys.len();
        counts.indexes += table.indexes.len();
        counts.unique_indexes += table.indexes.iter().filter(|index| index.is_unique).count();

        if !table.columns.iter().any(|col| col.is_primary_key) {
            warnings.push(format!("table '{}' has no primary key", table.name));
        }
        for fk in &table.foreign_keys {
            if schema.table(&fk.referenced_table).is_none() {
                warnings.push(format!(
                    "table '{}' references unknown table '{}'",
                    table.name, fk.referenced_table
                ));
            }
        }
    }

    let subsystems: Vec<SubsystemTables> = Subsystem::ALL
        .into_iter()
        .map(|subsystem| {
            let names = subsystem.table_names();
            SubsystemTables {
                subsystem,
                expected: names.len(),
                missing: names
                    .into_iter()
                    .filter(|name| schema.table(name).is_none())
                    .map(str::to_string)
                    .collect(),
            }
        })
        .collect();
    for entry in &subsystems {
        if !entry.missing.is_empty() {
            warnings.push(format!(
                "{} is missing {}",
                entry.subsystem.id(),
                entry.missing.join(", ")
            ));
        }
    }

    let mut lot_links = LotLinks::default();
    for spec in lot_owned_tables() {
        let Some(table) = schema.table(spec.name) else {
            continue;
        };
        let linked = table.foreign_keys.iter().any(|fk| {
            fk.referenced_table == "lot_master" && fk.columns.iter().any(|c| c == "lot_uuid")
        });
        if linked {
            lot_links.linked.push(spec.name.to_string());
        } else {
            lot_links.unlinked.push(spec.name.to_string());
        }
    }

    let extra = schema
        .base_tables()
        .filter(|table| !TABLES.iter().any(|spec| spec.name == table.name))
        .count();
    if extra > 0 {
        warnings.push(format!("{extra} table(s) outside the catalog"));
    }

    let graph = build_fk_graph_report(schema);
    if let Some(cycle) = &graph.cycle {
        warnings.push(format!("foreign key cycle: {}", cycle.join(" -> ")));
    }

    SchemaMetrics {
        schema_version: schema.schema_version.clone(),
        counts,
        subsystems,
        lot_links,
        load_order: graph.topo_order,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cheesetrace_core::{Column, ForeignKey, Table, TableKind};

    fn column(name: &str, pk: bool) -> Column {
        Column {
            ordinal_position: 0,
            name: name.to_string(),
            declared_type: "TEXT".to_string(),
            is_nullable: !pk,
            default: None,
            is_primary_key: pk,
        }
    }

    fn table(name: &str, columns: Vec<Column>, foreign_keys: Vec<ForeignKey>) -> Table {
        Table {
            name: name.to_string(),
            kind: TableKind::Table,
            columns,
            foreign_keys,
            indexes: Vec::new(),
        }
    }

    #[test]
    fn reports_missing_subsystem_tables_and_lot_links() {
        let lot_fk = ForeignKey {
            columns: vec!["lot_uuid".to_string()],
            referenced_table: "lot_master".to_string(),
            referenced_columns: vec!["lot_uuid".to_string()],
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
        };
        let schema = StoreSchema {
            schema_version: "0.1".to_string(),
            engine: "sqlite".to_string(),
            database: None,
            tables: vec![
                table("aging_lots", vec![column("aging_lot_uuid", true), column("lot_uuid", false)], vec![]),
                table("lot_master", vec![column("lot_uuid", true)], vec![]),
                table("quality_tests", vec![column("test_uuid", true), column("lot_uuid", false)], vec![lot_fk]),
            ],
        };

        let metrics = collect_schema_metrics(&schema);
        assert_eq!(metrics.counts.tables, 3);
        assert_eq!(metrics.lot_links.linked, vec!["quality_tests".to_string()]);
        assert_eq!(metrics.lot_links.unlinked, vec!["aging_lots".to_string()]);

        let core = &metrics.subsystems[0];
        assert_eq!(core.subsystem, Subsystem::Core);
        assert_eq!(core.missing, vec!["batch_genealogy".to_string()]);
        assert!(metrics.warnings.iter().any(|w| w.starts_with("shipping is missing")));
        assert!(metrics.load_order.is_some());
    }
}
