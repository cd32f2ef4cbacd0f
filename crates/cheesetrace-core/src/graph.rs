use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::StoreSchema;

/// Summary of FK graph structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for FK dependency ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FkGraphReport {
    pub summary: FkGraphSummary,
    /// Parents before children, when the graph is acyclic.
    pub topo_order: Option<Vec<String>>,
    pub cycle: Option<Vec<String>>,
}

/// Build a deterministic FK dependency report for the store's base tables.
pub fn build_fk_graph_report(schema: &StoreSchema) -> FkGraphReport {
    let graph = build_adjacency(schema);
    let nodes = graph.len();
    let edges = graph.values().map(|targets| targets.len()).sum();
    let summary = FkGraphSummary { nodes, edges };

    match toposort(&graph) {
        Ok(order) => FkGraphReport {
            summary,
            topo_order: Some(order),
            cycle: None,
        },
        Err(cycle) => FkGraphReport {
            summary,
            topo_order: None,
            cycle: Some(cycle),
        },
    }
}

/// Edges point from the referenced table to the referencing table.
fn build_adjacency(schema: &StoreSchema) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for table in schema.base_tables() {
        graph.entry(table.name.clone()).or_default();
        for fk in &table.foreign_keys {
            // A self reference never blocks ordering of inserts.
            if fk.referenced_table == table.name {
                continue;
            }
            graph
                .entry(fk.referenced_table.clone())
                .or_default()
                .insert(table.name.clone());
        }
    }

    graph
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> =
        graph.keys().map(|node| (node.as_str(), 0)).collect();
    for targets in graph.values() {
        for target in targets {
            *indegree.entry(target.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());
        if let Some(targets) = graph.get(node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target.as_str());
                    }
                }
            }
        }
    }

    if order.len() == indegree.len() {
        Ok(order)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(node, _)| node.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKey, Table, TableKind};

    fn fk(target: &str) -> ForeignKey {
        ForeignKey {
            columns: vec!["lot_uuid".to_string()],
            referenced_table: target.to_string(),
            referenced_columns: vec!["lot_uuid".to_string()],
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
        }
    }

    fn table(name: &str, fks: Vec<ForeignKey>) -> Table {
        Table {
            name: name.to_string(),
            kind: TableKind::Table,
            columns: Vec::new(),
            foreign_keys: fks,
            indexes: Vec::new(),
        }
    }

    fn schema(tables: Vec<Table>) -> StoreSchema {
        StoreSchema {
            schema_version: "0.1".to_string(),
            engine: "sqlite".to_string(),
            database: None,
            tables,
        }
    }

    #[test]
    fn toposort_orders_lot_before_dependents() {
        let report = build_fk_graph_report(&schema(vec![
            table("shipments", vec![fk("lot_master")]),
            table("lot_master", Vec::new()),
            table("quality_tests", vec![fk("lot_master")]),
        ]));
        let order = report.topo_order.expect("expected toposort");
        assert_eq!(order[0], "lot_master");
        assert_eq!(report.summary.edges, 2);
    }

    #[test]
    fn toposort_reports_cycle() {
        let report = build_fk_graph_report(&schema(vec![
            table("a", vec![fk("b")]),
            table("b", vec![fk("a")]),
        ]));
        assert!(report.topo_order.is_none());
        let cycle = report.cycle.expect("cycle");
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
    }

    #[test]
    fn self_reference_is_not_a_cycle() {
        let report = build_fk_graph_report(&schema(vec![table("lot_master", vec![fk("lot_master")])]));
        assert_eq!(report.topo_order, Some(vec!["lot_master".to_string()]));
    }
}
