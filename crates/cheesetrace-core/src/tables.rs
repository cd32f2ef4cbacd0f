//! Catalog of the tables each subsystem owns.
//!
//! The schema files are the authority for table definitions; this catalog
//! only records ownership so stages can declare their preconditions and the
//! verifier can find lot-owned tables without parsing SQL.

use serde::{Deserialize, Serialize};

/// One subsystem per schema file and per generation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Core,
    RawMaterials,
    Preprocessing,
    Manufacturing,
    Aging,
    Quality,
    Sensory,
    Packaging,
    Labeling,
    Weighing,
    Shipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub subsystem: Subsystem,
    /// Whether each row carries the owning lot in a `lot_uuid` column.
    pub lot_owned: bool,
}

const fn table(name: &'static str, subsystem: Subsystem, lot_owned: bool) -> TableSpec {
    TableSpec {
        name,
        subsystem,
        lot_owned,
    }
}

pub const TABLES: &[TableSpec] = &[
    table("lot_master", Subsystem::Core, false),
    table("batch_genealogy", Subsystem::Core, false),
    table("suppliers", Subsystem::RawMaterials, false),
    table("supplier_certifications", Subsystem::RawMaterials, false),
    table("raw_material_lots", Subsystem::RawMaterials, false),
    table("milk_quality_tests", Subsystem::RawMaterials, false),
    table("ingredient_quality_tests", Subsystem::RawMaterials, false),
    table("pasteurization_batches", Subsystem::Preprocessing, true),
    table("standardization_records", Subsystem::Preprocessing, true),
    table("cheese_manufacturing_batches", Subsystem::Manufacturing, true),
    table("coagulation_records", Subsystem::Manufacturing, false),
    table("curd_processing_records", Subsystem::Manufacturing, false),
    table("pressing_records", Subsystem::Manufacturing, false),
    table("manufacturing_batches", Subsystem::Manufacturing, true),
    table("aging_caves", Subsystem::Aging, false),
    table("aging_lots", Subsystem::Aging, true),
    table("environmental_monitoring", Subsystem::Aging, false),
    table("aging_activities", Subsystem::Aging, false),
    table("wheel_positions", Subsystem::Aging, false),
    table("quality_test_methods", Subsystem::Quality, false),
    table("quality_tests", Subsystem::Quality, true),
    table("composition_tests", Subsystem::Quality, false),
    table("microbiology_tests", Subsystem::Quality, false),
    table("sensory_panels", Subsystem::Sensory, false),
    table("panelist_qualifications", Subsystem::Sensory, false),
    table("sensory_evaluations", Subsystem::Sensory, true),
    table("sensory_attributes", Subsystem::Sensory, false),
    table("packaging_lines", Subsystem::Packaging, false),
    table("packaging_materials", Subsystem::Packaging, false),
    table("product_labels", Subsystem::Packaging, false),
    table("packaging_operations", Subsystem::Packaging, true),
    table("packaging_runs", Subsystem::Packaging, true),
    table("individual_packages", Subsystem::Packaging, true),
    table("package_labels", Subsystem::Packaging, false),
    table("traceability_lot_codes", Subsystem::Packaging, true),
    table("critical_tracking_events", Subsystem::Packaging, false),
    table("labeling_regulatory", Subsystem::Labeling, true),
    table("weighing_equipment", Subsystem::Weighing, false),
    table("pricing_rules", Subsystem::Weighing, false),
    table("weighing_pricing", Subsystem::Weighing, true),
    table("catch_weight_transactions", Subsystem::Weighing, false),
    table("inventory_transactions", Subsystem::Weighing, true),
    table("shipping_carriers", Subsystem::Shipping, false),
    table("shipments", Subsystem::Shipping, true),
    table("shipment_contents", Subsystem::Shipping, false),
    table("temperature_monitoring", Subsystem::Shipping, false),
    table("delivery_confirmations", Subsystem::Shipping, false),
];

impl Subsystem {
    /// Generation order: the core lot first, then every dependent stage.
    pub const ALL: [Subsystem; 11] = [
        Subsystem::Core,
        Subsystem::RawMaterials,
        Subsystem::Preprocessing,
        Subsystem::Manufacturing,
        Subsystem::Aging,
        Subsystem::Quality,
        Subsystem::Sensory,
        Subsystem::Packaging,
        Subsystem::Labeling,
        Subsystem::Weighing,
        Subsystem::Shipping,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Subsystem::Core => "core",
            Subsystem::RawMaterials => "raw_materials",
            Subsystem::Preprocessing => "preprocessing",
            Subsystem::Manufacturing => "manufacturing",
            Subsystem::Aging => "aging",
            Subsystem::Quality => "quality",
            Subsystem::Sensory => "sensory",
            Subsystem::Packaging => "packaging",
            Subsystem::Labeling => "labeling",
            Subsystem::Weighing => "weighing",
            Subsystem::Shipping => "shipping",
        }
    }

    /// The table whose row count shows whether the stage ran at all.
    pub fn primary_table(self) -> &'static str {
        match self {
            Subsystem::Core => "lot_master",
            Subsystem::RawMaterials => "raw_material_lots",
            Subsystem::Preprocessing => "pasteurization_batches",
            Subsystem::Manufacturing => "cheese_manufacturing_batches",
            Subsystem::Aging => "aging_lots",
            Subsystem::Quality => "quality_tests",
            Subsystem::Sensory => "sensory_evaluations",
            Subsystem::Packaging => "packaging_operations",
            Subsystem::Labeling => "labeling_regulatory",
            Subsystem::Weighing => "weighing_pricing",
            Subsystem::Shipping => "shipments",
        }
    }

    pub fn tables(self) -> impl Iterator<Item = &'static TableSpec> {
        TABLES.iter().filter(move |spec| spec.subsystem == self)
    }

    pub fn table_names(self) -> Vec<&'static str> {
        self.tables().map(|spec| spec.name).collect()
    }
}

/// Names of every table in generation order.
pub fn all_table_names() -> impl Iterator<Item = &'static str> {
    TABLES.iter().map(|spec| spec.name)
}

/// Tables that reference the owning lot directly.
pub fn lot_owned_tables() -> impl Iterator<Item = &'static TableSpec> {
    TABLES.iter().filter(|spec| spec.lot_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn table_names_are_unique() {
        let names: BTreeSet<_> = all_table_names().collect();
        assert_eq!(names.len(), TABLES.len());
    }

    #[test]
    fn every_primary_table_belongs_to_its_subsystem() {
        for subsystem in Subsystem::ALL {
            assert!(
                subsystem.table_names().contains(&subsystem.primary_table()),
                "{} does not own {}",
                subsystem.id(),
                subsystem.primary_table()
            );
        }
    }
}
