//! Quality control: the test method catalog and per-lot results.

use rusqlite::params;

use cheesetrace_core::format::format_date;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv};
use crate::errors::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Chemical,
    Composition,
    Microbiological,
}

impl Category {
    fn as_str(self) -> &'static str {
        match self {
            Category::Chemical => "CHEMICAL",
            Category::Composition => "COMPOSITION",
            Category::Microbiological => "MICROBIOLOGICAL",
        }
    }
}

struct Method {
    code: &'static str,
    name: &'static str,
    category: Category,
    unit: &'static str,
    min: Option<f64>,
    max: f64,
    ccp: Option<&'static str>,
}

const METHODS: [Method; 7] = [
    Method { code: "PH", name: "pH measurement", category: Category::Chemical, unit: "pH", min: Some(5.0), max: 6.0, ccp: Some("CCP-3") },
    Method { code: "MOISTURE", name: "Moisture content", category: Category::Composition, unit: "%", min: Some(45.0), max: 55.0, ccp: None },
    Method { code: "FAT_CONTENT", name: "Fat content", category: Category::Composition, unit: "%", min: Some(25.0), max: 35.0, ccp: None },
    Method { code: "SALT", name: "Salt content", category: Category::Composition, unit: "%", min: Some(1.5), max: 2.5, ccp: None },
    Method { code: "TPC", name: "Total plate count", category: Category::Microbiological, unit: "CFU/g", min: None, max: 100_000.0, ccp: None },
    Method { code: "COLIFORMS", name: "Coliforms", category: Category::Microbiological, unit: "CFU/g", min: None, max: 100.0, ccp: Some("CCP-2") },
    Method { code: "YEAST_MOLD", name: "Yeasts and molds", category: Category::Microbiological, unit: "CFU/g", min: None, max: 1_000.0, ccp: None },
];

/// Share of microbiological results drawn from the low, clean band.
const CLEAN_MICRO_SHARE: f64 = 0.8;

impl Method {
    fn passes(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && value <= self.max
    }

    /// `(organism, incubation °C, hours, medium)` for microbiological methods.
    fn culture(&self) -> Option<(&'static str, f64, i64, &'static str)> {
        match self.code {
            "TPC" => Some(("Aerobic mesophilic bacteria", 30.0, 72, "PCA")),
            "COLIFORMS" => Some(("Coliform bacteria", 37.0, 24, "VRBA")),
            "YEAST_MOLD" => Some(("Yeasts and molds", 30.0, 120, "DRBC")),
            _ => None,
        }
    }
}

pub struct QualityStage;

impl Stage for QualityStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Quality
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_methods(env)?;
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        let test_date = format_date(ctx.days_after(1));
        let technician = format!("TECH-{:02}", env.values.int(1, 5));
        let mut moisture = 50.0;
        let mut salt = 2.0;

        for method in &METHODS {
            let value = match (method.category, method.min) {
                (Category::Microbiological, _) => {
                    let value = if env.values.chance(CLEAN_MICRO_SHARE) {
                        env.values.uniform(0.0, method.max * 0.1)
                    } else {
                        env.values.uniform(method.max * 0.1, method.max * 1.2)
                    };
                    value.round()
                }
                (_, Some(min)) => env.values.round(min, method.max, 2),
                (_, None) => env.values.round(0.0, method.max, 2),
            };
            match method.code {
                "MOISTURE" => moisture = value,
                "SALT" => salt = value,
                _ => {}
            }

            let test_uuid = env.values.uuid();
            env.insert(
                "quality_tests",
                "INSERT INTO quality_tests \
                 (test_uuid, lot_uuid, method_code, test_date, result_value, passed, technician_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    test_uuid,
                    lot.lot_uuid,
                    method.code,
                    test_date,
                    value,
                    method.passes(value) as i64,
                    technician,
                ],
            )?;

            if method.code == "FAT_CONTENT" {
                // Moisture and salt come before fat in the catalog.
                let protein = env.values.round(20.0, 25.0, 2);
                let fat_in_dry_matter = (value / (100.0 - moisture) * 10_000.0).round() / 100.0;
                let composition_uuid = env.values.uuid();
                env.insert(
                    "composition_tests",
                    "INSERT INTO composition_tests \
                     (composition_uuid, test_uuid, fat_pct, protein_pct, moisture_pct, salt_pct, \
                      fat_in_dry_matter_pct) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        composition_uuid,
                        test_uuid,
                        value,
                        protein,
                        moisture,
                        salt,
                        fat_in_dry_matter
                    ],
                )?;
            }

            if let Some((organism, incubation, hours, medium)) = method.culture() {
                let micro_uuid = env.values.uuid();
                env.insert(
                    "microbiology_tests",
                    "INSERT INTO microbiology_tests \
                     (micro_uuid, test_uuid, organism, cfu_per_g, incubation_temperature_c, \
                      incubation_hours, medium) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![micro_uuid, test_uuid, organism, value, incubation, hours, medium],
                )?;
            }
        }
        Ok(())
    }
}

fn ensure_methods(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for method in &METHODS {
        env.insert(
            "quality_test_methods",
            "INSERT OR IGNORE INTO quality_test_methods \
             (method_code, method_name, test_category, unit, min_acceptable, max_acceptable, \
              is_ccp, ccp_number) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                method.code,
                method.name,
                method.category.as_str(),
                method.unit,
                method.min,
                method.max,
                method.ccp.is_some() as i64,
                method.ccp,
            ],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micro_methods_have_no_lower_bound() {
        for method in METHODS.iter().filter(|m| m.category == Category::Microbiological) {
            assert!(method.min.is_none());
            assert!(method.culture().is_some());
            assert!(method.passes(0.0));
            assert!(!method.passes(method.max + 1.0));
        }
    }

    #[test]
    fn ccp_methods_carry_a_number() {
        let ccps: Vec<_> = METHODS.iter().filter_map(|m| m.ccp).collect();
        assert_eq!(ccps, vec!["CCP-3", "CCP-2"]);
    }

    #[test]
    fn ph_range_is_checked_on_both_sides() {
        let ph = &METHODS[0];
        assert!(ph.passes(5.5));
        assert!(!ph.passes(4.9));
        assert!(!ph.passes(6.1));
    }
}
