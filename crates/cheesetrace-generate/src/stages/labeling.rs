//! One regulatory label per lot: batch code, best-before date and health mark.

use rusqlite::params;

use cheesetrace_core::format::format_date;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv};
use crate::errors::GenerationError;

const SHELF_LIFE_DAYS: u64 = 60;
const NET_WEIGHT_G: f64 = 250.0;

pub struct LabelingStage;

impl Stage for LabelingStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Labeling
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };
        let label_uuid = env.values.uuid();
        let product_name = product_name(&env.options.product_code);
        let health_mark = format!("IT {} CE", env.options.facility_code);
        env.insert(
            "labeling_regulatory",
            "INSERT INTO labeling_regulatory \
             (label_uuid, lot_uuid, product_name, batch_code, production_date, best_before_date, \
              net_weight_g, allergens, storage_instructions, country_of_origin, health_mark) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'MILK', ?8, 'IT', ?9)",
            params![
                label_uuid,
                lot.lot_uuid,
                product_name,
                lot.number()?.batch_code(),
                ctx.date_key(),
                format_date(ctx.days_after(SHELF_LIFE_DAYS)),
                NET_WEIGHT_G,
                "Keep refrigerated between 2 and 6 °C",
                health_mark,
            ],
        )?;
        Ok(())
    }
}

/// `TALEGGIO` becomes `Taleggio PDO`.
fn product_name(code: &str) -> String {
    let mut chars = code.chars();
    match chars.next() {
        Some(first) => format!(
            "{}{} PDO",
            first.to_ascii_uppercase(),
            chars.as_str().to_ascii_lowercase().replace('_', " ")
        ),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::product_name;

    #[test]
    fn product_name_is_title_cased() {
        assert_eq!(product_name("TALEGGIO"), "Taleggio PDO");
        assert_eq!(product_name("QUARTIROLO_LOMBARDO"), "Quartirolo lombardo PDO");
    }
}
