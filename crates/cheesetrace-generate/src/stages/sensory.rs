//! Sensory panels and one scored evaluation per lot.

use rusqlite::params;

use cheesetrace_core::format::format_timestamp;
use cheesetrace_core::{GenerationContext, Subsystem};

use super::{Stage, StageEnv, clock, plus_days, query_strings};
use crate::errors::GenerationError;

/// `(panel_id, name, type, active)`
const PANELS: [(&str, &str, &str, bool); 3] = [
    ("PANEL-A", "Expert grading panel", "EXPERT", true),
    ("PANEL-B", "Trained descriptive panel", "TRAINED", true),
    ("PANEL-C", "Consumer acceptance panel", "CONSUMER", false),
];

/// `(panelist_id, panel_id, name, level, qualified)`
const PANELISTS: [(&str, &str, &str, &str, &str); 6] = [
    ("PNL-001", "PANEL-A", "Giulia Rossi", "MASTER", "2021-03-15"),
    ("PNL-002", "PANEL-A", "Marco Bianchi", "SENIOR", "2022-05-02"),
    ("PNL-003", "PANEL-B", "Elena Colombo", "SENIOR", "2022-09-20"),
    ("PNL-004", "PANEL-B", "Luca Ferrari", "JUNIOR", "2023-06-11"),
    ("PNL-005", "PANEL-C", "Sara Ricci", "JUNIOR", "2023-10-01"),
    ("PNL-006", "PANEL-C", "Paolo Greco", "JUNIOR", "2023-10-01"),
];

const ATTRIBUTES: [&str; 6] = ["APPEARANCE", "AROMA", "FLAVOR", "TEXTURE", "SALTINESS", "AFTERTASTE"];
const SCALE_MAX: f64 = 10.0;

const COMMENTS: [&str; 4] = [
    "Soft, creamy paste with a thin washed rind",
    "Mild milky aroma, light mushroom notes",
    "Slightly tangy finish, good melt",
    "Even texture, rind aroma typical of the style",
];

pub struct SensoryStage;

impl Stage for SensoryStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Sensory
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        ensure_panels(env)?;
        let Some(lot) = env.lot(ctx)? else {
            return Ok(());
        };

        let panels = query_strings(
            env.conn,
            "SELECT panel_id FROM sensory_panels WHERE is_active = 1 ORDER BY panel_id",
            [],
        )?;
        let panel = env
            .values
            .pick(&panels)
            .cloned()
            .ok_or_else(|| GenerationError::MissingReference("no active sensory panel".into()))?;
        let panelists = query_strings(
            env.conn,
            "SELECT panelist_id FROM panelist_qualifications WHERE panel_id = ?1 ORDER BY panelist_id",
            [&panel],
        )?;
        let panelist = env.values.pick(&panelists).cloned().ok_or_else(|| {
            GenerationError::MissingReference(format!("no panelist qualified on {panel}"))
        })?;

        let scores: Vec<f64> = ATTRIBUTES
            .iter()
            .map(|_| env.values.round(6.0, 9.5, 1))
            .collect();
        let overall = (scores.iter().sum::<f64>() / scores.len() as f64 * 100.0).round() / 100.0;
        let sample_age = env.values.int(7, 30);
        let evaluated_at = clock(plus_days(ctx.date, sample_age), 14, 0);
        let comment = env.values.pick(&COMMENTS).copied();

        let evaluation_uuid = env.values.uuid();
        env.insert(
            "sensory_evaluations",
            "INSERT INTO sensory_evaluations \
             (evaluation_uuid, lot_uuid, panel_id, panelist_id, evaluated_at, sample_code, \
              sample_age_days, overall_score, comments) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                evaluation_uuid,
                lot.lot_uuid,
                panel,
                panelist,
                format_timestamp(evaluated_at),
                format!("SAMPLE{:03}", ctx.lot_count),
                sample_age,
                overall,
                comment,
            ],
        )?;

        for (attribute, score) in ATTRIBUTES.iter().zip(scores) {
            let attribute_uuid = env.values.uuid();
            env.insert(
                "sensory_attributes",
                "INSERT INTO sensory_attributes \
                 (attribute_uuid, evaluation_uuid, attribute_name, score, scale_max) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![attribute_uuid, evaluation_uuid, attribute, score, SCALE_MAX],
            )?;
        }
        Ok(())
    }
}

fn ensure_panels(env: &mut StageEnv<'_>) -> Result<(), GenerationError> {
    for (id, name, kind, active) in PANELS {
        env.insert(
            "sensory_panels",
            "INSERT OR IGNORE INTO sensory_panels (panel_id, panel_name, panel_type, is_active) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, name, kind, active as i64],
        )?;
    }
    for (id, panel, name, level, qualified) in PANELISTS {
        env.insert(
            "panelist_qualifications",
            "INSERT OR IGNORE INTO panelist_qualifications \
             (panelist_id, panel_id, panelist_name, qualification_level, qualified_date) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, panel, name, level, qualified],
        )?;
    }
    Ok(())
}
