//! The lot factory: one lot per date, plus occasional mixed-batch genealogy.

use rusqlite::params;
use tracing::debug;

use cheesetrace_core::format::format_timestamp;
use cheesetrace_core::{GenerationContext, LotStatus, Subsystem};

use super::{Stage, StageEnv, clock, query_strings};
use crate::errors::GenerationError;
use crate::lots::insert_lot;

pub struct CoreStage;

impl Stage for CoreStage {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Core
    }

    fn upstream_tables(&self) -> &'static [&'static str] {
        &[]
    }

    fn populate(
        &self,
        env: &mut StageEnv<'_>,
        ctx: &GenerationContext,
    ) -> Result<(), GenerationError> {
        let Some(lot) = insert_lot(env.conn, &mut env.values, env.options, ctx, LotStatus::Active)?
        else {
            debug!(date = %ctx.date, "lot already exists");
            return Ok(());
        };
        // Counted here because insert_lot bypasses StageEnv::insert.
        env.record("lot_master", 1);

        if !env.values.chance(env.options.genealogy_probability) {
            return Ok(());
        }
        let earlier = query_strings(
            env.conn,
            "SELECT lot_uuid FROM lot_master WHERE lot_date < ?1 ORDER BY lot_date, lot_number",
            [ctx.date_key()],
        )?;
        let Some(parent) = env.values.pick(&earlier).cloned() else {
            return Ok(());
        };

        let genealogy_uuid = env.values.uuid();
        let contribution = env.values.round(5.0, 30.0, 1);
        env.insert(
            "batch_genealogy",
            "INSERT INTO batch_genealogy \
             (genealogy_uuid, child_lot_uuid, parent_lot_uuid, relationship_type, contribution_pct, recorded_at) \
             VALUES (?1, ?2, ?3, 'MIXED_BATCH', ?4, ?5)",
            params![
                genealogy_uuid,
                lot.lot_uuid,
                parent,
                contribution,
                format_timestamp(clock(ctx.date, 6, 30)),
            ],
        )?;
        Ok(())
    }
}
