//! Model tracking, periodic saves and chunk lookups against the
//! persistence boundary.

use meridian_ecs::prelude::*;
use tracing::{debug, error, info, warn};

use crate::commands::ChunkCommand;
use crate::components::{Identity, Initialized, Prefab};
use crate::error::ServerError;
use crate::model::{record_of, PERSISTED_TAGS};
use crate::schedule::{Context, System};

/// Starts tracking a record for each newly initialised persisted entity.
pub struct ModelSystem;

impl System for ModelSystem {
    fn name(&self) -> &str {
        "model"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let fresh: Vec<EntityId> = state
            .world
            .query_filtered::<(&Identity,)>(&Filter::new().with::<Initialized>().without::<Prefab>())
            .filter(|(e, (identity,))| {
                PERSISTED_TAGS.contains(&identity.tag.as_str()) && !state.models.is_tracked(*e)
            })
            .map(|(e, _)| e)
            .collect();

        for entity in fresh {
            if let Some(record) = record_of(&state.world, entity) {
                debug!(%entity, key = ?record.key(), "tracking model");
                state.models.track(entity, record);
            }
        }
        Ok(())
    }
}

/// Refreshes every tracked record from the live components.
pub struct ModelUpdateSystem;

impl System for ModelUpdateSystem {
    fn name(&self) -> &str {
        "model_update"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        state.models.refresh(&state.world);
        Ok(())
    }
}

/// Flushes tracked records and deletions. A failed flush is fatal.
pub struct SaveSystem;

impl System for SaveSystem {
    fn name(&self) -> &str {
        "save"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let batch = state.models.batch();
        if batch.is_empty() {
            return Ok(());
        }
        let (upserts, deletions) = (batch.upserts.len(), batch.deletions.len());
        if let Err(err) = state.persistence.save(&batch) {
            error!(error = %err, upserts, deletions, "save failed");
            for record in &batch.upserts {
                let json = serde_json::to_string(record).unwrap_or_else(|e| e.to_string());
                error!(record = %json, "unsaved record");
            }
            return Err(ServerError::PersistenceFailure {
                reason: err.to_string(),
            });
        }
        info!(upserts, deletions, "saved");
        Ok(())
    }
}

/// Answers the chunk lookups requested this tick. Results become chunk
/// commands executed on the next tick.
pub struct ChunkLookupPump;

impl System for ChunkLookupPump {
    fn name(&self) -> &str {
        "chunk_lookup"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let grids = state.chunks.take_requests();
        if grids.is_empty() {
            return Ok(());
        }
        let lookup = state
            .persistence
            .chunk_exists(&grids)
            .and_then(|saved| Ok((state.persistence.load_chunks(&saved)?, saved)));

        match lookup {
            Ok((loaded, saved)) => {
                for grid in grids.iter().filter(|g| !saved.contains(g)) {
                    state.queues.chunk.enqueue(ChunkCommand::Create { grid: *grid });
                }
                for chunk in loaded {
                    state.queues.chunk.enqueue(ChunkCommand::Load(Box::new(chunk)));
                }
                debug!(requested = grids.len(), saved = saved.len(), "chunk lookups answered");
            }
            Err(err) => {
                warn!(error = %err, grids = grids.len(), "chunk lookup failed, retrying");
                state.chunks.retry(grids);
            }
        }
        Ok(())
    }
}
