//! Chunks, biomes and procedural spawning.

use glam::DVec2;
use meridian_ecs::prelude::*;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::components::{
    active, live, Biome, BiomeRule, Chunk, ChunkLoader, Destroy, Generated, Identity, Inactive,
    NoiseGrid, SpawnEntry, SpawnTable, Transform,
};
use crate::error::ServerError;
use crate::random::weighted_pick;
use crate::schedule::{Context, System};
use crate::spatial::chunk::{enter_chunks, leave_chunks, switch_chunks};
use crate::spatial::grid::{grid_at, Grid};

/// Chance per noise cell that a matching mob entry spawns.
const MOB_CHANCE: f64 = 0.01;

/// Loader movement between chunk neighbourhoods and chunk decay.
pub struct ChunkSystem;

impl ChunkSystem {
    fn move_loaders(ctx: &mut Context<'_>) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;

        let moved: Vec<(EntityId, Option<Grid>, Grid)> = state
            .world
            .query_filtered::<(&ChunkLoader, &Transform)>(&active())
            .filter_map(|(entity, (loader, transform))| {
                let grid = grid_at(transform.pos, zoom);
                (loader.current != Some(grid)).then_some((entity, loader.current, grid))
            })
            .collect();
        for (loader, old, new) in moved {
            if let Some(old) = old {
                leave_chunks(&mut state.world, &mut state.chunks, loader, old, zoom);
            }
            enter_chunks(&mut state.world, &mut state.chunks, loader, new, zoom);
            state.world.get_mut::<ChunkLoader>(loader)?.current = Some(new);
        }

        let parked: Vec<(EntityId, Grid)> = state
            .world
            .query_filtered::<(&ChunkLoader,)>(&live().with::<Inactive>())
            .filter_map(|(entity, (loader,))| loader.current.map(|g| (entity, g)))
            .collect();
        for (loader, grid) in parked {
            leave_chunks(&mut state.world, &mut state.chunks, loader, grid, zoom);
            state.world.get_mut::<ChunkLoader>(loader)?.current = None;
            debug!(%loader, "inactive loader detached");
        }
        Ok(())
    }

    fn decay(ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let grace = ctx.state.config.chunk_decay_seconds;
        let world = &mut ctx.state.world;

        let mut expired = Vec::new();
        for (entity, (chunk,)) in
            world.query_mut_filtered::<(&mut Chunk,)>(&live().without::<Destroy>())
        {
            if !chunk.loaded_by.is_empty() {
                chunk.decay = None;
                continue;
            }
            let remaining = chunk.decay.unwrap_or(grace) - dt as f32;
            chunk.decay = Some(remaining);
            if remaining <= 0.0 {
                expired.push((entity, chunk.grid));
            }
        }
        // Contents are marked by the end-of-frame sweep.
        for (chunk, grid) in expired {
            world.add(chunk, Destroy)?;
            info!(%chunk, ?grid, "chunk decayed");
        }
        Ok(())
    }
}

impl System for ChunkSystem {
    fn name(&self) -> &str {
        "chunks"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        Self::move_loaders(ctx)?;
        Self::decay(ctx, dt)
    }
}

/// Keeps every chunk's `contains` set in line with entity positions.
pub struct ChunkAssignmentSystem;

impl System for ChunkAssignmentSystem {
    fn name(&self) -> &str {
        "chunk_assignment"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;
        let filter = live().without::<Destroy>().without::<Chunk>();

        let moved: Vec<(EntityId, Option<Grid>, Grid)> = state
            .world
            .query_filtered::<(&Transform, &Identity)>(&filter)
            .filter_map(|(entity, (transform, _))| {
                let grid = grid_at(transform.pos, zoom);
                (transform.chunk != Some(grid)).then_some((entity, transform.chunk, grid))
            })
            .collect();

        for (entity, old, new) in moved {
            let filed = switch_chunks(&mut state.world, &state.chunks, entity, old, new);
            state.world.get_mut::<Transform>(entity)?.chunk = filed;
        }
        Ok(())
    }
}

/// Picks a biome for freshly created chunks.
pub struct BiomeSystem;

impl System for BiomeSystem {
    fn name(&self) -> &str {
        "biome"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;
        let fresh: Vec<(EntityId, Grid)> = state
            .world
            .query_filtered::<(&Chunk,)>(
                &live()
                    .without::<Destroy>()
                    .without::<Biome>()
                    .without::<Generated>(),
            )
            .map(|(e, (c,))| (e, c.grid))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let rules: Vec<(String, BiomeRule)> = state
            .prototypes
            .kinds()
            .filter_map(|kind| {
                let template = state.prototypes.template(kind)?;
                let rule = state.world.get::<BiomeRule>(template).ok()?;
                Some((kind.to_owned(), rule.clone()))
            })
            .collect();

        for (chunk, grid) in fresh {
            let code = state.biomes.code(grid.tile(zoom).middle());
            let candidates: Vec<&(String, BiomeRule)> =
                rules.iter().filter(|(_, r)| r.codes.contains(&code)).collect();
            let Some((kind, _)) = weighted_pick(&mut state.rng, &candidates, |c| c.1.weight).copied()
            else {
                debug!(%chunk, ?grid, code, "no biome for code");
                state.world.add(chunk, Generated)?;
                continue;
            };

            let table = state
                .prototypes
                .template(kind)
                .and_then(|t| state.world.get::<SpawnTable>(t).ok().cloned());
            state.world.add(chunk, Biome { kind: kind.clone() })?;
            match table {
                Some(table) => state.world.add(chunk, table)?,
                None => state.world.add(chunk, Generated)?,
            }
            debug!(%chunk, ?grid, biome = %kind, "biome assigned");
        }
        Ok(())
    }
}

/// Samples the noise field over each chunk awaiting generation.
pub struct GeneratorSystem;

impl System for GeneratorSystem {
    fn name(&self) -> &str {
        "generator"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;
        let pending: Vec<(EntityId, Grid, u32)> = state
            .world
            .query_filtered::<(&Chunk, &SpawnTable)>(
                &live()
                    .without::<Destroy>()
                    .without::<NoiseGrid>()
                    .without::<Generated>(),
            )
            .map(|(e, (c, t))| (e, c.grid, t.resolution.max(1)))
            .collect();

        for (chunk, grid, resolution) in pending {
            let tile = grid.tile(zoom);
            let mut values = Vec::with_capacity((resolution * resolution) as usize);
            for row in 0..resolution {
                for col in 0..resolution {
                    values.push(state.noise.sample(tile.cell_centre(row, col, resolution)));
                }
            }
            state.world.add(chunk, NoiseGrid { resolution, values })?;
        }
        Ok(())
    }
}

/// Fills generated chunks with resources and mobs.
pub struct SpawnerSystem;

impl SpawnerSystem {
    fn already_populated(world: &World, chunk: &Chunk) -> bool {
        chunk.contains.iter().any(|e| {
            world
                .get::<Identity>(*e)
                .map(|i| i.is("resource"))
                .unwrap_or(false)
        })
    }
}

impl System for SpawnerSystem {
    fn name(&self) -> &str {
        "spawner"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;
        let ready: Vec<(EntityId, Grid, SpawnTable, NoiseGrid, bool)> = state
            .world
            .query_filtered::<(&Chunk, &SpawnTable, &NoiseGrid)>(
                &live().without::<Destroy>().without::<Generated>(),
            )
            .map(|(e, (c, t, n))| {
                let populated = Self::already_populated(&state.world, c);
                (e, c.grid, t.clone(), n.clone(), populated)
            })
            .collect();

        for (chunk, grid, table, noise, populated) in ready {
            state.world.remove::<NoiseGrid>(chunk)?;
            state.world.add(chunk, Generated)?;
            if populated {
                debug!(%chunk, ?grid, "chunk already has resources");
                continue;
            }

            let tile = grid.tile(zoom);
            let (mobs, statics): (Vec<&SpawnEntry>, Vec<&SpawnEntry>) =
                table.entries.iter().partition(|e| e.mob);
            let mut spawned = 0;
            for row in 0..noise.resolution {
                for col in 0..noise.resolution {
                    let sample = noise.get(row, col);
                    let at = tile.cell_centre(row, col, noise.resolution);

                    let matching: Vec<&SpawnEntry> = statics
                        .iter()
                        .copied()
                        .filter(|e| e.condition.matches(sample))
                        .collect();
                    let mut picks: Vec<(String, DVec2)> = Vec::new();
                    if let Some(entry) = weighted_pick(&mut state.rng, &matching, |e| e.weight) {
                        picks.push((entry.prototype.clone(), at));
                    }
                    for entry in mobs.iter().filter(|e| e.condition.matches(sample)) {
                        if state.rng.gen_bool(MOB_CHANCE) {
                            picks.push((entry.prototype.clone(), at));
                        }
                    }

                    for (kind, at) in picks {
                        match state.prototypes.instantiate_at(&mut state.world, &kind, at) {
                            Ok(_) => spawned += 1,
                            Err(err) => warn!(%chunk, %kind, error = %err, "spawn failed"),
                        }
                    }
                }
            }
            debug!(%chunk, ?grid, spawned, "chunk populated");
        }
        Ok(())
    }
}
