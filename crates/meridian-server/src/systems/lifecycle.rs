//! Entity birth and death.

use meridian_ecs::prelude::*;
use tracing::{debug, info, warn};

use crate::components::{
    live, Chunk, ChunkLoader, Child, Created, Destroy, DestroyAfter, Identity, Initialized,
    Inventory, Parent, Prefab, Unloaded,
};
use crate::error::{contain, ServerError};
use crate::events::{ChunkDestroyed, Destroyed};
use crate::link::EntityLink;
use crate::random;
use crate::schedule::{Context, System};
use crate::spatial::chunk::{cascade_destroy, leave_chunk, leave_chunks};

/// Gives new identities an id, tags them and announces them.
pub struct InitialisationSystem;

impl System for InitialisationSystem {
    fn name(&self) -> &str {
        "initialisation"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let fresh = ctx.state.world.matching::<(&Identity,)>(
            &Filter::new().without::<Initialized>().without::<Prefab>(),
        );

        for entity in fresh {
            let state = &mut *ctx.state;
            let current = state.world.get::<Identity>(entity)?.id;
            let taken_by_other = current != 0
                && state
                    .identities
                    .get(current)
                    .is_some_and(|other| other != entity && state.world.is_alive(other));
            let id = if current == 0 || taken_by_other {
                if taken_by_other {
                    warn!(%entity, id = current, "identity id already in use; reassigning");
                }
                let id = random::unique_id(&mut state.rng, &state.identities);
                state.world.get_mut::<Identity>(entity)?.id = id;
                id
            } else {
                current
            };
            state.world.add(entity, Initialized)?;
            state.world.add(entity, Created)?;
            ctx.publish(&crate::events::Created {
                link: EntityLink::new(entity, id),
            });
        }
        Ok(())
    }
}

/// End-of-frame sweep of everything tagged `Destroy`.
///
/// Each doomed entity leaves the spatial indices, is announced, and is
/// despawned. What it drags along with it (`Parent` children, inventory
/// items, chunk contents) and expired `DestroyAfter` timers are recorded
/// into the end buffer, which plays back right after the sweep, so they go
/// in the next one.
pub struct DestroySystem;

impl DestroySystem {
    fn tick_timers(world: &mut World, buffer: &mut CommandBuffer, dt: f64) {
        for (entity, (after,)) in world
            .query_mut_filtered::<(&mut DestroyAfter,)>(&live().without::<Destroy>())
        {
            after.seconds -= dt as f32;
            if after.seconds <= 0.0 {
                buffer.add(entity, Destroy);
            }
        }
    }

    fn spread(world: &mut World, buffer: &mut CommandBuffer, doomed: &[EntityId]) -> usize {
        let mut marked = 0;
        for &entity in doomed {
            let mut dependents: Vec<EntityId> = Vec::new();
            if let Ok(parent) = world.get::<Parent>(entity) {
                dependents.extend(parent.children.iter().map(|l| l.entity));
            }
            if let Ok(inventory) = world.get::<Inventory>(entity) {
                dependents.extend(inventory.items.iter().map(|l| l.entity));
            }
            for dependent in dependents {
                if world.is_alive(dependent) && !world.has::<Destroy>(dependent) {
                    buffer.add(dependent, Destroy);
                    marked += 1;
                }
            }
            if world.has::<Chunk>(entity) {
                marked += cascade_destroy(world, entity, buffer);
            }
        }
        marked
    }

    fn sweep(ctx: &mut Context<'_>, entity: EntityId) -> Result<(), ServerError> {
        let zoom = ctx.state.config.chunk_zoom;
        let state = &mut *ctx.state;
        state.tree.remove(entity);
        leave_chunk(&mut state.world, &state.chunks, entity);
        let loaded_around = state
            .world
            .get::<ChunkLoader>(entity)
            .ok()
            .and_then(|l| l.current);
        if let Some(grid) = loaded_around {
            leave_chunks(&mut state.world, &mut state.chunks, entity, grid, zoom);
        }
        if let Ok(child) = state.world.get::<Child>(entity) {
            let parent = child.parent;
            if let Some(p) = state.resolve(&parent) {
                if let Ok(parent) = state.world.get_mut::<Parent>(p) {
                    parent.children.retain(|l| l.entity != entity);
                }
            }
        }

        let chunk_grid = state.world.get::<Chunk>(entity).ok().map(|c| c.grid);
        if state.world.has::<Initialized>(entity) {
            let identity = state.world.get::<Identity>(entity)?;
            let event = Destroyed {
                link: EntityLink::new(entity, identity.id),
                tag: identity.tag.clone(),
                unloaded: state.world.has::<Unloaded>(entity) || chunk_grid.is_some(),
            };
            ctx.publish(&event);
        }
        if let Some(grid) = chunk_grid {
            info!(%entity, ?grid, "chunk destroyed");
            ctx.publish(&ChunkDestroyed { entity, grid });
        }
        Ok(())
    }
}

impl System for DestroySystem {
    fn name(&self) -> &str {
        "destroy"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        Self::tick_timers(&mut state.world, &mut state.end_buffer, dt);
        let doomed = state.world.matching::<(&Destroy,)>(&live());
        if doomed.is_empty() {
            return Ok(());
        }
        let spread = Self::spread(&mut state.world, &mut state.end_buffer, &doomed);

        for &entity in &doomed {
            contain("destroy", Self::sweep(ctx, entity))?;
        }
        let world = &mut ctx.state.world;
        for &entity in &doomed {
            if let Err(err) = world.despawn(entity) {
                warn!(%entity, error = %err, "doomed entity already gone");
            }
        }
        debug!(count = doomed.len(), spread, "destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::boundary::{MemoryStore, RecordingNetwork};
    use crate::config::ServerConfig;
    use crate::state::GameState;
    use crate::systems::reactive::EndBufferSystem;

    fn state() -> GameState {
        GameState::new(
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(RecordingNetwork::new()),
        )
        .unwrap()
    }

    fn end_of_frame(state: &mut GameState, dt: f64) {
        let mut events = EventBus::new();
        let mut ctx = Context::new(state, &mut events);
        DestroySystem.update(&mut ctx, dt).unwrap();
        EndBufferSystem.update(&mut ctx, dt).unwrap();
    }

    #[test]
    fn expired_timers_land_at_the_barrier_and_go_next_sweep() {
        let mut state = state();
        let popup = state.world.spawn_one(DestroyAfter { seconds: 0.15 });

        end_of_frame(&mut state, 0.1);
        assert!(!state.world.has::<Destroy>(popup));

        end_of_frame(&mut state, 0.1);
        assert!(state.world.is_alive(popup));
        assert!(state.world.has::<Destroy>(popup));
        assert!(state.end_buffer.is_empty());

        end_of_frame(&mut state, 0.1);
        assert!(!state.world.is_alive(popup));
    }

    #[test]
    fn children_follow_their_parent_one_sweep_later() {
        let mut state = state();
        let child = state.world.spawn_one(Identity::new("option", "option:close"));
        let link = state.link(child);
        let parent = state.world.spawn(
            ComponentBundle::new()
                .with(Parent {
                    children: BTreeSet::from([link]),
                })
                .with(Destroy),
        );
        let back = state.link(parent);
        state.world.add(child, Child { parent: back }).unwrap();

        end_of_frame(&mut state, 0.1);
        assert!(!state.world.is_alive(parent));
        assert!(state.world.has::<Destroy>(child));

        end_of_frame(&mut state, 0.1);
        assert!(!state.world.is_alive(child));
        assert_eq!(state.world.entity_count(), 0);
    }
}
