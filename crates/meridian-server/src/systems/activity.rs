//! Long-running character activities: chopping, building and picking up.
//!
//! Each activity is a component on the actor. While the actor is out of
//! reach the system keeps walking it toward the target; once in reach the
//! activity does its work and removes itself when finished. A failure on
//! one actor is logged and the rest are still processed.

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::{debug, info};

use crate::commands::{InventoryCommand, InventoryOp};
use crate::components::{
    active, Animation, AttackDamage, Build, Chop, ChopDamage, Collider, Damage, Dead, Destroy,
    DirtyAnimation, DirtyHealth, Health, Identity, Item, Movement, PhysicalDamage, Pickup, Range,
    Transform,
};
use crate::error::{contain, ServerError};
use crate::link::EntityLink;
use crate::schedule::{Context, System};
use crate::spatial::quadtree::Rect;
use crate::state::GameState;

const DEFAULT_CHOP_DAMAGE: f32 = 10.0;
const STRUCTURE_HEALTH: f32 = 100.0;

fn walk_to(world: &mut World, entity: EntityId, target: DVec2) {
    if let Ok(movement) = world.get_mut::<Movement>(entity) {
        movement.target = target;
    }
}

/// Hits the chopped resource once per chop interval.
///
/// Hits are recorded into the start buffer and resolve on the next tick.
pub struct ChopSystem;

impl ChopSystem {
    fn chop(state: &mut GameState, chopper: EntityId) -> Result<(), ServerError> {
        let chop = *state.world.get::<Chop>(chopper)?;
        let resource = state
            .resolve(&chop.target)
            .filter(|r| !state.world.has::<Dead>(*r) && !state.world.has::<Destroy>(*r));
        let Some(resource) = resource else {
            state.world.remove::<Chop>(chopper)?;
            debug!(%chopper, "chop target gone");
            return Ok(());
        };

        let origin = state.world.get::<Transform>(chopper)?.pos;
        let at = state.world.get::<Transform>(resource)?.pos;
        let reach = state
            .world
            .get::<Range>(chopper)
            .map_or(state.config.collider_size * 2.0, |r| r.distance);
        if origin.distance(at) > reach {
            walk_to(&mut state.world, chopper, at);
            return Ok(());
        }

        let amount = state
            .world
            .get::<AttackDamage>(chopper)
            .map_or(DEFAULT_CHOP_DAMAGE, |d| d.value);
        let sender = state.link(chopper);
        state.start_buffer.create(
            ComponentBundle::new()
                .with(Damage::new(sender, chop.target))
                .with(PhysicalDamage(amount))
                .with(ChopDamage),
        );
        if let Ok(animation) = state.world.get_mut::<Animation>(chopper) {
            animation.trigger("chop");
            state.world.add(chopper, DirtyAnimation)?;
        }
        Ok(())
    }
}

impl System for ChopSystem {
    fn name(&self) -> &str {
        "chop"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let choppers = state
            .world
            .matching::<(&Chop, &Transform)>(&active().without::<Dead>());
        for chopper in choppers {
            contain("chop", Self::chop(state, chopper))?;
        }
        Ok(())
    }
}

/// Places the structure once the builder is close enough and raises its
/// health over the build duration.
pub struct BuildSystem;

impl BuildSystem {
    fn build(state: &mut GameState, builder: EntityId, dt: f64) -> Result<(), ServerError> {
        let build = state.world.get::<Build>(builder)?.clone();
        let origin = state.world.get::<Transform>(builder)?.pos;
        if origin.distance(build.position) > build.distance {
            walk_to(&mut state.world, builder, build.position);
            return Ok(());
        }

        let structure = match state.resolve(&build.entity) {
            Some(structure) => structure,
            None => {
                let structure = state.prototypes.instantiate_at(
                    &mut state.world,
                    &build.structure,
                    build.position,
                )?;
                match state.world.get_mut::<Health>(structure) {
                    Ok(health) => health.current = 0.0,
                    Err(_) => state.world.add(
                        structure,
                        Health {
                            current: 0.0,
                            max: STRUCTURE_HEALTH,
                        },
                    )?,
                }
                let id = state.assign_id(structure)?;
                state.world.get_mut::<Build>(builder)?.entity = EntityLink::new(structure, id);
                info!(%builder, %structure, kind = %build.structure, "structure placed");
                structure
            }
        };

        let duration = build.duration.max(f32::EPSILON);
        let health = state.world.get_mut::<Health>(structure)?;
        health.current += dt as f32 * health.max / duration;
        let finished = health.current >= health.max;
        if finished {
            health.current = health.max;
        }
        state.world.add(structure, DirtyHealth)?;
        if finished {
            state.world.remove::<Build>(builder)?;
            info!(%builder, %structure, "build finished");
        }
        Ok(())
    }
}

impl System for BuildSystem {
    fn name(&self) -> &str {
        "build"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let builders = state
            .world
            .matching::<(&Build, &Transform)>(&active().without::<Dead>());
        for builder in builders {
            contain("build", Self::build(state, builder, dt))?;
        }
        Ok(())
    }
}

/// Collects a ground item once the actor's collider touches it.
pub struct PickupSystem;

impl PickupSystem {
    fn pickup(state: &mut GameState, actor: EntityId) -> Result<(), ServerError> {
        let pickup = *state.world.get::<Pickup>(actor)?;
        let item = state
            .resolve(&pickup.target)
            .filter(|i| state.world.has::<Item>(*i) && !state.world.has::<Destroy>(*i));
        let Some(item) = item else {
            state.world.remove::<Pickup>(actor)?;
            return Ok(());
        };

        let fallback = state.config.collider_size;
        let size = |e: EntityId| {
            state
                .world
                .get::<Collider>(e)
                .map_or(fallback, |c| c.size)
        };
        let origin = state.world.get::<Transform>(actor)?.pos;
        let at = state.world.get::<Transform>(item)?.pos;
        let touching =
            Rect::centered(origin, size(actor)).intersects(&Rect::centered(at, size(item)));
        if !touching {
            walk_to(&mut state.world, actor, at);
            return Ok(());
        }

        let kind = state.world.get::<Identity>(item)?.kind.clone();
        let amount = state.world.get::<Item>(item)?.amount;
        let owner = state.link(actor);
        state.queues.inventory.enqueue(InventoryCommand {
            owner,
            op: InventoryOp::Add { kind, amount },
        });
        state.world.add(item, Destroy)?;
        state.world.remove::<Pickup>(actor)?;
        debug!(%actor, %item, amount, "picked up");
        Ok(())
    }
}

impl System for PickupSystem {
    fn name(&self) -> &str {
        "pickup"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let actors = state
            .world
            .matching::<(&Pickup, &Transform)>(&active().without::<Dead>());
        for actor in actors {
            contain("pickup", Self::pickup(state, actor))?;
        }
        Ok(())
    }
}
