//! Mob decision making and animation parameters.
//!
//! A mob's behaviour is an explicit [`BrainState`] advanced once per tick:
//! `Idle` waits, `Wander` walks to a random point in its chunk tile, `Chase`
//! follows the nearest character the mob can sense and engages it once in
//! reach.

use glam::DVec2;
use meridian_ecs::prelude::*;
use rand::Rng;
use tracing::trace;

use crate::components::{
    active, Animation, BrainState, Character, Dead, DirtyAnimation, Identity, InCombat, Inactive,
    MobBrain, Movement, Range, Transform,
};
use crate::error::ServerError;
use crate::link::EntityLink;
use crate::schedule::{Context, System};
use crate::spatial::grid::grid_at;
use crate::spatial::quadtree::Rect;
use crate::state::GameState;

pub struct MobBrainSystem;

impl MobBrainSystem {
    /// Closest live, active character inside the square `range` around `pos`.
    fn nearest_character(state: &GameState, pos: DVec2, range: f64) -> Option<(EntityLink, DVec2)> {
        let mut best: Option<(EntityLink, DVec2, f64)> = None;
        state.tree.query_range(&Rect::centered(pos, range), |hit| {
            let world = &state.world;
            let is_player = world.is_alive(hit.link.entity)
                && world.has::<Character>(hit.link.entity)
                && !world.has::<Dead>(hit.link.entity)
                && !world.has::<Inactive>(hit.link.entity);
            if !is_player {
                return;
            }
            let d = hit.pos.distance_squared(pos);
            if best.map_or(true, |(_, _, bd)| d < bd) {
                best = Some((hit.link, hit.pos, d));
            }
        });
        best.map(|(link, at, _)| (link, at))
    }
}

impl System for MobBrainSystem {
    fn name(&self) -> &str {
        "mob_brain"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let zoom = state.config.chunk_zoom;
        let mobs: Vec<(EntityId, MobBrain, DVec2, f64)> = state
            .world
            .query_filtered::<(&MobBrain, &Transform)>(&active().without::<Dead>())
            .map(|(e, (brain, t))| {
                let reach = state.world.get::<Range>(e).map_or(0.0, |r| r.distance);
                (e, *brain, t.pos, reach)
            })
            .collect();

        for (mob, mut brain, pos, reach) in mobs {
            brain.timer -= dt as f32;
            let sensed = Self::nearest_character(state, pos, brain.sense_range);
            let mut walk_to = None;
            let mut engage = None;

            match (brain.state, sensed) {
                (_, Some((player, at))) => {
                    brain.state = BrainState::Chase(player);
                    walk_to = Some(at);
                    if reach > 0.0 && at.distance(pos) <= reach {
                        engage = Some(player);
                    }
                }
                (BrainState::Chase(_), None) => {
                    brain.state = BrainState::Idle;
                    brain.timer = state.rng.gen_range(1.0..3.0);
                    walk_to = Some(DVec2::ZERO);
                }
                (BrainState::Idle, None) if brain.timer <= 0.0 => {
                    let tile = grid_at(pos, zoom).tile(zoom);
                    let target = DVec2::new(
                        state.rng.gen_range(tile.south..tile.north),
                        state.rng.gen_range(tile.west..tile.east),
                    );
                    brain.state = BrainState::Wander;
                    brain.timer = state.rng.gen_range(5.0..10.0);
                    walk_to = Some(target);
                }
                (BrainState::Wander, None) => {
                    let arrived = state
                        .world
                        .get::<Movement>(mob)
                        .map_or(true, |m| !m.has_target());
                    if arrived || brain.timer <= 0.0 {
                        brain.state = BrainState::Idle;
                        brain.timer = state.rng.gen_range(2.0..5.0);
                        walk_to = Some(DVec2::ZERO);
                    }
                }
                (BrainState::Idle, None) => {}
            }

            let world = &mut state.world;
            if let Some(target) = walk_to {
                if let Ok(movement) = world.get_mut::<Movement>(mob) {
                    movement.target = target;
                }
            }
            if let Some(player) = engage {
                match world.get_mut::<InCombat>(mob) {
                    Ok(combat) => {
                        combat.defenders.insert(player);
                    }
                    Err(_) => {
                        let mut combat = InCombat::default();
                        combat.defenders.insert(player);
                        world.add(mob, combat)?;
                    }
                }
            }
            if world.get::<MobBrain>(mob)?.state != brain.state {
                trace!(%mob, state = ?brain.state, "brain transition");
            }
            *world.get_mut::<MobBrain>(mob)? = brain;
        }
        Ok(())
    }
}

/// Mirrors movement into the `speed` animation parameter.
pub struct AnimationSystem;

impl System for AnimationSystem {
    fn name(&self) -> &str {
        "animation"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let world = &mut ctx.state.world;
        let mut changed = Vec::new();
        for (entity, (animation, movement)) in world
            .query_mut_filtered::<(&mut Animation, &Movement)>(&active().with::<Identity>())
        {
            let speed = if movement.has_target() {
                movement.speed as f32
            } else {
                0.0
            };
            if animation.set("speed", speed) {
                changed.push(entity);
            }
        }
        for entity in changed {
            world.add(entity, DirtyAnimation)?;
        }
        Ok(())
    }
}
