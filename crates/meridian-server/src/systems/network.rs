//! Per-tick delta synchronisation.
//!
//! Full snapshots and despawns are driven by AOI events from the physics
//! interval. Between those, every tick announces entities that carry a dirty
//! flag to the observers that can see them, and sends characters their own
//! changes.

use meridian_ecs::prelude::*;
use tracing::trace;

use crate::boundary::network::OutboundMessage;
use crate::components::{
    Animation, Character, DirtyAnimation, DirtyHealth, DirtyTransform, Health, Identity, LoggedIn,
    Transform,
};
use crate::error::ServerError;
use crate::events::AoiStayed;
use crate::schedule::{Context, System};
use crate::spatial::aoi::Aoi;

pub fn transform_message(world: &World, entity: EntityId) -> Option<OutboundMessage> {
    let id = world.get::<Identity>(entity).ok()?.id;
    let transform = world.get::<Transform>(entity).ok()?;
    Some(OutboundMessage::Transform {
        id,
        position: transform.pos.to_array(),
        rotation: transform.rot.to_array(),
    })
}

pub fn health_message(world: &World, entity: EntityId) -> Option<OutboundMessage> {
    let id = world.get::<Identity>(entity).ok()?.id;
    let health = world.get::<Health>(entity).ok()?;
    Some(OutboundMessage::Health {
        id,
        current: health.current,
        max: health.max,
    })
}

pub fn animation_message(world: &World, entity: EntityId) -> Option<OutboundMessage> {
    let id = world.get::<Identity>(entity).ok()?.id;
    let animation = world.get::<Animation>(entity).ok()?;
    Some(OutboundMessage::Animation {
        id,
        params: animation.params.clone(),
        triggers: animation.triggers.clone(),
    })
}

/// Delta messages owed for `entity` this tick, by its dirty flags.
pub fn dirty_messages(world: &World, entity: EntityId) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    if world.has::<DirtyTransform>(entity) {
        out.extend(transform_message(world, entity));
    }
    if world.has::<DirtyHealth>(entity) {
        out.extend(health_message(world, entity));
    }
    if world.has::<DirtyAnimation>(entity) {
        out.extend(animation_message(world, entity));
    }
    out
}

fn is_dirty(world: &World, entity: EntityId) -> bool {
    world.has::<DirtyTransform>(entity)
        || world.has::<DirtyHealth>(entity)
        || world.has::<DirtyAnimation>(entity)
}

/// Publishes `AoiStayed` for every dirty entity a logged-in observer sees.
pub struct NetworkSystem;

impl System for NetworkSystem {
    fn name(&self) -> &str {
        "network"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let world = &ctx.state.world;
        let mut stayed = Vec::new();
        for (observer, (aoi,)) in
            world.query_filtered::<(&Aoi,)>(&Filter::new().with::<LoggedIn>())
        {
            stayed.extend(
                aoi.visible
                    .iter()
                    .filter(|e| world.is_alive(**e) && is_dirty(world, **e))
                    .map(|entity| AoiStayed {
                        observer,
                        entity: *entity,
                    }),
            );
        }
        if !stayed.is_empty() {
            trace!(deltas = stayed.len(), "aoi deltas");
        }
        for event in &stayed {
            ctx.publish(event);
        }
        Ok(())
    }
}

/// Sends each logged-in character its own dirty transform and health.
pub struct CharacterNetworkSystem;

impl System for CharacterNetworkSystem {
    fn name(&self) -> &str {
        "character_network"
    }

    fn update(&mut self, ctx: &mut Context<'_>, _dt: f64) -> Result<(), ServerError> {
        let state = &mut *ctx.state;
        let mut outgoing = Vec::new();
        for (entity, (character,)) in state
            .world
            .query_filtered::<(&Character,)>(&Filter::new().with::<LoggedIn>())
        {
            if state.world.has::<DirtyTransform>(entity) {
                outgoing.extend(transform_message(&state.world, entity).map(|m| (character.peer, m)));
            }
            if state.world.has::<DirtyHealth>(entity) {
                outgoing.extend(health_message(&state.world, entity).map(|m| (character.peer, m)));
            }
        }
        for (peer, message) in outgoing {
            state.send(peer, message);
        }
        Ok(())
    }
}
