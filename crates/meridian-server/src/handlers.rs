//! Event subscribers that keep lookup tables, persistence models and
//! clients in step with the world.
//!
//! Handlers run synchronously inside `publish`. The entity an event names
//! may be destroyed later in the same tick, so every handler re-checks what
//! it reads and treats a missing component as nothing to do.

use meridian_ecs::prelude::*;
use tracing::{debug, info, warn};

use crate::boundary::network::OutboundMessage;
use crate::boundary::persistence::{AccountRecord, Record};
use crate::components::{Character, Identity, Item, LoggedIn};
use crate::events::{
    AoiEntered, AoiLeft, AoiStayed, ChunkCreated, ChunkDestroyed, Created, Destroyed, ItemAdded,
    ItemRemoved, ItemUpdated, Login, Logout, Register,
};
use crate::spatial::aoi::Aoi;
use crate::state::GameState;
use crate::systems::network::dirty_messages;

/// Peer of a logged-in character.
fn peer_of(world: &World, entity: EntityId) -> Option<u64> {
    if !world.has::<LoggedIn>(entity) {
        return None;
    }
    world.get::<Character>(entity).ok().map(|c| c.peer)
}

fn id_of(world: &World, entity: EntityId) -> u64 {
    world.get::<Identity>(entity).map_or(0, |i| i.id)
}

/// Register every handler the server relies on.
pub fn subscribe_all(events: &mut EventBus<GameState>) {
    subscribe_lifecycle(events);
    subscribe_sessions(events);
    subscribe_inventory(events);
    subscribe_visibility(events);
}

fn subscribe_lifecycle(events: &mut EventBus<GameState>) {
    events.subscribe(|e: &Created, state: &mut GameState| {
        if let Some(previous) = state.identities.insert(e.link.id, e.link.entity) {
            if previous != e.link.entity {
                warn!(id = e.link.id, %previous, entity = %e.link.entity, "identity rebound");
            }
        }
    });

    events.subscribe(|e: &Destroyed, state: &mut GameState| {
        let entity = e.link.entity;
        state.identities.remove(e.link.id, entity);
        if e.unloaded {
            state.models.evict(&state.world, entity);
        } else {
            state.models.delete(entity);
        }

        let watchers: Vec<EntityId> = state
            .world
            .query::<(&Aoi,)>()
            .filter(|(_, (aoi,))| aoi.visible.contains(&entity))
            .map(|(observer, _)| observer)
            .collect();
        for observer in watchers {
            if let Ok(aoi) = state.world.get_mut::<Aoi>(observer) {
                aoi.forget(entity);
            }
            if let Some(peer) = peer_of(&state.world, observer) {
                state.send(peer, OutboundMessage::Despawn { id: e.link.id });
            }
        }
        debug!(%entity, tag = %e.tag, unloaded = e.unloaded, "destroyed");
    });

    events.subscribe(|e: &ChunkCreated, state: &mut GameState| {
        state.chunks.insert(e.grid, e.entity);
    });

    events.subscribe(|e: &ChunkDestroyed, state: &mut GameState| {
        state.chunks.remove(e.grid, e.entity);
    });
}

fn subscribe_sessions(events: &mut EventBus<GameState>) {
    events.subscribe(|e: &Login, state: &mut GameState| {
        let history: Vec<OutboundMessage> = state
            .chat
            .iter()
            .map(|line| OutboundMessage::Chat {
                from: line.from.clone(),
                message: line.message.clone(),
            })
            .collect();
        let replayed = history.len();
        for message in history {
            state.send(e.peer, message);
        }
        info!(character = %e.character, peer = e.peer, replayed, "login");
    });

    events.subscribe(|e: &Register, state: &mut GameState| {
        let character = id_of(&state.world, e.character);
        state.models.push(Record::Account(AccountRecord {
            name: e.name.clone(),
            character,
        }));
        info!(name = %e.name, character, "registered");
    });

    events.subscribe(|e: &Logout, _state: &mut GameState| {
        info!(character = %e.character, peer = e.peer, "logout");
    });
}

fn subscribe_inventory(events: &mut EventBus<GameState>) {
    events.subscribe(|e: &ItemAdded, state: &mut GameState| {
        let world = &state.world;
        let (Some(peer), Ok(identity), Ok(item)) = (
            peer_of(world, e.owner),
            world.get::<Identity>(e.item),
            world.get::<Item>(e.item),
        ) else {
            return;
        };
        let message = OutboundMessage::InventoryAdd {
            owner: id_of(world, e.owner),
            item: identity.id,
            kind: identity.kind.clone(),
            amount: item.amount,
        };
        state.send(peer, message);
    });

    events.subscribe(|e: &ItemUpdated, state: &mut GameState| {
        let world = &state.world;
        let (Some(peer), Ok(item)) = (peer_of(world, e.owner), world.get::<Item>(e.item)) else {
            return;
        };
        let message = OutboundMessage::InventoryUpdate {
            owner: id_of(world, e.owner),
            item: id_of(world, e.item),
            amount: item.amount,
        };
        state.send(peer, message);
    });

    events.subscribe(|e: &ItemRemoved, state: &mut GameState| {
        let Some(peer) = peer_of(&state.world, e.owner) else {
            return;
        };
        let owner = id_of(&state.world, e.owner);
        state.send(
            peer,
            OutboundMessage::InventoryRemove {
                owner,
                item: e.item.id,
            },
        );
    });
}

fn subscribe_visibility(events: &mut EventBus<GameState>) {
    events.subscribe(|e: &AoiEntered, state: &mut GameState| {
        let Some(peer) = peer_of(&state.world, e.observer) else {
            return;
        };
        let Ok(identity) = state.world.get::<Identity>(e.entity) else {
            return;
        };
        let (id, kind) = (identity.id, identity.kind.clone());
        match state.world.entity_to_json(e.entity) {
            Ok(components) => state.send(peer, OutboundMessage::Spawn { id, kind, components }),
            Err(err) => warn!(entity = %e.entity, error = %err, "entity not serialisable"),
        }
    });

    events.subscribe(|e: &AoiStayed, state: &mut GameState| {
        let Some(peer) = peer_of(&state.world, e.observer) else {
            return;
        };
        for message in dirty_messages(&state.world, e.entity) {
            state.send(peer, message);
        }
    });

    events.subscribe(|e: &AoiLeft, state: &mut GameState| {
        if e.entity.id == 0 {
            return;
        }
        if let Some(peer) = peer_of(&state.world, e.observer) {
            state.send(peer, OutboundMessage::Despawn { id: e.entity.id });
        }
    });
}
