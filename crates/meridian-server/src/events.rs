//! Events published on the game's [`EventBus`](meridian_ecs::event::EventBus).

use meridian_ecs::prelude::*;

use crate::link::EntityLink;
use crate::spatial::grid::Grid;

/// An identity was initialised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Created {
    pub link: EntityLink,
}

/// An initialised entity is about to be removed from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Destroyed {
    pub link: EntityLink,
    pub tag: String,
    /// Removed because its chunk unloaded rather than by gameplay.
    pub unloaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkCreated {
    pub entity: EntityId,
    pub grid: Grid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkDestroyed {
    pub entity: EntityId,
    pub grid: Grid,
}

/// A character connected (or reconnected).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Login {
    pub character: EntityId,
    pub peer: u64,
}

/// A character was created for a name seen for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub character: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Logout {
    pub character: EntityId,
    pub peer: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemAdded {
    pub owner: EntityId,
    pub item: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemUpdated {
    pub owner: EntityId,
    pub item: EntityId,
}

/// Published before the item entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemRemoved {
    pub owner: EntityId,
    pub item: EntityLink,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiEntered {
    pub observer: EntityId,
    pub entity: EntityId,
}

/// A visible entity changed this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiStayed {
    pub observer: EntityId,
    pub entity: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AoiLeft {
    pub observer: EntityId,
    pub entity: EntityLink,
}
