//! Identity, transform and lifecycle components.

use std::collections::BTreeSet;

use glam::{DQuat, DVec2};
use meridian_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::link::EntityLink;
use crate::spatial::grid::Grid;

/// Logical identity carried by every persistent or networked entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Process-unique id; zero until the entity is initialised.
    pub id: u64,
    /// Category, e.g. `"character"` or `"resource"`.
    pub tag: String,
    /// Prototype key, `"<category>:<variant>"`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Identity {
    pub fn new(tag: &str, kind: &str) -> Self {
        Self {
            id: 0,
            tag: tag.to_owned(),
            kind: kind.to_owned(),
        }
    }

    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }
}

/// Build a link to `entity` using its identity id (0 when it has none).
pub fn link_to(world: &World, entity: EntityId) -> EntityLink {
    let id = world.get::<Identity>(entity).map(|i| i.id).unwrap_or(0);
    EntityLink::new(entity, id)
}

/// Position `(lat, lon)`, heading and the chunk the entity is filed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub pos: DVec2,
    pub rot: DQuat,
    /// Grid of the chunk whose `contains` set holds this entity.
    pub chunk: Option<Grid>,
}

impl Transform {
    pub fn at(pos: DVec2) -> Self {
        Self {
            pos,
            rot: DQuat::IDENTITY,
            chunk: None,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(DVec2::ZERO)
    }
}

/// Where the entity walks to, in degrees per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// `DVec2::ZERO` means "no target".
    pub target: DVec2,
    pub speed: f64,
}

impl Movement {
    pub fn new(speed: f64) -> Self {
        Self {
            target: DVec2::ZERO,
            speed,
        }
    }

    pub fn has_target(&self) -> bool {
        self.target != DVec2::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn full(max: f32) -> Self {
        Self { current: max, max }
    }
}

/// Counts down and marks the entity `Destroy` at zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DestroyAfter {
    pub seconds: f32,
}

/// Entities destroyed together with this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parent {
    pub children: BTreeSet<EntityLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub parent: EntityLink,
}

/// A connected player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub peer: u64,
    /// May issue console commands through chat.
    pub admin: bool,
}

// -- tags ---------------------------------------------------------------------

macro_rules! tags {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
            pub struct $name;
        )+
    };
}

tags! {
    /// Template row; never simulated.
    Prefab,
    /// Marked for the end-of-frame sweep.
    Destroy,
    /// Present for exactly one frame after initialisation.
    Created,
    /// Has been given an id and announced.
    Initialized,
    /// Logged out or otherwise parked; excluded from spatial systems.
    Inactive,
    Dead,
    LoggedIn,
    /// One-frame: position changed this tick.
    Moving,
    /// One-frame: transform must be sent to observers.
    DirtyTransform,
    /// One-frame: health must be sent to observers.
    DirtyHealth,
    /// One-frame: animation must be sent to observers.
    DirtyAnimation,
    /// One-frame: attacked this tick.
    Attacks,
    /// Destroyed because its chunk unloaded; its record is kept.
    Unloaded,
}
