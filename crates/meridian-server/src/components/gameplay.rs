//! Inventory, crafting, activities and combat.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use meridian_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::link::EntityLink;

// -- inventory ----------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<EntityLink>,
}

/// A stack of some item type. The type is the holder's `Identity.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub amount: u32,
    pub stackable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InInventory {
    pub owner: EntityLink,
}

/// Items granted to whoever kills the holder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loot {
    pub items: Vec<Ingredient>,
}

// -- crafting -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub kind: String,
    pub amount: u32,
}

impl Ingredient {
    pub fn new(kind: &str, amount: u32) -> Self {
        Self {
            kind: kind.to_owned(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Exactly where the player asked.
    Target,
    /// The centre of the `tile_zoom` tile containing the actor.
    TileCenter,
}

/// On a recipe prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub ingredients: Vec<Ingredient>,
    /// Prototype key of the structure produced.
    pub produces: String,
    /// Seconds of presence needed to finish.
    pub duration: f32,
    /// How close the builder must stand.
    pub distance: f64,
    pub requires_free_space: bool,
    pub placement: Placement,
}

/// Construction in progress, carried by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub position: DVec2,
    pub distance: f64,
    pub duration: f32,
    pub structure: String,
    /// The structure once it has been placed.
    pub entity: EntityLink,
}

// -- activities ---------------------------------------------------------------

/// Harvesting a resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chop {
    pub target: EntityLink,
}

/// Walking to a ground item to pick it up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub target: EntityLink,
}

/// Axis-aligned box around the position, `size` degrees on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collisions {
    pub current: BTreeSet<EntityId>,
    pub entered: Vec<EntityId>,
    pub left: Vec<EntityId>,
}

// -- combat -------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InCombat {
    pub defenders: BTreeSet<EntityLink>,
    /// Seconds until the next swing.
    pub timer: f32,
}

/// Seconds between swings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackSpeed {
    pub seconds: f32,
}

/// Reach, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackDamage {
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalResistance {
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnDeathRespawn {
    pub seconds: f32,
    pub remaining: f32,
}

impl OnDeathRespawn {
    pub fn after(seconds: f32) -> Self {
        Self {
            seconds,
            remaining: seconds,
        }
    }
}

/// A one-shot damage event, stored as its own entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Damage {
    pub sender: EntityLink,
    pub receiver: EntityLink,
    /// The hit brought the receiver to zero.
    pub killed: bool,
    /// The damage system has processed this entity.
    pub applied: bool,
}

impl Damage {
    pub fn new(sender: EntityLink, receiver: EntityLink) -> Self {
        Self {
            sender,
            receiver,
            killed: false,
            applied: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDamage(pub f32);

/// Marks damage dealt by chopping; kills grant loot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChopDamage;

// -- behaviour ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BrainState {
    Idle,
    Wander,
    Chase(EntityLink),
}

/// Mob decision state, advanced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobBrain {
    pub state: BrainState,
    /// Seconds left in the current state.
    pub timer: f32,
    /// Edge of the square searched for players.
    pub sense_range: f64,
}

impl MobBrain {
    pub fn new(sense_range: f64) -> Self {
        Self {
            state: BrainState::Idle,
            timer: 0.0,
            sense_range,
        }
    }
}

/// Parameters and one-shot triggers mirrored to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub params: BTreeMap<String, f32>,
    pub triggers: Vec<String>,
}

impl Animation {
    /// Set `name` and report whether it changed.
    pub fn set(&mut self, name: &str, value: f32) -> bool {
        match self.params.insert(name.to_owned(), value) {
            Some(old) => old != value,
            None => true,
        }
    }

    pub fn trigger(&mut self, name: &str) {
        self.triggers.push(name.to_owned());
    }
}
