//! Weak references between entities and the logical-id lookup table.
//!
//! An [`EntityLink`] pairs a store handle with the logical id from the
//! target's `Identity`. The handle is tried first; when it has gone stale
//! (the entity was unloaded and later rematerialised, for example) the
//! logical id is looked up in the [`IdentityMap`] instead. A link never keeps
//! its target alive.

use std::collections::HashMap;
use std::fmt;

use meridian_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Handle plus logical id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityLink {
    pub entity: EntityId,
    pub id: u64,
}

impl EntityLink {
    /// A link that resolves to nothing.
    pub const NONE: EntityLink = EntityLink {
        entity: EntityId::DANGLING,
        id: 0,
    };

    pub fn new(entity: EntityId, id: u64) -> Self {
        Self { entity, id }
    }

    pub fn is_none(&self) -> bool {
        self.entity.is_dangling() && self.id == 0
    }

    /// The live entity this link refers to, if any.
    pub fn resolve(&self, world: &World, identities: &IdentityMap) -> Option<EntityId> {
        if world.is_alive(self.entity) {
            return Some(self.entity);
        }
        if self.id == 0 {
            return None;
        }
        identities.get(self.id).filter(|e| world.is_alive(*e))
    }
}

impl Default for EntityLink {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for EntityLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({:?}, #{})", self.entity, self.id)
    }
}

impl fmt::Display for EntityLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

// ---------------------------------------------------------------------------
// IdentityMap
// ---------------------------------------------------------------------------

/// `Identity.id -> EntityId`, maintained from `Created`/`Destroyed` events.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_id: HashMap<u64, EntityId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous holder of `id`, if there was one.
    pub fn insert(&mut self, id: u64, entity: EntityId) -> Option<EntityId> {
        self.by_id.insert(id, entity)
    }

    /// Remove `id` only if it still maps to `entity`.
    pub fn remove(&mut self, id: u64, entity: EntityId) -> bool {
        match self.by_id.get(&id) {
            Some(current) if *current == entity => {
                self.by_id.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<EntityId> {
        self.by_id.get(&id).copied()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
