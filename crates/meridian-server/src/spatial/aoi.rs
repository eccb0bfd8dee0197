//! Area-of-interest bookkeeping.
//!
//! Each observer keeps the set it saw last frame. Feeding it this frame's set
//! yields three disjoint deltas: `entered = now − last`, `left = last − now`
//! and `stayed = now ∩ last`.

use std::collections::BTreeSet;

use meridian_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-observer visibility state. Stored as a component on observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aoi {
    /// Edge length of the square range around the observer. Zero means the
    /// server-wide default.
    pub range: f64,
    pub visible: BTreeSet<EntityId>,
    pub entered: Vec<EntityId>,
    pub left: Vec<EntityId>,
    pub stayed: Vec<EntityId>,
}

impl Aoi {
    pub fn with_range(range: f64) -> Self {
        Self {
            range,
            ..Default::default()
        }
    }

    /// Replace the visible set with `now` and recompute the deltas.
    pub fn update(&mut self, now: BTreeSet<EntityId>) {
        self.entered = now.difference(&self.visible).copied().collect();
        self.left = self.visible.difference(&now).copied().collect();
        self.stayed = now.intersection(&self.visible).copied().collect();
        self.visible = now;
    }

    /// Forget everything, reporting the whole visible set as left.
    pub fn clear(&mut self) {
        self.update(BTreeSet::new());
    }

    /// Drop `entity` from the visible set without reporting it.
    pub fn forget(&mut self, entity: EntityId) -> bool {
        self.visible.remove(&entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
