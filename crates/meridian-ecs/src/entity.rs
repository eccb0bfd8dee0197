//! Entity handles and slot allocation.
//!
//! An [`EntityId`] packs a *generation* in the high 32 bits and a slot
//! *index* in the low 32 bits. Destroying an entity bumps the generation of
//! its slot, so every handle issued before the destroy resolves as stale even
//! after the slot has been handed out again.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`. Ordering is by raw value, which
/// keeps `BTreeSet<EntityId>` iteration deterministic for a given run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// A handle that never resolves. Used as the "unset" value of links.
    pub const DANGLING: EntityId = EntityId(u64::MAX);

    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// Slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Whether this is [`EntityId::DANGLING`].
    #[inline]
    pub fn is_dangling(self) -> bool {
        self == Self::DANGLING
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::DANGLING
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dangling() {
            return f.write_str("Entity(dangling)");
        }
        write!(f, "Entity({}g{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}g{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    live: bool,
}

/// Hands out [`EntityId`]s and recycles freed slots.
///
/// Freed slots are reused in FIFO order so that a slot is not immediately
/// handed back to the system that just released it.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    live_count: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a live handle, reusing the oldest freed slot if there is one.
    pub fn allocate(&mut self) -> EntityId {
        self.live_count += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.live = true;
            return EntityId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            live: true,
        });
        EntityId::new(index, 0)
    }

    /// Release a handle. The slot's generation is bumped immediately.
    ///
    /// Returns `false` when the handle was already stale.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let slot = &mut self.slots[id.index() as usize];
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(id.index());
        self.live_count -= 1;
        true
    }

    /// Whether `id` names a live slot with a matching generation.
    pub fn is_live(&self, id: EntityId) -> bool {
        match self.slots.get(id.index() as usize) {
            Some(slot) => slot.live && slot.generation == id.generation(),
            None => false,
        }
    }

    /// The live handle currently occupying `index`, if any.
    pub fn resolve_index(&self, index: u32) -> Option<EntityId> {
        let slot = self.slots.get(index as usize)?;
        slot.live.then(|| EntityId::new(index, slot.generation))
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of slots ever allocated (live or free).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
