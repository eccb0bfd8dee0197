//! Chunks, biomes and procedural spawning.

use std::collections::BTreeSet;

use meridian_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::spatial::grid::Grid;

/// A persistent slice of the map that owns the entities inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub grid: Grid,
    /// Simulation time of creation, in seconds.
    pub created_at: f64,
    /// Loaders keeping this chunk alive.
    pub loaded_by: BTreeSet<EntityId>,
    /// Entities whose position lies inside the chunk.
    pub contains: BTreeSet<EntityId>,
    /// Seconds left before an unloaded chunk is destroyed.
    pub decay: Option<f32>,
}

impl Chunk {
    pub fn new(grid: Grid, created_at: f64) -> Self {
        Self {
            grid,
            created_at,
            loaded_by: BTreeSet::new(),
            contains: BTreeSet::new(),
            decay: None,
        }
    }
}

/// An entity that keeps the chunks around it loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkLoader {
    /// Centre of the currently loaded neighbourhood.
    pub current: Option<Grid>,
}

/// The biome a chunk was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biome {
    pub kind: String,
}

/// On a biome prototype: which biome codes it may be chosen for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomeRule {
    pub codes: Vec<u16>,
    pub weight: f32,
}

/// Threshold a noise sample must pass for an entry to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NoiseCondition {
    Greater(f64),
    Less(f64),
    Always,
}

impl NoiseCondition {
    pub fn matches(&self, sample: f64) -> bool {
        match *self {
            NoiseCondition::Greater(t) => sample > t,
            NoiseCondition::Less(t) => sample < t,
            NoiseCondition::Always => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    /// Prototype key to instantiate.
    pub prototype: String,
    pub weight: f32,
    pub condition: NoiseCondition,
    /// Mobs roll a per-cell chance instead of filling every cell.
    pub mob: bool,
}

/// What a biome spawns, copied onto chunks that get that biome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnTable {
    /// Cells per tile edge.
    pub resolution: u32,
    pub entries: Vec<SpawnEntry>,
}

/// Noise samples over a chunk's tile, row-major, north to south.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseGrid {
    pub resolution: u32,
    pub values: Vec<f64>,
}

impl NoiseGrid {
    pub fn get(&self, row: u32, col: u32) -> f64 {
        self.values[(row * self.resolution + col) as usize]
    }
}

/// The spawner has filled this chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated;
