//! Deferred game-logic intents and their per-kind queues.
//!
//! Producers (the network boundary, the console, systems) enqueue commands at
//! any time. Each queue is drained exactly once per tick by its executor.
//! Draining swaps the queue out first, so anything enqueued while a batch is
//! executing waits for the next tick.

use std::collections::VecDeque;

use glam::DVec2;

use crate::boundary::persistence::LoadedChunk;
use crate::link::EntityLink;
use crate::spatial::grid::Grid;

#[derive(Debug, Clone, PartialEq)]
pub struct TeleportCommand {
    pub target: EntityLink,
    pub position: DVec2,
}

/// A single click on the ground or on an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickCommand {
    Ground { clicker: EntityLink, position: DVec2 },
    Entity { clicker: EntityLink, target: EntityLink },
}

/// Walk somewhere, abandoning chopping or building.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleClickCommand {
    pub clicker: EntityLink,
    pub position: DVec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildCommand {
    pub builder: EntityLink,
    /// Prototype key of the recipe.
    pub recipe: String,
    pub position: DVec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PickupCommand {
    pub actor: EntityLink,
    pub target: EntityLink,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InventoryOp {
    Add { kind: String, amount: u32 },
    Subtract { kind: String, amount: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryCommand {
    pub owner: EntityLink,
    pub op: InventoryOp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCommand {
    pub sender: EntityLink,
    pub message: String,
}

/// Result of a chunk lookup, applied on the tick after it was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkCommand {
    /// Nothing saved; generate from scratch.
    Create { grid: Grid },
    /// Materialise a saved chunk and its contents.
    Load(Box<LoadedChunk>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityCommand {
    Spawn { kind: String, position: DVec2 },
    Destroy { target: EntityLink },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupCommand {
    pub owner: EntityLink,
    pub target: EntityLink,
    /// Prototype key of the popup.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// FIFO of one command kind.
#[derive(Debug, Clone)]
pub struct CommandQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, command: T) {
        self.items.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take the current batch, leaving the queue empty for re-entrant
    /// producers.
    pub fn take(&mut self) -> VecDeque<T> {
        std::mem::take(&mut self.items)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// One queue per command kind.
#[derive(Debug, Default)]
pub struct CommandQueues {
    pub teleport: CommandQueue<TeleportCommand>,
    pub click: CommandQueue<ClickCommand>,
    pub double_click: CommandQueue<DoubleClickCommand>,
    pub build: CommandQueue<BuildCommand>,
    pub pickup: CommandQueue<PickupCommand>,
    pub inventory: CommandQueue<InventoryCommand>,
    pub chat: CommandQueue<ChatCommand>,
    pub chunk: CommandQueue<ChunkCommand>,
    pub entity: CommandQueue<EntityCommand>,
    pub popup: CommandQueue<PopupCommand>,
}

impl CommandQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands waiting across all queues.
    pub fn pending(&self) -> usize {
        self.teleport.len()
            + self.click.len()
            + self.double_click.len()
            + self.build.len()
            + self.pickup.len()
            + self.inventory.len()
            + self.chat.len()
            + self.chunk.len()
            + self.entity.len()
            + self.popup.len()
    }
}
