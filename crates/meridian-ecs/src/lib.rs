//! Meridian ECS -- archetype-based entity component store for game servers.
//!
//! Entities are stored in archetypes (one table per exact component set) with
//! one column per component type. Generational entity ids make stale handles
//! detectable: resolving a handle whose slot has been recycled fails with
//! [`EcsError::InvalidEntity`] instead of returning another entity's data.
//!
//! Structural changes made while iterating are recorded into a
//! [`CommandBuffer`](command::CommandBuffer) and played back at a barrier.
//! Lifecycle notifications go through a synchronous, typed
//! [`EventBus`](event::EventBus).
//!
//! # Quick Start
//!
//! ```
//! use meridian_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f64, y: f64 }
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Speed(f64);
//!
//! let mut world = World::new();
//! world.register::<Position>("position");
//! world.register::<Speed>("speed");
//!
//! let entity = world.spawn(
//!     ComponentBundle::new()
//!         .with(Position { x: 0.0, y: 0.0 })
//!         .with(Speed(2.0)),
//! );
//!
//! for (_, (pos, speed)) in world.query_mut::<(&mut Position, &Speed)>() {
//!     pos.x += speed.0;
//! }
//!
//! assert_eq!(world.get::<Position>(entity).unwrap(), &Position { x: 2.0, y: 0.0 });
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod event;
pub mod query;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The handle is stale or was never allocated.
    #[error("entity {entity:?} is not alive")]
    InvalidEntity { entity: entity::EntityId },

    /// The entity is alive but lacks the requested component.
    #[error("entity {entity:?} has no component '{component}'")]
    MissingComponent {
        entity: entity::EntityId,
        component: String,
    },

    /// No component is registered under this name.
    #[error("component '{name}' is not registered")]
    UnknownComponent { name: String },

    #[error("failed to deserialize component '{name}': {source}")]
    ComponentDeserialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize component '{name}': {source}")]
    ComponentSerialization {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::command::{CommandBuffer, PlaybackReport};
    pub use crate::component::{Component, ComponentRegistry, ComponentTypeId, ComponentValue};
    pub use crate::entity::EntityId;
    pub use crate::event::EventBus;
    pub use crate::query::{Fetch, Filter, Query, QueryIter, QueryIterMut};
    pub use crate::world::{ComponentBundle, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
