//! Deferred structural mutations.
//!
//! A [`CommandBuffer`] records `Create`, `Add`, `Set`, `Remove` and `Destroy`
//! operations while a system iterates the world, and applies them in FIFO
//! order when [`CommandBuffer::playback`] is called at a scheduler barrier.
//!
//! Handles are only checked at playback time. By then an entity may have been
//! destroyed by another system in the same tick, so an operation against a
//! stale handle is logged and skipped rather than treated as an error.
//!
//! # Example
//!
//! ```
//! use meridian_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Health(u32);
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Dead;
//!
//! let mut world = World::new();
//! let entity = world.spawn_one(Health(0));
//!
//! let mut cmds = CommandBuffer::new();
//! for (e, (hp,)) in world.query::<(&Health,)>() {
//!     if hp.0 == 0 {
//!         cmds.add(e, Dead);
//!     }
//! }
//!
//! let report = cmds.playback(&mut world);
//! assert_eq!(report.applied, 1);
//! assert!(world.has::<Dead>(entity));
//! ```

use std::any::TypeId;

use tracing::{debug, warn};

use crate::component::{Component, ComponentValue};
use crate::entity::EntityId;
use crate::world::{ComponentBundle, World};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Op
// ---------------------------------------------------------------------------

/// One recorded operation.
#[derive(Debug)]
enum Op {
    Create(ComponentBundle),
    Add(EntityId, Box<dyn ComponentValue>),
    Set(EntityId, Box<dyn ComponentValue>),
    Remove {
        entity: EntityId,
        component: TypeId,
        name: &'static str,
    },
    Destroy(EntityId),
}

impl Op {
    fn kind(&self) -> &'static str {
        match self {
            Op::Create(_) => "create",
            Op::Add(..) => "add",
            Op::Set(..) => "set",
            Op::Remove { .. } => "remove",
            Op::Destroy(_) => "destroy",
        }
    }

    fn target(&self) -> Option<EntityId> {
        match self {
            Op::Create(_) => None,
            Op::Add(e, _) | Op::Set(e, _) | Op::Destroy(e) => Some(*e),
            Op::Remove { entity, .. } => Some(*entity),
        }
    }
}

impl Clone for Op {
    fn clone(&self) -> Self {
        match self {
            Op::Create(bundle) => Op::Create(bundle.clone()),
            Op::Add(e, v) => Op::Add(*e, v.clone_boxed()),
            Op::Set(e, v) => Op::Set(*e, v.clone_boxed()),
            Op::Remove {
                entity,
                component,
                name,
            } => Op::Remove {
                entity: *entity,
                component: *component,
                name: *name,
            },
            Op::Destroy(e) => Op::Destroy(*e),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackReport
// ---------------------------------------------------------------------------

/// Outcome of one [`CommandBuffer::playback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Operations that changed the world.
    pub applied: usize,
    /// Operations whose target was no longer alive.
    pub stale: usize,
    /// `Remove` of a component the entity did not have.
    pub skipped: usize,
    /// `Set` of a component the entity did not have.
    pub failed: usize,
    /// Entities created by `Create` operations, in recording order.
    pub created: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO log of structural mutations applied at a barrier.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    ops: Vec<Op>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity holding `bundle`.
    pub fn create(&mut self, bundle: ComponentBundle) {
        self.ops.push(Op::Create(bundle));
    }

    /// Insert `value` (or overwrite an existing one).
    pub fn add<T: Component>(&mut self, entity: EntityId, value: T) {
        self.ops.push(Op::Add(entity, Box::new(value)));
    }

    /// Overwrite an existing component; fails at playback if absent.
    pub fn set<T: Component>(&mut self, entity: EntityId, value: T) {
        self.ops.push(Op::Set(entity, Box::new(value)));
    }

    pub fn remove<T: Component>(&mut self, entity: EntityId) {
        self.ops.push(Op::Remove {
            entity,
            component: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        });
    }

    pub fn destroy(&mut self, entity: EntityId) {
        self.ops.push(Op::Destroy(entity));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Apply every recorded operation in order and empty the buffer.
    pub fn playback(&mut self, world: &mut World) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        for op in self.ops.drain(..) {
            let kind = op.kind();
            let target = op.target();
            let result = match op {
                Op::Create(bundle) => {
                    report.created.push(world.spawn(bundle));
                    Ok(())
                }
                Op::Add(entity, value) => world.add_boxed(entity, value),
                Op::Set(entity, value) => world.set_boxed(entity, value),
                Op::Remove {
                    entity,
                    component,
                    name,
                } => world.remove_type(entity, component, name),
                Op::Destroy(entity) => world.despawn(entity),
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(EcsError::InvalidEntity { entity }) => {
                    warn!(%entity, op = kind, "command targets a dead entity; skipped");
                    report.stale += 1;
                }
                Err(EcsError::MissingComponent { entity, component }) if kind == "remove" => {
                    debug!(%entity, %component, "remove of absent component ignored");
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(entity = ?target, op = kind, error = %err, "command failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Name(String);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Dead;

    fn setup_world() -> World {
        let mut world = World::new();
        world.register::<Health>("health");
        world.register::<Name>("name");
        world.register::<Dead>("dead");
        world
    }

    #[test]
    fn playback_applies_in_recording_order() {
        let mut world = setup_world();
        let e = world.spawn_one(Health(10));

        let mut cmds = CommandBuffer::new();
        cmds.set(e, Health(5));
        cmds.add(e, Health(7));
        cmds.add(e, Name("wolf".into()));
        let report = cmds.playback(&mut world);

        assert_eq!(report.applied, 3);
        assert_eq!(world.get::<Health>(e).unwrap(), &Health(7));
        assert_eq!(world.get::<Name>(e).unwrap(), &Name("wolf".into()));
        assert!(cmds.is_empty());
    }

    #[test]
    fn create_reports_new_handles() {
        let mut world = setup_world();
        let mut cmds = CommandBuffer::new();
        cmds.create(ComponentBundle::new().with(Health(1)));
        cmds.create(ComponentBundle::new().with(Health(2)).with(Dead));
        let report = cmds.playback(&mut world);

        assert_eq!(report.created.len(), 2);
        assert_eq!(world.get::<Health>(report.created[1]).unwrap(), &Health(2));
        assert!(world.has::<Dead>(report.created[1]));
        assert!(!world.has::<Dead>(report.created[0]));
    }

    #[test]
    fn stale_targets_are_skipped_not_fatal() {
        let mut world = setup_world();
        let gone = world.spawn_one(Health(1));
        let alive = world.spawn_one(Health(2));

        let mut cmds = CommandBuffer::new();
        cmds.destroy(gone);
        cmds.add(gone, Dead);
        cmds.set(gone, Health(0));
        cmds.add(alive, Dead);
        let report = cmds.playback(&mut world);

        assert_eq!(report.applied, 2);
        assert_eq!(report.stale, 2);
        assert!(world.has::<Dead>(alive));
    }

    #[test]
    fn destroy_twice_in_one_buffer() {
        let mut world = setup_world();
        let e = world.spawn_one(Health(1));
        let mut cmds = CommandBuffer::new();
        cmds.destroy(e);
        cmds.destroy(e);
        let report = cmds.playback(&mut world);
        assert_eq!(report.applied, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn remove_of_absent_component_is_skipped() {
        let mut world = setup_world();
        let e = world.spawn_one(Health(1));
        let mut cmds = CommandBuffer::new();
        cmds.remove::<Dead>(e);
        cmds.remove::<Health>(e);
        let report = cmds.playback(&mut world);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 1);
        assert!(!world.has::<Health>(e));
    }

    #[test]
    fn set_of_absent_component_fails() {
        let mut world = setup_world();
        let e = world.spawn_one(Health(1));
        let mut cmds = CommandBuffer::new();
        cmds.set(e, Name("x".into()));
        let report = cmds.playback(&mut world);
        assert_eq!(report.failed, 1);
        assert!(!world.has::<Name>(e));
    }

    #[test]
    fn cloned_buffer_replays_identically() {
        let build = |world: &mut World| {
            let a = world.spawn_one(Health(3));
            let b = world.spawn_one(Health(4));
            (a, b)
        };
        let mut w1 = setup_world();
        let mut w2 = setup_world();
        let (a, b) = build(&mut w1);
        build(&mut w2);

        let mut cmds = CommandBuffer::new();
        cmds.add(a, Dead);
        cmds.remove::<Health>(b);
        cmds.create(ComponentBundle::new().with(Name("c".into())));
        cmds.destroy(a);

        let mut replay = cmds.clone();
        cmds.playback(&mut w1);
        replay.playback(&mut w2);
        assert_eq!(w1.state_hash(), w2.state_hash());
    }

    #[test]
    fn empty_playback_is_noop() {
        let mut world = setup_world();
        world.spawn_one(Health(1));
        let before = world.state_hash();
        let report = CommandBuffer::new().playback(&mut world);
        assert_eq!(report, PlaybackReport::default());
        assert_eq!(world.state_hash(), before);
    }
}
