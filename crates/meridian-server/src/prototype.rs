//! Prototype registry.
//!
//! A prototype is a `Prefab` row in the world holding the full component set
//! of some entity type. Instantiating clones that row and strips `Prefab`, so
//! queries that exclude prefabs see the copy and never the template.

use std::collections::BTreeMap;

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::debug;

use crate::components::{Identity, Prefab, Transform};
use crate::error::ServerError;

#[derive(Debug, Default)]
pub struct PrototypeRegistry {
    templates: BTreeMap<String, EntityId>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bundle` under `kind` (`"<category>:<variant>"`). The category
    /// becomes the identity tag. Re-registering replaces the template.
    pub fn register(&mut self, world: &mut World, kind: &str, bundle: ComponentBundle) -> EntityId {
        self.register_with(world, kind, bundle, |_, _| {})
    }

    /// Like [`register`](Self::register), then run `configure` on the fresh
    /// template row.
    pub fn register_with(
        &mut self,
        world: &mut World,
        kind: &str,
        mut bundle: ComponentBundle,
        configure: impl FnOnce(&mut World, EntityId),
    ) -> EntityId {
        let tag = kind.split(':').next().unwrap_or(kind);
        if !bundle.contains::<Identity>() {
            bundle.add(Identity::new(tag, kind));
        }
        bundle.add(Prefab);
        let template = world.spawn(bundle);
        configure(world, template);
        if let Some(old) = self.templates.insert(kind.to_owned(), template) {
            if world.despawn(old).is_ok() {
                debug!(kind, "prototype replaced");
            }
        }
        template
    }

    /// The template row, for reading static data.
    pub fn template(&self, kind: &str) -> Option<EntityId> {
        self.templates.get(kind).copied()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.templates.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Clone the template of `kind` into a live entity.
    pub fn instantiate(&self, world: &mut World, kind: &str) -> Result<EntityId, ServerError> {
        let template = self
            .template(kind)
            .ok_or_else(|| ServerError::UnknownPrototype {
                kind: kind.to_owned(),
            })?;
        let entity = world.clone_entity(template)?;
        world.remove::<Prefab>(entity)?;
        Ok(entity)
    }

    /// Instantiate `kind` at `pos`, adding a transform if the template has none.
    pub fn instantiate_at(
        &self,
        world: &mut World,
        kind: &str,
        pos: DVec2,
    ) -> Result<EntityId, ServerError> {
        let entity = self.instantiate(world, kind)?;
        match world.get_mut::<Transform>(entity) {
            Ok(t) => t.pos = pos,
            Err(_) => world.add(entity, Transform::at(pos))?,
        }
        Ok(entity)
    }
}
