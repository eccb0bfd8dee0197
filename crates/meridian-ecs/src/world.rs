//! The [`World`]: entity allocator, component registry, and archetype tables.
//!
//! Structural changes (spawn, despawn, adding or removing a component) move
//! rows between archetypes and invalidate row positions. They take
//! `&mut self`, so the borrow checker already forbids them while a query
//! borrows the world; code that discovers structural work mid-iteration
//! records it into a [`CommandBuffer`](crate::command::CommandBuffer).

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use crate::archetype::{pair_mut, Archetype, ArchetypeId, Column};
use crate::component::{Component, ComponentRegistry, ComponentTypeId, ComponentValue};
use crate::entity::{EntityAllocator, EntityId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of component values used to create an entity in one step.
///
/// Adding a second value of the same type replaces the first, so a bundle
/// never describes a component set with duplicates.
#[derive(Debug, Default)]
pub struct ComponentBundle {
    values: Vec<Box<dyn ComponentValue>>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ComponentBundle::add`].
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.add(value);
        self
    }

    pub fn add<T: Component>(&mut self, value: T) {
        self.push_boxed(Box::new(value));
    }

    pub fn push_boxed(&mut self, value: Box<dyn ComponentValue>) {
        let ty = value.component_type();
        match self.values.iter_mut().find(|v| v.component_type() == ty) {
            Some(slot) => *slot = value,
            None => self.values.push(value),
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values
            .iter()
            .any(|v| v.component_type() == TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Clone for ComponentBundle {
    fn clone(&self) -> Self {
        Self {
            values: self.values.iter().map(|v| v.clone_boxed()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct EntityLocation {
    archetype: ArchetypeId,
    row: usize,
}

const UNPLACED: EntityLocation = EntityLocation {
    archetype: ArchetypeId(u32::MAX),
    row: usize::MAX,
};

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Archetype-organized entity and component store.
pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    pub(crate) archetypes: Vec<Archetype>,
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    /// Indexed by `EntityId::index`; meaningful only for live handles.
    locations: Vec<EntityLocation>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("archetypes", &self.archetypes.len())
            .field("components", &self.registry.len())
            .finish()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: Vec::new(),
        }
    }

    /// Register `T` under a stable name. Must happen before the type is
    /// first used, otherwise the lazily chosen Rust type name sticks.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        self.registry.register::<T>(name)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_live(entity)
    }

    /// The live handle currently occupying slot `index`, if any.
    pub fn resolve_index(&self, index: u32) -> Option<EntityId> {
        self.allocator.resolve_index(index)
    }

    /// All live entities in archetype-then-row order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.archetypes
            .iter()
            .flat_map(|a| a.entities().iter().copied())
    }

    // -- location bookkeeping -----------------------------------------------

    fn locate(&self, entity: EntityId) -> Result<EntityLocation, EcsError> {
        if !self.allocator.is_live(entity) {
            return Err(EcsError::InvalidEntity { entity });
        }
        Ok(self.locations[entity.index() as usize])
    }

    fn place(&mut self, entity: EntityId, archetype: ArchetypeId, row: usize) {
        let index = entity.index() as usize;
        if index >= self.locations.len() {
            self.locations.resize(index + 1, UNPLACED);
        }
        self.locations[index] = EntityLocation { archetype, row };
    }

    fn archetype_for(&mut self, types: Vec<ComponentTypeId>) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(&types) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let columns: Vec<Box<dyn Column>> = types
            .iter()
            .map(|t| match self.registry.info(*t) {
                Some(info) => (info.new_column)(),
                None => panic!("{t:?} is not registered with this world"),
            })
            .collect();
        tracing::trace!(archetype = id.0, components = types.len(), "created archetype");
        self.archetypes
            .push(Archetype::new(id, types.clone(), columns));
        self.archetype_index.insert(types, id);
        id
    }

    /// Move `entity` from its current row into `to`, carrying shared columns
    /// and dropping the rest. Returns the new row.
    fn relocate(&mut self, entity: EntityId, from: EntityLocation, to: ArchetypeId) -> usize {
        let (src, dst) = pair_mut(&mut self.archetypes, from.archetype, to);
        for (component, column) in src.columns_iter_mut() {
            match dst.column_mut(component) {
                Some(target) => column.move_row(from.row, &mut **target),
                None => column.discard_row(from.row),
            }
        }
        let moved = src.swap_remove_entity(from.row);
        let row = dst.push_entity(entity);
        if let Some(moved) = moved {
            self.place(moved, from.archetype, from.row);
        }
        self.place(entity, to, row);
        row
    }

    // -- creation and destruction -------------------------------------------

    /// Create an entity holding exactly the components of `bundle`.
    pub fn spawn(&mut self, bundle: ComponentBundle) -> EntityId {
        let mut values: Vec<(ComponentTypeId, Box<dyn ComponentValue>)> = bundle
            .values
            .into_iter()
            .map(|v| (v.register(&mut self.registry), v))
            .collect();
        values.sort_by_key(|(id, _)| *id);

        let types = values.iter().map(|(id, _)| *id).collect();
        let archetype = self.archetype_for(types);
        let entity = self.allocator.allocate();

        let table = &mut self.archetypes[archetype.index()];
        for (component, value) in values {
            if let Some(column) = table.column_mut(component) {
                value.push_to(&mut **column);
            }
        }
        let row = table.push_entity(entity);
        self.place(entity, archetype, row);
        entity
    }

    /// Spawn an entity with a single component.
    pub fn spawn_one<T: Component>(&mut self, value: T) -> EntityId {
        self.spawn(ComponentBundle::new().with(value))
    }

    /// Destroy `entity`, bumping its slot generation.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let loc = self.locate(entity)?;
        let moved = self.archetypes[loc.archetype.index()].discard(loc.row);
        if let Some(moved) = moved {
            self.place(moved, loc.archetype, loc.row);
        }
        self.allocator.free(entity);
        Ok(())
    }

    /// Create a new entity holding clones of every component of `source`.
    pub fn clone_entity(&mut self, source: EntityId) -> Result<EntityId, EcsError> {
        let loc = self.locate(source)?;
        let entity = self.allocator.allocate();
        let row = self.archetypes[loc.archetype.index()].duplicate(loc.row, entity);
        self.place(entity, loc.archetype, row);
        Ok(entity)
    }

    // -- component access ---------------------------------------------------

    fn missing<T>(entity: EntityId) -> EcsError {
        EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<T>().to_owned(),
        }
    }

    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        let loc = self.locate(entity)?;
        self.registry
            .lookup::<T>()
            .and_then(|c| self.archetypes[loc.archetype.index()].get::<T>(c, loc.row))
            .ok_or_else(|| Self::missing::<T>(entity))
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        let loc = self.locate(entity)?;
        let component = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| Self::missing::<T>(entity))?;
        self.archetypes[loc.archetype.index()]
            .get_mut::<T>(component, loc.row)
            .ok_or_else(|| Self::missing::<T>(entity))
    }

    /// `false` for stale handles as well as for missing components.
    pub fn has<T: 'static>(&self, entity: EntityId) -> bool {
        match (self.locate(entity), self.registry.lookup::<T>()) {
            (Ok(loc), Some(component)) => self.archetypes[loc.archetype.index()].contains(component),
            _ => false,
        }
    }

    /// Insert `value`, overwriting an existing component of the same type.
    pub fn add<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        self.add_boxed(entity, Box::new(value))
    }

    /// Type-erased [`World::add`].
    pub fn add_boxed(
        &mut self,
        entity: EntityId,
        value: Box<dyn ComponentValue>,
    ) -> Result<(), EcsError> {
        let loc = self.locate(entity)?;
        let component = value.register(&mut self.registry);

        let table = &mut self.archetypes[loc.archetype.index()];
        if let Some(column) = table.column_mut(component) {
            value.write_to(&mut **column, loc.row);
            return Ok(());
        }

        let mut types = table.component_types().to_vec();
        types.push(component);
        types.sort_unstable();
        let target = self.archetype_for(types);
        self.relocate(entity, loc, target);
        if let Some(column) = self.archetypes[target.index()].column_mut(component) {
            value.push_to(&mut **column);
        }
        Ok(())
    }

    /// Overwrite an existing component. Fails with
    /// [`EcsError::MissingComponent`] if the entity lacks it.
    pub fn set<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        *self.get_mut::<T>(entity)? = value;
        Ok(())
    }

    /// Type-erased [`World::set`].
    pub fn set_boxed(
        &mut self,
        entity: EntityId,
        value: Box<dyn ComponentValue>,
    ) -> Result<(), EcsError> {
        let loc = self.locate(entity)?;
        let column = match self.registry.lookup_type(value.component_type()) {
            Some(component) => self.archetypes[loc.archetype.index()].column_mut(component),
            None => None,
        };
        match column {
            Some(column) => {
                value.write_to(&mut **column, loc.row);
                Ok(())
            }
            None => Err(EcsError::MissingComponent {
                entity,
                component: value.type_name().to_owned(),
            }),
        }
    }

    /// Remove `T` and return its value.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Result<T, EcsError> {
        let value = self.get::<T>(entity)?.clone();
        self.remove_type(entity, TypeId::of::<T>(), std::any::type_name::<T>())?;
        Ok(value)
    }

    /// Remove the component with Rust type `ty`, dropping its value.
    pub fn remove_type(
        &mut self,
        entity: EntityId,
        ty: TypeId,
        name: &str,
    ) -> Result<(), EcsError> {
        let loc = self.locate(entity)?;
        let table = &self.archetypes[loc.archetype.index()];
        let component = self
            .registry
            .lookup_type(ty)
            .filter(|c| table.contains(*c))
            .ok_or_else(|| EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            })?;
        let types = table
            .component_types()
            .iter()
            .copied()
            .filter(|c| *c != component)
            .collect();
        let target = self.archetype_for(types);
        self.relocate(entity, loc, target);
        Ok(())
    }

    // -- by-name access -----------------------------------------------------

    /// Names of the components on `entity`, in component-id order.
    pub fn component_names(&self, entity: EntityId) -> Result<Vec<&str>, EcsError> {
        let loc = self.locate(entity)?;
        Ok(self.archetypes[loc.archetype.index()]
            .component_types()
            .iter()
            .map(|c| self.registry.name_of(*c))
            .collect())
    }

    /// Render every component of `entity` as JSON, keyed by component name.
    pub fn entity_to_json(
        &self,
        entity: EntityId,
    ) -> Result<BTreeMap<String, serde_json::Value>, EcsError> {
        let loc = self.locate(entity)?;
        let mut out = BTreeMap::new();
        for (component, column) in self.archetypes[loc.archetype.index()].columns_iter() {
            let name = self.registry.name_of(component);
            let value = column
                .row_to_json(loc.row)
                .map_err(|source| EcsError::ComponentSerialization {
                    name: name.to_owned(),
                    source,
                })?;
            out.insert(name.to_owned(), value);
        }
        Ok(out)
    }

    /// Decode `value` as the component registered under `name` and add it.
    pub fn insert_json(
        &mut self,
        entity: EntityId,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), EcsError> {
        let component = self
            .registry
            .lookup_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_owned(),
            })?;
        let decode = match self.registry.info(component) {
            Some(info) => info.decode,
            None => {
                return Err(EcsError::UnknownComponent {
                    name: name.to_owned(),
                })
            }
        };
        let boxed = decode(value).map_err(|source| EcsError::ComponentDeserialization {
            name: name.to_owned(),
            source,
        })?;
        self.add_boxed(entity, boxed)
    }

    /// Digest of every live entity and its components.
    ///
    /// Entities are hashed in slot order with components sorted by name, so
    /// two worlds built by the same sequence of operations hash equal.
    pub fn state_hash(&self) -> [u8; 32] {
        let mut entities: Vec<EntityId> = self.entities().collect();
        entities.sort_by_key(|e| e.index());

        let mut hasher = blake3::Hasher::new();
        for entity in entities {
            hasher.update(&entity.to_bits().to_le_bytes());
            match self.entity_to_json(entity) {
                Ok(components) => {
                    for (name, value) in components {
                        hasher.update(name.as_bytes());
                        hasher.update(value.to_string().as_bytes());
                    }
                }
                Err(err) => {
                    tracing::warn!(%entity, error = %err, "entity skipped in state hash");
                }
            }
        }
        *hasher.finalize().as_bytes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f64,
        y: f64,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Hp(u32);

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Prefab;

    fn world() -> World {
        let mut world = World::new();
        world.register::<Pos>("pos");
        world.register::<Hp>("hp");
        world.register::<Prefab>("prefab");
        world
    }

    #[test]
    fn spawn_places_entity_in_exact_archetype() {
        let mut w = world();
        let a = w.spawn(ComponentBundle::new().with(Pos { x: 1.0, y: 2.0 }).with(Hp(3)));
        let b = w.spawn(ComponentBundle::new().with(Hp(4)).with(Pos { x: 0.0, y: 0.0 }));
        // Bundle order does not matter.
        assert_eq!(w.archetype_count(), 1);
        assert_eq!(w.get::<Hp>(a).unwrap(), &Hp(3));
        assert_eq!(w.get::<Hp>(b).unwrap(), &Hp(4));
    }

    #[test]
    fn bundle_with_replaces_same_type() {
        let bundle = ComponentBundle::new().with(Hp(1)).with(Hp(2));
        assert_eq!(bundle.len(), 1);
        let mut w = world();
        let e = w.spawn(bundle);
        assert_eq!(w.get::<Hp>(e).unwrap(), &Hp(2));
    }

    #[test]
    fn add_migrates_and_preserves_other_components() {
        let mut w = world();
        let e = w.spawn_one(Pos { x: 1.0, y: 1.0 });
        let other = w.spawn_one(Pos { x: 2.0, y: 2.0 });
        w.add(e, Hp(10)).unwrap();
        assert_eq!(w.get::<Pos>(e).unwrap(), &Pos { x: 1.0, y: 1.0 });
        assert_eq!(w.get::<Hp>(e).unwrap(), &Hp(10));
        // The swapped-in row keeps resolving.
        assert_eq!(w.get::<Pos>(other).unwrap(), &Pos { x: 2.0, y: 2.0 });
    }

    #[test]
    fn add_existing_overwrites_in_place() {
        let mut w = world();
        let e = w.spawn_one(Hp(1));
        let archetypes = w.archetype_count();
        w.add(e, Hp(5)).unwrap();
        assert_eq!(w.archetype_count(), archetypes);
        assert_eq!(w.get::<Hp>(e).unwrap(), &Hp(5));
    }

    #[test]
    fn set_requires_presence() {
        let mut w = world();
        let e = w.spawn_one(Pos { x: 0.0, y: 0.0 });
        let err = w.set(e, Hp(1)).unwrap_err();
        assert!(matches!(err, EcsError::MissingComponent { .. }));
        w.add(e, Hp(1)).unwrap();
        w.set(e, Hp(2)).unwrap();
        assert_eq!(w.get::<Hp>(e).unwrap(), &Hp(2));
    }

    #[test]
    fn remove_returns_value_and_migrates() {
        let mut w = world();
        let e = w.spawn(ComponentBundle::new().with(Pos { x: 3.0, y: 4.0 }).with(Hp(9)));
        assert_eq!(w.remove::<Hp>(e).unwrap(), Hp(9));
        assert!(!w.has::<Hp>(e));
        assert_eq!(w.get::<Pos>(e).unwrap(), &Pos { x: 3.0, y: 4.0 });
        assert!(matches!(
            w.remove::<Hp>(e),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn stale_handle_fails_everywhere() {
        let mut w = world();
        let old = w.spawn_one(Hp(1));
        w.despawn(old).unwrap();
        let new = w.spawn_one(Hp(2));
        assert_eq!(new.index(), old.index());

        assert!(matches!(w.get::<Hp>(old), Err(EcsError::InvalidEntity { .. })));
        assert!(matches!(w.add(old, Hp(3)), Err(EcsError::InvalidEntity { .. })));
        assert!(matches!(w.remove::<Hp>(old), Err(EcsError::InvalidEntity { .. })));
        assert!(matches!(w.despawn(old), Err(EcsError::InvalidEntity { .. })));
        assert_eq!(w.get::<Hp>(new).unwrap(), &Hp(2));
    }

    #[test]
    fn despawn_patches_swapped_row() {
        let mut w = world();
        let a = w.spawn_one(Hp(1));
        let b = w.spawn_one(Hp(2));
        let c = w.spawn_one(Hp(3));
        w.despawn(a).unwrap();
        assert_eq!(w.get::<Hp>(b).unwrap(), &Hp(2));
        assert_eq!(w.get::<Hp>(c).unwrap(), &Hp(3));
        assert_eq!(w.entity_count(), 2);
    }

    #[test]
    fn clone_entity_copies_all_components() {
        let mut w = world();
        let proto = w.spawn(ComponentBundle::new().with(Hp(50)).with(Prefab));
        let copy = w.clone_entity(proto).unwrap();
        w.remove::<Prefab>(copy).unwrap();
        w.set(copy, Hp(49)).unwrap();
        assert_eq!(w.get::<Hp>(proto).unwrap(), &Hp(50));
        assert!(w.has::<Prefab>(proto));
        assert!(!w.has::<Prefab>(copy));
    }

    #[test]
    fn json_round_trip_by_name() {
        let mut w = world();
        let e = w.spawn_one(Pos { x: 1.5, y: -2.0 });
        w.insert_json(e, "hp", serde_json::json!(7)).unwrap();
        let json = w.entity_to_json(e).unwrap();
        assert_eq!(json["hp"], serde_json::json!(7));
        assert_eq!(json["pos"], serde_json::json!({"x": 1.5, "y": -2.0}));
        assert!(matches!(
            w.insert_json(e, "nope", serde_json::json!(1)),
            Err(EcsError::UnknownComponent { .. })
        ));
        assert!(matches!(
            w.insert_json(e, "hp", serde_json::json!("x")),
            Err(EcsError::ComponentDeserialization { .. })
        ));
    }

    #[test]
    fn state_hash_tracks_content() {
        let mut a = world();
        let mut b = world();
        let ea = a.spawn_one(Hp(1));
        let eb = b.spawn_one(Hp(1));
        assert_eq!(a.state_hash(), b.state_hash());
        a.set(ea, Hp(2)).unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
        b.set(eb, Hp(2)).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }
}
