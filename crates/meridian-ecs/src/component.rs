//! Component types, type-erased component values, and the runtime registry.
//!
//! Any `Clone + Send + Sync + Serialize + DeserializeOwned + 'static` type is a
//! [`Component`]. Zero-sized unit structs act as tags: they occupy no column
//! memory and exist only to shape archetype membership.
//!
//! Each Rust type maps to exactly one [`ComponentTypeId`]. Registration can be
//! explicit (with a stable name used by JSON snapshots) or lazy, in which case
//! the Rust type name is used.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archetype::Column;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for anything storable in the [`World`](crate::world::World).
pub trait Component: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Component for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Dense id assigned to a component type at registration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentValue
// ---------------------------------------------------------------------------

/// A boxed component value whose concrete type is erased.
///
/// Bundles and command buffers carry these so that heterogeneous component
/// sets can be recorded and moved into archetype columns later.
pub trait ComponentValue: Send + Sync {
    /// `TypeId` of the concrete component.
    fn component_type(&self) -> TypeId;

    /// Rust type name, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Register the concrete type (lazily named) and return its id.
    fn register(&self, registry: &mut ComponentRegistry) -> ComponentTypeId;

    /// Append the value to a column of the same type.
    fn push_to(self: Box<Self>, column: &mut dyn Column);

    /// Overwrite `row` of a column of the same type.
    fn write_to(self: Box<Self>, column: &mut dyn Column, row: usize);

    fn clone_boxed(&self) -> Box<dyn ComponentValue>;
}

impl<T: Component> ComponentValue for T {
    fn component_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn register(&self, registry: &mut ComponentRegistry) -> ComponentTypeId {
        registry.register_lazy::<T>()
    }

    fn push_to(self: Box<Self>, column: &mut dyn Column) {
        crate::archetype::typed_mut::<T>(column).push(*self);
    }

    fn write_to(self: Box<Self>, column: &mut dyn Column, row: usize) {
        crate::archetype::typed_mut::<T>(column)[row] = *self;
    }

    fn clone_boxed(&self) -> Box<dyn ComponentValue> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for dyn ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentValue<{}>", self.type_name())
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

type JsonDecoder = fn(serde_json::Value) -> Result<Box<dyn ComponentValue>, serde_json::Error>;

/// Everything the store needs to know about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: ComponentTypeId,
    /// Stable name used in JSON snapshots and by-name lookups.
    pub name: String,
    pub type_id: TypeId,
    /// `size_of::<T>()`. Zero for tag components.
    pub size: usize,
    pub(crate) new_column: fn() -> Box<dyn Column>,
    pub(crate) decode: JsonDecoder,
}

impl ComponentInfo {
    /// Tags carry no data.
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

fn new_column<T: Component>() -> Box<dyn Column> {
    Box::new(Vec::<T>::new())
}

fn decode<T: Component>(
    value: serde_json::Value,
) -> Result<Box<dyn ComponentValue>, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    Ok(Box::new(typed))
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types and names to [`ComponentTypeId`]s.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`. Re-registering a type returns its existing
    /// id and keeps the first name.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken by a different type.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentTypeId {
        if let Some(&existing) = self.by_type.get(&TypeId::of::<T>()) {
            return existing;
        }
        assert!(
            !self.by_name.contains_key(name),
            "component name '{name}' is already registered for a different type"
        );

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            type_id: TypeId::of::<T>(),
            size: std::mem::size_of::<T>(),
            new_column: new_column::<T>,
            decode: decode::<T>,
        });
        self.by_type.insert(TypeId::of::<T>(), id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Register `T` under its Rust type name unless it is already known.
    pub fn register_lazy<T: Component>(&mut self) -> ComponentTypeId {
        match self.lookup::<T>() {
            Some(id) => id,
            None => self.register::<T>(std::any::type_name::<T>()),
        }
    }

    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.lookup_type(TypeId::of::<T>())
    }

    pub fn lookup_type(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.by_type.get(&type_id).copied()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.0 as usize)
    }

    /// Name of a registered id, or `"?"` for ids from another registry.
    pub fn name_of(&self, id: ComponentTypeId) -> &str {
        self.info(id).map(|i| i.name.as_str()).unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
