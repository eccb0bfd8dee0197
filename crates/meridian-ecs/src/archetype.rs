//! Archetype tables.
//!
//! An [`Archetype`] holds every entity that has exactly the same set of
//! component types. Storage is column-oriented: one [`Column`] per component
//! type (a `Vec<T>` behind a trait object) plus a parallel `Vec<EntityId>`
//! mapping rows back to entities. Row `i` of every column belongs to
//! `entities[i]`.
//!
//! Rows are removed with swap-remove, so removing a row moves the last row
//! into its place. Callers must patch the moved entity's location.

use std::any::Any;

use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Index of an archetype inside its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// Type-erased component column.
///
/// Implemented for `Vec<T>` for every [`Component`]. All row-moving
/// operations use swap-remove semantics so that columns of one archetype
/// stay aligned when the same row is removed from each of them.
pub trait Column: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn rows(&self) -> usize;

    /// Drop the value at `row` (swap-remove).
    fn discard_row(&mut self, row: usize);

    /// Swap-remove the value at `row` and append it to `dst`, which must be a
    /// column of the same type.
    fn move_row(&mut self, row: usize, dst: &mut dyn Column);

    /// Append a clone of `row` to this column.
    fn duplicate_row(&mut self, row: usize);

    fn row_to_json(&self, row: usize) -> Result<serde_json::Value, serde_json::Error>;

    /// An empty column of the same type.
    fn empty(&self) -> Box<dyn Column>;
}

impl<T: Component> Column for Vec<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn rows(&self) -> usize {
        self.len()
    }

    fn discard_row(&mut self, row: usize) {
        self.swap_remove(row);
    }

    fn move_row(&mut self, row: usize, dst: &mut dyn Column) {
        let value = self.swap_remove(row);
        typed_mut::<T>(dst).push(value);
    }

    fn duplicate_row(&mut self, row: usize) {
        let value = self[row].clone();
        self.push(value);
    }

    fn row_to_json(&self, row: usize) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self[row])
    }

    fn empty(&self) -> Box<dyn Column> {
        Box::new(Vec::<T>::new())
    }
}

/// Downcast a column to its concrete vector.
///
/// # Panics
///
/// Panics if the column does not store `T`. Columns are always created from
/// the registry entry of their component id, so a mismatch means the caller
/// resolved the wrong id.
pub(crate) fn typed<T: Component>(column: &dyn Column) -> &Vec<T> {
    match column.as_any().downcast_ref::<Vec<T>>() {
        Some(values) => values,
        None => panic!("column does not store {}", std::any::type_name::<T>()),
    }
}

/// Mutable counterpart of [`typed`].
pub(crate) fn typed_mut<T: Component>(column: &mut dyn Column) -> &mut Vec<T> {
    match column.as_any_mut().downcast_mut::<Vec<T>>() {
        Some(values) => values,
        None => panic!("column does not store {}", std::any::type_name::<T>()),
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// A table of entities sharing one component set.
pub struct Archetype {
    id: ArchetypeId,
    /// Sorted, deduplicated.
    types: Vec<ComponentTypeId>,
    /// Parallel to `types`.
    columns: Vec<Box<dyn Column>>,
    entities: Vec<EntityId>,
}

impl Archetype {
    /// Build an empty archetype. `columns` must be parallel to `types`.
    pub(crate) fn new(
        id: ArchetypeId,
        types: Vec<ComponentTypeId>,
        columns: Vec<Box<dyn Column>>,
    ) -> Self {
        debug_assert_eq!(types.len(), columns.len());
        debug_assert!(types.windows(2).all(|w| w[0] < w[1]));
        Self {
            id,
            types,
            columns,
            entities: Vec::new(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, component: ComponentTypeId) -> bool {
        self.types.binary_search(&component).is_ok()
    }

    /// Whether the archetype has every type in `all` and none in `none`.
    pub fn matches(&self, all: &[ComponentTypeId], none: &[ComponentTypeId]) -> bool {
        all.iter().all(|c| self.contains(*c)) && !none.iter().any(|c| self.contains(*c))
    }

    fn slot(&self, component: ComponentTypeId) -> Option<usize> {
        self.types.binary_search(&component).ok()
    }

    pub(crate) fn column(&self, component: ComponentTypeId) -> Option<&dyn Column> {
        self.slot(component).map(|i| self.columns[i].as_ref())
    }

    pub(crate) fn column_mut(&mut self, component: ComponentTypeId) -> Option<&mut Box<dyn Column>> {
        let slot = self.slot(component)?;
        Some(&mut self.columns[slot])
    }

    pub(crate) fn get<T: Component>(&self, component: ComponentTypeId, row: usize) -> Option<&T> {
        self.column(component).and_then(|c| typed::<T>(c).get(row))
    }

    pub(crate) fn get_mut<T: Component>(
        &mut self,
        component: ComponentTypeId,
        row: usize,
    ) -> Option<&mut T> {
        let column = self.column_mut(component)?;
        typed_mut::<T>(&mut **column).get_mut(row)
    }

    /// Record that `entity` occupies the next row. The caller pushes exactly
    /// one value into every column.
    pub(crate) fn push_entity(&mut self, entity: EntityId) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Swap-remove `row` from the entity list only. Returns the entity that
    /// was moved into `row`, if any.
    pub(crate) fn swap_remove_entity(&mut self, row: usize) -> Option<EntityId> {
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Drop every component at `row` and remove the row.
    pub(crate) fn discard(&mut self, row: usize) -> Option<EntityId> {
        for column in &mut self.columns {
            column.discard_row(row);
        }
        self.swap_remove_entity(row)
    }

    /// Clone every component at `row` into a new row for `entity`.
    pub(crate) fn duplicate(&mut self, row: usize, entity: EntityId) -> usize {
        for column in &mut self.columns {
            column.duplicate_row(row);
        }
        self.push_entity(entity)
    }

    pub(crate) fn columns_iter(&self) -> impl Iterator<Item = (ComponentTypeId, &dyn Column)> {
        self.types
            .iter()
            .copied()
            .zip(self.columns.iter().map(|c| c.as_ref()))
    }

    pub(crate) fn columns_iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (ComponentTypeId, &mut Box<dyn Column>)> {
        self.types.iter().copied().zip(self.columns.iter_mut())
    }

    /// Borrow the entity list together with disjoint mutable columns, in the
    /// order given by `wanted`. Absent components yield `None`.
    pub(crate) fn split_columns(
        &mut self,
        wanted: &[ComponentTypeId],
    ) -> (&[EntityId], Vec<Option<&mut Box<dyn Column>>>) {
        let mut out: Vec<Option<&mut Box<dyn Column>>> = wanted.iter().map(|_| None).collect();
        for (component, column) in self.types.iter().zip(self.columns.iter_mut()) {
            if let Some(slot) = wanted.iter().position(|w| w == component) {
                out[slot] = Some(column);
            }
        }
        (&self.entities, out)
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("types", &self.types)
            .field("len", &self.entities.len())
            .finish()
    }
}

/// Borrow two distinct archetypes mutably.
///
/// # Panics
///
/// Panics if `a == b`.
pub(crate) fn pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeId,
    b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    assert_ne!(a, b, "cannot borrow the same archetype twice");
    let (a, b) = (a.index(), b.index());
    if a < b {
        let (lo, hi) = archetypes.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = archetypes.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
