//! Typed queries over archetype tables.
//!
//! A query is a tuple of `&T` / `&mut T` items, optionally narrowed by a
//! [`Filter`] with `with`/`without` constraints (typically tag components such
//! as `Dead` or `Prefab`). Iteration yields `(EntityId, (items...))` in
//! archetype-then-row order. That order is only stable while no structural
//! change happens; systems that need to add, remove or destroy while
//! iterating record into a [`CommandBuffer`](crate::command::CommandBuffer).
//!
//! Read-only queries go through [`World::query`] (`&self`). Queries with any
//! `&mut T` item go through [`World::query_mut`] (`&mut self`), which splits
//! each archetype into disjoint column borrows, so no unsafe code is needed.

use std::any::TypeId;

use crate::archetype::{typed, typed_mut, Archetype, Column};
use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// Fetch -- one element of a query tuple
// ---------------------------------------------------------------------------

/// One element of a query tuple: `&T` or `&mut T`.
pub trait Fetch {
    type Item<'w>;
    /// Per-archetype iterator over the column.
    type Column<'w>: Iterator<Item = Self::Item<'w>>;
    const MUTABLE: bool;

    fn component() -> TypeId;

    fn component_name() -> &'static str;

    fn shared(column: &dyn Column) -> Self::Column<'_>;

    fn exclusive(column: &mut Box<dyn Column>) -> Self::Column<'_>;
}

impl<T: Component> Fetch for &T {
    type Item<'w> = &'w T;
    type Column<'w> = std::slice::Iter<'w, T>;
    const MUTABLE: bool = false;

    fn component() -> TypeId {
        TypeId::of::<T>()
    }

    fn component_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn shared(column: &dyn Column) -> Self::Column<'_> {
        typed::<T>(column).iter()
    }

    fn exclusive(column: &mut Box<dyn Column>) -> Self::Column<'_> {
        typed::<T>(&**column).iter()
    }
}

impl<T: Component> Fetch for &mut T {
    type Item<'w> = &'w mut T;
    type Column<'w> = std::slice::IterMut<'w, T>;
    const MUTABLE: bool = true;

    fn component() -> TypeId {
        TypeId::of::<T>()
    }

    fn component_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn shared(_column: &dyn Column) -> Self::Column<'_> {
        panic!(
            "&mut {} requires World::query_mut",
            std::any::type_name::<T>()
        )
    }

    fn exclusive(column: &mut Box<dyn Column>) -> Self::Column<'_> {
        typed_mut::<T>(&mut **column).iter_mut()
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of Fetch items
// ---------------------------------------------------------------------------

/// Description of one query element, used for archetype matching.
#[derive(Debug, Clone, Copy)]
pub struct Access {
    pub component: TypeId,
    pub name: &'static str,
    pub mutable: bool,
}

/// A tuple of [`Fetch`] items, implemented for arities 1 through 6.
pub trait Query {
    type Item<'w>;
    type Iter<'w>: Iterator<Item = Self::Item<'w>>;

    fn accesses() -> Vec<Access>;

    /// Whether any element borrows mutably.
    fn is_mutable() -> bool {
        Self::accesses().iter().any(|a| a.mutable)
    }

    /// Build the row iterator for one archetype from columns given in
    /// element order.
    fn fetch_shared(columns: Vec<&dyn Column>) -> Self::Iter<'_>;

    fn fetch_exclusive(columns: Vec<&mut Box<dyn Column>>) -> Self::Iter<'_>;
}

fn next_column<C>(columns: &mut impl Iterator<Item = C>) -> C {
    match columns.next() {
        Some(column) => column,
        None => panic!("matched archetype is missing a queried column"),
    }
}

macro_rules! impl_query {
    ($rows:ident; $($p:ident),+) => {
        /// Lock-step iterator over the columns of one archetype.
        #[doc(hidden)]
        #[allow(non_snake_case)]
        pub struct $rows<$($p),+> {
            $($p: $p),+
        }

        #[allow(non_snake_case)]
        impl<$($p: Iterator),+> Iterator for $rows<$($p),+> {
            type Item = ($($p::Item,)+);

            #[inline]
            fn next(&mut self) -> Option<Self::Item> {
                Some(($(self.$p.next()?,)+))
            }
        }

        impl<$($p: Fetch),+> Query for ($($p,)+) {
            type Item<'w> = ($($p::Item<'w>,)+);
            type Iter<'w> = $rows<$($p::Column<'w>),+>;

            fn accesses() -> Vec<Access> {
                vec![$(Access {
                    component: $p::component(),
                    name: $p::component_name(),
                    mutable: $p::MUTABLE,
                }),+]
            }

            fn fetch_shared(columns: Vec<&dyn Column>) -> Self::Iter<'_> {
                let mut columns = columns.into_iter();
                $rows { $($p: $p::shared(next_column(&mut columns))),+ }
            }

            fn fetch_exclusive(columns: Vec<&mut Box<dyn Column>>) -> Self::Iter<'_> {
                let mut columns = columns.into_iter();
                $rows { $($p: $p::exclusive(next_column(&mut columns))),+ }
            }
        }
    };
}

impl_query!(Rows1; A);
impl_query!(Rows2; A, B);
impl_query!(Rows3; A, B, C);
impl_query!(Rows4; A, B, C, D);
impl_query!(Rows5; A, B, C, D, E);
impl_query!(Rows6; A, B, C, D, E, F);

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Extra archetype constraints that do not fetch data.
///
/// ```
/// # use meridian_ecs::prelude::*;
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct Dead;
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct Prefab;
/// let filter = Filter::new().without::<Dead>().without::<Prefab>();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    all: Vec<TypeId>,
    none: Vec<TypeId>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `T` without fetching it.
    pub fn with<T: 'static>(mut self) -> Self {
        self.all.push(TypeId::of::<T>());
        self
    }

    /// Exclude archetypes containing `T`.
    pub fn without<T: 'static>(mut self) -> Self {
        self.none.push(TypeId::of::<T>());
        self
    }
}

/// Resolved component ids for one query + filter pair. `None` when a required
/// type was never registered, in which case nothing can match.
struct Plan {
    fetch: Vec<ComponentTypeId>,
    all: Vec<ComponentTypeId>,
    none: Vec<ComponentTypeId>,
}

impl Plan {
    fn resolve(world: &World, accesses: &[Access], filter: &Filter) -> Option<Plan> {
        let registry = world.registry();
        let fetch = accesses
            .iter()
            .map(|a| registry.lookup_type(a.component))
            .collect::<Option<Vec<_>>>()?;
        let required = filter
            .all
            .iter()
            .map(|t| registry.lookup_type(*t))
            .collect::<Option<Vec<_>>>()?;
        let none = filter
            .none
            .iter()
            .filter_map(|t| registry.lookup_type(*t))
            .collect();
        let mut all = fetch.clone();
        all.extend(required);
        Some(Plan { fetch, all, none })
    }

    fn admits(&self, archetype: &Archetype) -> bool {
        !archetype.is_empty() && archetype.matches(&self.all, &self.none)
    }
}

/// Reject `&mut T` alongside any other access to `T`.
fn validate_exclusive(accesses: &[Access]) {
    for (i, a) in accesses.iter().enumerate() {
        for b in &accesses[i + 1..] {
            if a.component == b.component && (a.mutable || b.mutable) {
                panic!(
                    "query aliases component {} with a mutable borrow",
                    a.name
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Iterators
// ---------------------------------------------------------------------------

/// Iterator returned by [`World::query`].
pub struct QueryIter<'w, Q: Query> {
    archetypes: std::vec::IntoIter<&'w Archetype>,
    fetch: Vec<ComponentTypeId>,
    current: Option<(std::slice::Iter<'w, EntityId>, Q::Iter<'w>)>,
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entities, rows)) = &mut self.current {
                if let (Some(entity), Some(row)) = (entities.next(), rows.next()) {
                    return Some((*entity, row));
                }
            }
            let archetype = self.archetypes.next()?;
            let columns = self
                .fetch
                .iter()
                .filter_map(move |c| archetype.column(*c))
                .collect();
            self.current = Some((archetype.entities().iter(), Q::fetch_shared(columns)));
        }
    }
}

/// Iterator returned by [`World::query_mut`].
pub struct QueryIterMut<'w, Q: Query> {
    archetypes: std::vec::IntoIter<&'w mut Archetype>,
    fetch: Vec<ComponentTypeId>,
    current: Option<(std::slice::Iter<'w, EntityId>, Q::Iter<'w>)>,
}

impl<'w, Q: Query> Iterator for QueryIterMut<'w, Q> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entities, rows)) = &mut self.current {
                if let (Some(entity), Some(row)) = (entities.next(), rows.next()) {
                    return Some((*entity, row));
                }
            }
            let archetype = self.archetypes.next()?;
            let (entities, columns) = archetype.split_columns(&self.fetch);
            let columns = columns.into_iter().flatten().collect();
            self.current = Some((entities.iter(), Q::fetch_exclusive(columns)));
        }
    }
}

// ---------------------------------------------------------------------------
// World entry points
// ---------------------------------------------------------------------------

impl World {
    /// Iterate entities having every component in `Q`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains a `&mut T` item; use [`World::query_mut`].
    pub fn query<Q: Query>(&self) -> QueryIter<'_, Q> {
        self.query_filtered::<Q>(&Filter::new())
    }

    /// [`World::query`] narrowed by `filter`.
    pub fn query_filtered<Q: Query>(&self, filter: &Filter) -> QueryIter<'_, Q> {
        let accesses = Q::accesses();
        assert!(
            !accesses.iter().any(|a| a.mutable),
            "World::query cannot fetch mutable items; use query_mut"
        );
        let (archetypes, fetch) = match Plan::resolve(self, &accesses, filter) {
            Some(plan) => (
                self.archetypes.iter().filter(|a| plan.admits(a)).collect(),
                plan.fetch,
            ),
            None => (Vec::new(), Vec::new()),
        };
        QueryIter {
            archetypes: archetypes.into_iter(),
            fetch,
            current: None,
        }
    }

    /// Iterate entities having every component in `Q`, with mutable access.
    ///
    /// # Panics
    ///
    /// Panics if a component is borrowed mutably more than once, or both
    /// mutably and immutably.
    pub fn query_mut<Q: Query>(&mut self) -> QueryIterMut<'_, Q> {
        self.query_mut_filtered::<Q>(&Filter::new())
    }

    /// [`World::query_mut`] narrowed by `filter`.
    pub fn query_mut_filtered<Q: Query>(&mut self, filter: &Filter) -> QueryIterMut<'_, Q> {
        let accesses = Q::accesses();
        validate_exclusive(&accesses);
        let plan = Plan::resolve(self, &accesses, filter);
        let (archetypes, fetch) = match plan {
            Some(plan) => (
                self.archetypes
                    .iter_mut()
                    .filter(|a| plan.admits(a))
                    .collect(),
                plan.fetch,
            ),
            None => (Vec::new(), Vec::new()),
        };
        QueryIterMut {
            archetypes: archetypes.into_iter(),
            fetch,
            current: None,
        }
    }

    /// Entities matching `Q` and `filter`, collected so that the caller can
    /// mutate the world while walking them.
    pub fn matching<Q: Query>(&self, filter: &Filter) -> Vec<EntityId> {
        let accesses = Q::accesses();
        match Plan::resolve(self, &accesses, filter) {
            Some(plan) => self
                .archetypes
                .iter()
                .filter(|a| plan.admits(a))
                .flat_map(|a| a.entities().iter().copied())
                .collect(),
            None => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
