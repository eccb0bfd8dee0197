//! Chunk lookup table and loader bookkeeping.
//!
//! A chunk is an entity; [`ChunkMap`] maps grids to those entities. Loaders
//! that enter a grid with no chunk yet are parked as *pending* until the
//! persistence lookup for that grid has been answered and the chunk created.

use std::collections::{BTreeMap, BTreeSet};

use meridian_ecs::prelude::*;
use tracing::{debug, warn};

use crate::components::{Chunk, Destroy, Identity, Transform, Unloaded};
use crate::spatial::grid::Grid;

#[derive(Debug, Default)]
pub struct ChunkMap {
    by_grid: BTreeMap<Grid, EntityId>,
    /// Loaders waiting for a chunk that does not exist yet.
    pending: BTreeMap<Grid, BTreeSet<EntityId>>,
    /// Grids whose existence has not been asked of persistence yet.
    requested: BTreeSet<Grid>,
}

impl ChunkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, grid: Grid) -> Option<EntityId> {
        self.by_grid.get(&grid).copied()
    }

    /// The live chunk at `grid`, if any.
    pub fn live(&self, world: &World, grid: Grid) -> Option<EntityId> {
        self.get(grid).filter(|e| world.is_alive(*e))
    }

    pub fn insert(&mut self, grid: Grid, chunk: EntityId) -> Option<EntityId> {
        self.by_grid.insert(grid, chunk)
    }

    /// Remove `grid` only if it still maps to `chunk`.
    pub fn remove(&mut self, grid: Grid, chunk: EntityId) -> bool {
        match self.by_grid.get(&grid) {
            Some(current) if *current == chunk => {
                self.by_grid.remove(&grid);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_grid.is_empty()
    }

    pub fn grids(&self) -> impl Iterator<Item = Grid> + '_ {
        self.by_grid.keys().copied()
    }

    /// Park `loader` on `grid`. The first loader for a grid schedules a
    /// persistence lookup.
    pub fn request(&mut self, grid: Grid, loader: EntityId) {
        if !self.pending.contains_key(&grid) {
            self.requested.insert(grid);
        }
        self.pending.entry(grid).or_default().insert(loader);
    }

    /// Un-park `loader`. The lookup itself stays scheduled.
    pub fn cancel(&mut self, grid: Grid, loader: EntityId) {
        if let Some(waiting) = self.pending.get_mut(&grid) {
            waiting.remove(&loader);
        }
    }

    pub fn is_pending(&self, grid: Grid) -> bool {
        self.pending.contains_key(&grid)
    }

    /// Grids to ask persistence about. Empties the request set.
    pub fn take_requests(&mut self) -> BTreeSet<Grid> {
        std::mem::take(&mut self.requested)
    }

    /// Put grids back after a failed lookup.
    pub fn retry(&mut self, grids: impl IntoIterator<Item = Grid>) {
        self.requested.extend(grids);
    }

    /// Loaders parked on `grid`, removing the entry.
    pub fn take_pending(&mut self, grid: Grid) -> BTreeSet<EntityId> {
        self.pending.remove(&grid).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Loader and containment helpers
// ---------------------------------------------------------------------------

/// Register `loader` with every chunk around `grid`, parking it on grids that
/// have no chunk yet.
pub fn enter_chunks(
    world: &mut World,
    chunks: &mut ChunkMap,
    loader: EntityId,
    grid: Grid,
    zoom: u8,
) {
    for g in grid.surrounding(1, zoom) {
        match chunks.live(world, g) {
            Some(chunk) => {
                if let Ok(c) = world.get_mut::<Chunk>(chunk) {
                    c.loaded_by.insert(loader);
                    c.decay = None;
                }
            }
            None => chunks.request(g, loader),
        }
    }
    debug!(%loader, ?grid, "loader entered chunks");
}

/// Unregister `loader` from every chunk around `grid`.
pub fn leave_chunks(
    world: &mut World,
    chunks: &mut ChunkMap,
    loader: EntityId,
    grid: Grid,
    zoom: u8,
) {
    for g in grid.surrounding(1, zoom) {
        match chunks.live(world, g) {
            Some(chunk) => {
                if let Ok(c) = world.get_mut::<Chunk>(chunk) {
                    c.loaded_by.remove(&loader);
                }
            }
            None => chunks.cancel(g, loader),
        }
    }
    debug!(%loader, ?grid, "loader left chunks");
}

/// Move `entity` from the chunk at `left` to the chunk at `entered`.
///
/// Returns the grid the entity is now filed under, which is `None` when no
/// chunk exists at `entered` yet.
pub fn switch_chunks(
    world: &mut World,
    chunks: &ChunkMap,
    entity: EntityId,
    left: Option<Grid>,
    entered: Grid,
) -> Option<Grid> {
    if let Some(chunk) = left.and_then(|g| chunks.live(world, g)) {
        if let Ok(c) = world.get_mut::<Chunk>(chunk) {
            c.contains.remove(&entity);
        }
    }
    let chunk = chunks.live(world, entered)?;
    match world.get_mut::<Chunk>(chunk) {
        Ok(c) => {
            c.contains.insert(entity);
            Some(entered)
        }
        Err(err) => {
            warn!(%chunk, error = %err, "chunk entity without chunk data");
            None
        }
    }
}

/// Remove `entity` from whatever chunk its transform points at.
pub fn leave_chunk(world: &mut World, chunks: &ChunkMap, entity: EntityId) {
    let Some(grid) = world.get::<Transform>(entity).ok().and_then(|t| t.chunk) else {
        return;
    };
    if let Some(chunk) = chunks.live(world, grid) {
        if let Ok(c) = world.get_mut::<Chunk>(chunk) {
            c.contains.remove(&entity);
        }
    }
    if let Ok(t) = world.get_mut::<Transform>(entity) {
        t.chunk = None;
    }
}

/// Record `Destroy` for every non-character entity inside `chunk`.
///
/// Characters stay; they are only ever parked on logout. They are unfiled
/// right away so a chunk later created on the same grid takes them in.
pub fn cascade_destroy(world: &mut World, chunk: EntityId, buffer: &mut CommandBuffer) -> usize {
    let contained: Vec<EntityId> = match world.get::<Chunk>(chunk) {
        Ok(c) => c.contains.iter().copied().collect(),
        Err(_) => return 0,
    };
    let mut marked = 0;
    for entity in contained {
        if !world.is_alive(entity) || world.has::<Destroy>(entity) {
            continue;
        }
        let is_character = world
            .get::<Identity>(entity)
            .map(|i| i.is("character"))
            .unwrap_or(false);
        if is_character {
            if let Ok(t) = world.get_mut::<Transform>(entity) {
                t.chunk = None;
            }
            continue;
        }
        buffer.add(entity, Destroy);
        buffer.add(entity, Unloaded);
        marked += 1;
    }
    marked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_all;

    const ZOOM: u8 = 13;

    fn setup_world() -> World {
        let mut world = World::new();
        register_all(&mut world);
        world
    }

    fn spawn_chunk(world: &mut World, chunks: &mut ChunkMap, grid: Grid) -> EntityId {
        let e = world.spawn(
            ComponentBundle::new()
                .with(Identity::new("chunk", "chunk:default"))
                .with(Chunk::new(grid, 0.0)),
        );
        chunks.insert(grid, e);
        e
    }

    #[test]
    fn enter_parks_loader_on_missing_chunks() {
        let mut world = setup_world();
        let mut chunks = ChunkMap::new();
        let loader = world.spawn_one(Identity::new("character", "character:player"));
        let centre = Grid::new(10, 20);
        let existing = spawn_chunk(&mut world, &mut chunks, centre);

        enter_chunks(&mut world, &mut chunks, loader, centre, ZOOM);

        assert!(world.get::<Chunk>(existing).unwrap().loaded_by.contains(&loader));
        let requests = chunks.take_requests();
        assert_eq!(requests.len(), 8);
        assert!(!requests.contains(&centre));
        assert!(chunks.take_requests().is_empty());
        for g in requests {
            assert_eq!(chunks.take_pending(g), BTreeSet::from([loader]));
        }
    }

    #[test]
    fn second_loader_does_not_request_again() {
        let mut world = setup_world();
        let mut chunks = ChunkMap::new();
        let a = world.spawn_one(Identity::new("character", "character:player"));
        let b = world.spawn_one(Identity::new("character", "character:player"));
        let grid = Grid::new(5, 5);

        enter_chunks(&mut world, &mut chunks, a, grid, ZOOM);
        assert_eq!(chunks.take_requests().len(), 9);
        enter_chunks(&mut world, &mut chunks, b, grid, ZOOM);
        assert!(chunks.take_requests().is_empty());
        assert_eq!(chunks.take_pending(grid).len(), 2);
    }

    #[test]
    fn leave_unregisters_and_cancels() {
        let mut world = setup_world();
        let mut chunks = ChunkMap::new();
        let loader = world.spawn_one(Identity::new("character", "character:player"));
        let grid = Grid::new(3, 3);
        let chunk = spawn_chunk(&mut world, &mut chunks, grid);

        enter_chunks(&mut world, &mut chunks, loader, grid, ZOOM);
        leave_chunks(&mut world, &mut chunks, loader, grid, ZOOM);

        assert!(world.get::<Chunk>(chunk).unwrap().loaded_by.is_empty());
        assert!(chunks.take_pending(Grid::new(2, 2)).is_empty());
    }

    #[test]
    fn switch_moves_between_contains_sets() {
        let mut world = setup_world();
        let mut chunks = ChunkMap::new();
        let a = spawn_chunk(&mut world, &mut chunks, Grid::new(1, 1));
        let b = spawn_chunk(&mut world, &mut chunks, Grid::new(1, 2));
        let tree = world.spawn_one(Identity::new("resource", "resource:tree"));

        assert_eq!(
            switch_chunks(&mut world, &chunks, tree, None, Grid::new(1, 1)),
            Some(Grid::new(1, 1))
        );
        switch_chunks(&mut world, &chunks, tree, Some(Grid::new(1, 1)), Grid::new(1, 2));
        assert!(!world.get::<Chunk>(a).unwrap().contains.contains(&tree));
        assert!(world.get::<Chunk>(b).unwrap().contains.contains(&tree));

        assert_eq!(
            switch_chunks(&mut world, &chunks, tree, Some(Grid::new(1, 2)), Grid::new(9, 9)),
            None
        );
        assert!(!world.get::<Chunk>(b).unwrap().contains.contains(&tree));
    }

    #[test]
    fn cascade_spares_characters() {
        let mut world = setup_world();
        let mut chunks = ChunkMap::new();
        let grid = Grid::new(4, 4);
        let chunk = spawn_chunk(&mut world, &mut chunks, grid);
        let placed = |world: &mut World, tag: &str, kind: &str| {
            world.spawn(
                ComponentBundle::new()
                    .with(Identity::new(tag, kind))
                    .with(Transform::at(grid.tile(ZOOM).middle())),
            )
        };
        let tree = placed(&mut world, "resource", "resource:tree");
        let player = placed(&mut world, "character", "character:player");
        for e in [tree, player] {
            let filed = switch_chunks(&mut world, &chunks, e, None, grid);
            world.get_mut::<Transform>(e).unwrap().chunk = filed;
        }

        let mut buffer = CommandBuffer::new();
        assert_eq!(cascade_destroy(&mut world, chunk, &mut buffer), 1);
        assert!(!world.has::<Destroy>(tree));
        assert_eq!(world.get::<Transform>(player).unwrap().chunk, None);

        buffer.playback(&mut world);
        assert!(world.has::<Destroy>(tree));
        assert!(world.has::<Unloaded>(tree));
        assert!(!world.has::<Destroy>(player));
    }
}
