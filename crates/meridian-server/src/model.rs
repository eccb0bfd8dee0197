//! Persistence records kept alongside live entities.
//!
//! Every persisted entity has one [`Record`] that is refreshed from its
//! components and flushed on the save interval. Entities destroyed by
//! gameplay turn into deletions; entities destroyed because their chunk
//! unloaded keep their last record so the chunk can be materialised again.

use std::collections::{BTreeMap, BTreeSet};

use meridian_ecs::prelude::*;

use crate::boundary::persistence::{
    ChunkRecord, CharacterRecord, ItemRecord, PlacedRecord, Record, RecordKey, SaveBatch,
};
use crate::components::{Biome, Character, Chunk, Health, Identity, InInventory, Item, Transform};

/// Identity tags that are persisted.
pub const PERSISTED_TAGS: [&str; 6] = ["chunk", "character", "resource", "structure", "mob", "item"];

#[derive(Debug, Default)]
pub struct Models {
    records: BTreeMap<EntityId, Record>,
    /// One-shot upserts: evicted entities and accounts.
    pending: Vec<Record>,
    deletions: BTreeSet<RecordKey>,
}

impl Models {
    pub fn is_tracked(&self, entity: EntityId) -> bool {
        self.records.contains_key(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&Record> {
        self.records.get(&entity)
    }

    pub fn track(&mut self, entity: EntityId, record: Record) {
        self.deletions.remove(&record.key());
        self.records.insert(entity, record);
    }

    /// Queue a record that has no live entity behind it.
    pub fn push(&mut self, record: Record) {
        self.deletions.remove(&record.key());
        self.pending.push(record);
    }

    /// Re-derive every tracked record from the world.
    pub fn refresh(&mut self, world: &World) {
        for (entity, record) in self.records.iter_mut() {
            if let Some(fresh) = record_of(world, *entity) {
                *record = fresh;
            }
        }
    }

    /// Stop tracking `entity` but save its latest state once more.
    pub fn evict(&mut self, world: &World, entity: EntityId) {
        if let Some(old) = self.records.remove(&entity) {
            self.pending.push(record_of(world, entity).unwrap_or(old));
        }
    }

    /// Stop tracking `entity` and delete its stored record.
    pub fn delete(&mut self, entity: EntityId) {
        if let Some(old) = self.records.remove(&entity) {
            self.deletions.insert(old.key());
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Everything to write now. One-shot upserts and deletions are drained.
    pub fn batch(&mut self) -> SaveBatch {
        let mut upserts: Vec<Record> = self.records.values().cloned().collect();
        upserts.append(&mut self.pending);
        SaveBatch {
            upserts,
            deletions: std::mem::take(&mut self.deletions).into_iter().collect(),
        }
    }
}

fn pos_of(world: &World, entity: EntityId) -> Option<(Transform, [f64; 2])> {
    let t = world.get::<Transform>(entity).ok()?.clone();
    let pos = [t.pos.x, t.pos.y];
    Some((t, pos))
}

/// Build the record for `entity` from its components, if it is persisted
/// and complete enough to be saved.
pub fn record_of(world: &World, entity: EntityId) -> Option<Record> {
    let identity = world.get::<Identity>(entity).ok()?;
    if identity.id == 0 && identity.tag != "chunk" {
        return None;
    }
    let health = world.get::<Health>(entity).ok().map(|h| h.current);
    match identity.tag.as_str() {
        "chunk" => {
            let chunk = world.get::<Chunk>(entity).ok()?;
            Some(Record::Chunk(ChunkRecord {
                grid: chunk.grid,
                created_at: chunk.created_at,
                biome: world.get::<Biome>(entity).ok().map(|b| b.kind.clone()),
            }))
        }
        "character" => {
            let character = world.get::<Character>(entity).ok()?;
            let (_, position) = pos_of(world, entity)?;
            Some(Record::Character(CharacterRecord {
                id: identity.id,
                name: character.name.clone(),
                kind: identity.kind.clone(),
                position,
                health: health.unwrap_or(0.0),
                admin: character.admin,
            }))
        }
        tag @ ("resource" | "structure" | "mob") => {
            let (transform, position) = pos_of(world, entity)?;
            let placed = PlacedRecord {
                id: identity.id,
                kind: identity.kind.clone(),
                position,
                health,
                chunk: transform.chunk?,
            };
            Some(match tag {
                "resource" => Record::Resource(placed),
                "structure" => Record::Structure(placed),
                _ => Record::Mob(placed),
            })
        }
        "item" => {
            let item = world.get::<Item>(entity).ok()?;
            let owner = world.get::<InInventory>(entity).ok()?.owner;
            let owner_id = world
                .get::<Identity>(owner.entity)
                .map(|i| i.id)
                .unwrap_or(owner.id);
            Some(Record::Item(ItemRecord {
                id: identity.id,
                kind: identity.kind.clone(),
                amount: item.amount,
                owner: owner_id,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_all;
    use crate::spatial::grid::Grid;
    use glam::DVec2;

    fn setup_world() -> World {
        let mut world = World::new();
        register_all(&mut world);
        world
    }

    fn tree(world: &mut World, id: u64, chunk: Option<Grid>) -> EntityId {
        let mut identity = Identity::new("resource", "resource:tree");
        identity.id = id;
        let mut transform = Transform::at(DVec2::new(1.0, 2.0));
        transform.chunk = chunk;
        world.spawn(
            ComponentBundle::new()
                .with(identity)
                .with(transform)
                .with(Health::full(40.0)),
        )
    }

    #[test]
    fn resources_need_a_chunk_to_be_saved() {
        let mut world = setup_world();
        let unfiled = tree(&mut world, 5, None);
        let filed = tree(&mut world, 6, Some(Grid::new(1, 1)));
        assert!(record_of(&world, unfiled).is_none());
        match record_of(&world, filed) {
            Some(Record::Resource(r)) => {
                assert_eq!(r.id, 6);
                assert_eq!(r.health, Some(40.0));
                assert_eq!(r.chunk, Grid::new(1, 1));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn uninitialised_entities_are_not_saved() {
        let mut world = setup_world();
        let e = tree(&mut world, 0, Some(Grid::new(1, 1)));
        assert!(record_of(&world, e).is_none());
    }

    #[test]
    fn delete_and_evict_end_up_in_the_batch() {
        let mut world = setup_world();
        let chopped = tree(&mut world, 1, Some(Grid::new(1, 1)));
        let unloaded = tree(&mut world, 2, Some(Grid::new(1, 1)));
        let mut models = Models::default();
        for e in [chopped, unloaded] {
            let record = record_of(&world, e).unwrap();
            models.track(e, record);
        }

        models.delete(chopped);
        models.evict(&world, unloaded);
        let batch = models.batch();
        assert_eq!(batch.deletions, vec![RecordKey::Resource(1)]);
        assert_eq!(batch.upserts.len(), 1);
        assert_eq!(batch.upserts[0].key(), RecordKey::Resource(2));

        let next = models.batch();
        assert!(next.is_empty());
    }

    #[test]
    fn refresh_picks_up_component_changes() {
        let mut world = setup_world();
        let e = tree(&mut world, 3, Some(Grid::new(1, 1)));
        let mut models = Models::default();
        models.track(e, record_of(&world, e).unwrap());
        world.get_mut::<Health>(e).unwrap().current = 10.0;
        models.refresh(&world);
        match models.get(e) {
            Some(Record::Resource(r)) => assert_eq!(r.health, Some(10.0)),
            other => panic!("unexpected record {other:?}"),
        }
    }
}
