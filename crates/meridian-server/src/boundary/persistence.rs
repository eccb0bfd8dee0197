//! Persistence boundary.
//!
//! The core talks to storage only through plain records and the
//! [`Persistence`] trait. [`MemoryStore`] keeps everything in process and is
//! what the binary and the tests run against.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::spatial::grid::Grid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub grid: Grid,
    pub created_at: f64,
    pub biome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: u64,
    pub name: String,
    pub kind: String,
    pub position: [f64; 2],
    pub health: f32,
    pub admin: bool,
}

/// Resources, structures and mobs share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedRecord {
    pub id: u64,
    pub kind: String,
    pub position: [f64; 2],
    pub health: Option<f32>,
    pub chunk: Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: u64,
    pub kind: String,
    pub amount: u32,
    /// Logical id of the owning character.
    pub owner: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub character: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    Chunk(ChunkRecord),
    Character(CharacterRecord),
    Resource(PlacedRecord),
    Structure(PlacedRecord),
    Mob(PlacedRecord),
    Item(ItemRecord),
    Account(AccountRecord),
}

/// Primary key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    Chunk(Grid),
    Character(u64),
    Resource(u64),
    Structure(u64),
    Mob(u64),
    Item(u64),
    Account(String),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Chunk(r) => RecordKey::Chunk(r.grid),
            Record::Character(r) => RecordKey::Character(r.id),
            Record::Resource(r) => RecordKey::Resource(r.id),
            Record::Structure(r) => RecordKey::Structure(r.id),
            Record::Mob(r) => RecordKey::Mob(r.id),
            Record::Item(r) => RecordKey::Item(r.id),
            Record::Account(r) => RecordKey::Account(r.name.clone()),
        }
    }
}

/// A chunk and everything that was saved inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedChunk {
    pub chunk: ChunkRecord,
    pub resources: Vec<PlacedRecord>,
    pub structures: Vec<PlacedRecord>,
    pub mobs: Vec<PlacedRecord>,
}

/// Everything a character brings back on login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCharacter {
    pub character: CharacterRecord,
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveBatch {
    pub upserts: Vec<Record>,
    pub deletions: Vec<RecordKey>,
}

impl SaveBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }
}

/// Storage collaborator.
pub trait Persistence {
    /// The subset of `grids` that has a saved chunk.
    fn chunk_exists(&mut self, grids: &BTreeSet<Grid>) -> Result<BTreeSet<Grid>, ServerError>;

    fn load_chunks(&mut self, grids: &BTreeSet<Grid>) -> Result<Vec<LoadedChunk>, ServerError>;

    fn load_character(&mut self, name: &str) -> Result<Option<LoadedCharacter>, ServerError>;

    fn save(&mut self, batch: &SaveBatch) -> Result<(), ServerError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreInner {
    records: BTreeMap<RecordKey, Record>,
    saves: usize,
    fail_saves: bool,
    fail_lookups: bool,
}

/// In-process store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.inner.borrow_mut().fail_saves = fail;
    }

    /// Make every following chunk lookup fail.
    pub fn fail_lookups(&self, fail: bool) {
        self.inner.borrow_mut().fail_lookups = fail;
    }

    pub fn insert(&self, record: Record) {
        self.inner.borrow_mut().records.insert(record.key(), record);
    }

    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        self.inner.borrow().records.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.borrow().saves
    }

    fn check_lookups(&self) -> Result<(), ServerError> {
        if self.inner.borrow().fail_lookups {
            return Err(ServerError::PersistenceFailure {
                reason: "chunk lookup unavailable".into(),
            });
        }
        Ok(())
    }
}

impl Persistence for MemoryStore {
    fn chunk_exists(&mut self, grids: &BTreeSet<Grid>) -> Result<BTreeSet<Grid>, ServerError> {
        self.check_lookups()?;
        let inner = self.inner.borrow();
        Ok(grids
            .iter()
            .copied()
            .filter(|g| inner.records.contains_key(&RecordKey::Chunk(*g)))
            .collect())
    }

    fn load_chunks(&mut self, grids: &BTreeSet<Grid>) -> Result<Vec<LoadedChunk>, ServerError> {
        self.check_lookups()?;
        let inner = self.inner.borrow();
        let mut loaded: BTreeMap<Grid, LoadedChunk> = BTreeMap::new();
        for grid in grids {
            if let Some(Record::Chunk(chunk)) = inner.records.get(&RecordKey::Chunk(*grid)) {
                loaded.insert(
                    *grid,
                    LoadedChunk {
                        chunk: chunk.clone(),
                        resources: Vec::new(),
                        structures: Vec::new(),
                        mobs: Vec::new(),
                    },
                );
            }
        }
        for record in inner.records.values() {
            let placed = match record {
                Record::Resource(r) | Record::Structure(r) | Record::Mob(r) => r,
                _ => continue,
            };
            let Some(chunk) = loaded.get_mut(&placed.chunk) else {
                continue;
            };
            match record {
                Record::Resource(r) => chunk.resources.push(r.clone()),
                Record::Structure(r) => chunk.structures.push(r.clone()),
                Record::Mob(r) => chunk.mobs.push(r.clone()),
                _ => {}
            }
        }
        Ok(loaded.into_values().collect())
    }

    fn load_character(&mut self, name: &str) -> Result<Option<LoadedCharacter>, ServerError> {
        let inner = self.inner.borrow();
        let Some(Record::Account(account)) = inner.records.get(&RecordKey::Account(name.to_owned()))
        else {
            return Ok(None);
        };
        let Some(Record::Character(character)) =
            inner.records.get(&RecordKey::Character(account.character))
        else {
            return Ok(None);
        };
        let items = inner
            .records
            .values()
            .filter_map(|r| match r {
                Record::Item(item) if item.owner == character.id => Some(item.clone()),
                _ => None,
            })
            .collect();
        Ok(Some(LoadedCharacter {
            character: character.clone(),
            items,
        }))
    }

    fn save(&mut self, batch: &SaveBatch) -> Result<(), ServerError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_saves {
            return Err(ServerError::PersistenceFailure {
                reason: format!(
                    "store rejected batch of {} upserts and {} deletions",
                    batch.upserts.len(),
                    batch.deletions.len()
                ),
            });
        }
        for key in &batch.deletions {
            inner.records.remove(key);
        }
        for record in &batch.upserts {
            inner.records.insert(record.key(), record.clone());
        }
        inner.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(id: u64, kind: &str, chunk: Grid) -> PlacedRecord {
        PlacedRecord {
            id,
            kind: kind.into(),
            position: [0.0, 0.0],
            health: None,
            chunk,
        }
    }

    #[test]
    fn load_groups_contents_by_chunk() {
        let mut store = MemoryStore::new();
        let a = Grid::new(1, 1);
        let b = Grid::new(1, 2);
        store.insert(Record::Chunk(ChunkRecord {
            grid: a,
            created_at: 0.0,
            biome: Some("biome:forest".into()),
        }));
        store.insert(Record::Resource(placed(1, "resource:tree", a)));
        store.insert(Record::Mob(placed(2, "mob:wolf", a)));
        store.insert(Record::Resource(placed(3, "resource:tree", b)));

        let grids = BTreeSet::from([a, b]);
        assert_eq!(store.chunk_exists(&grids).unwrap(), BTreeSet::from([a]));
        let loaded = store.load_chunks(&grids).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].resources.len(), 1);
        assert_eq!(loaded[0].mobs.len(), 1);
    }

    #[test]
    fn save_applies_deletions_then_upserts() {
        let mut store = MemoryStore::new();
        let grid = Grid::new(0, 0);
        store.insert(Record::Resource(placed(9, "resource:tree", grid)));
        let batch = SaveBatch {
            upserts: vec![Record::Resource(placed(10, "resource:rock", grid))],
            deletions: vec![RecordKey::Resource(9)],
        };
        store.save(&batch).unwrap();
        assert!(store.get(&RecordKey::Resource(9)).is_none());
        assert!(store.get(&RecordKey::Resource(10)).is_some());
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn failing_store_reports_persistence_failure() {
        let mut store = MemoryStore::new();
        store.fail_saves(true);
        let err = store.save(&SaveBatch::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn character_is_found_through_account() {
        let mut store = MemoryStore::new();
        store.insert(Record::Account(AccountRecord {
            name: "ada".into(),
            character: 7,
        }));
        store.insert(Record::Character(CharacterRecord {
            id: 7,
            name: "ada".into(),
            kind: "character:player".into(),
            position: [1.0, 2.0],
            health: 50.0,
            admin: false,
        }));
        store.insert(Record::Item(ItemRecord {
            id: 8,
            kind: "item:wood".into(),
            amount: 3,
            owner: 7,
        }));
        let loaded = store.load_character("ada").unwrap().unwrap();
        assert_eq!(loaded.character.id, 7);
        assert_eq!(loaded.items.len(), 1);
        assert!(store.load_character("bob").unwrap().is_none());
    }
}
