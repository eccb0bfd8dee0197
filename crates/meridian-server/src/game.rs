//! The assembled server: state, event handlers and the tick pipeline.
//!
//! ```
//! use meridian_server::prelude::*;
//!
//! let mut game = Game::new(
//!     ServerConfig::default(),
//!     Box::new(MemoryStore::new()),
//!     Box::new(RecordingNetwork::new()),
//! )
//! .unwrap();
//! let hero = game.login("ada", 1).unwrap();
//! game.run_ticks(3).unwrap();
//! assert!(game.state().world.has::<Initialized>(hero));
//! ```

use std::time::Instant;

use glam::DVec2;
use meridian_ecs::prelude::*;
use tracing::{debug, info, warn};

use crate::boundary::network::Network;
use crate::boundary::persistence::{LoadedCharacter, Persistence};
use crate::components::{Character, Health, Identity, InInventory, Inactive, Inventory, Item, LoggedIn};
use crate::config::ServerConfig;
use crate::console;
use crate::content::{self, PLAYER};
use crate::error::ServerError;
use crate::events::{ItemAdded, Login, Logout, Register};
use crate::handlers;
use crate::link::EntityLink;
use crate::schedule::{Context, Scheduler};
use crate::state::GameState;
use crate::systems;

pub struct Game {
    state: GameState,
    events: EventBus<GameState>,
    scheduler: Scheduler,
}

impl Game {
    /// A game with the default prototypes and the full pipeline installed.
    pub fn new(
        config: ServerConfig,
        persistence: Box<dyn Persistence>,
        network: Box<dyn Network>,
    ) -> Result<Self, ServerError> {
        let mut game = Self::bare(config, persistence, network)?;
        content::register_defaults(&mut game.state);
        Ok(game)
    }

    /// Like [`Game::new`] but with an empty prototype registry.
    pub fn bare(
        config: ServerConfig,
        persistence: Box<dyn Persistence>,
        network: Box<dyn Network>,
    ) -> Result<Self, ServerError> {
        let mut scheduler = Scheduler::new(config.tick_config())?;
        systems::install(&mut scheduler, &config);
        let mut events = EventBus::new();
        handlers::subscribe_all(&mut events);
        let state = GameState::new(config, persistence, network)?;
        Ok(Self {
            state,
            events,
            scheduler,
        })
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Publish `event` outside the tick.
    pub fn publish<E: 'static>(&mut self, event: &E) -> usize {
        self.events.publish(event, &mut self.state)
    }

    /// Run one tick. Only fatal errors come back.
    pub fn tick(&mut self) -> Result<(), ServerError> {
        let mut ctx = Context::new(&mut self.state, &mut self.events);
        self.scheduler.tick(&mut ctx)
    }

    pub fn run_ticks(&mut self, count: u64) -> Result<(), ServerError> {
        for _ in 0..count {
            self.tick()?;
        }
        Ok(())
    }

    /// Tick at the configured rate until `poll` returns `false`. `poll` runs
    /// before every tick and is where inbound traffic gets enqueued.
    pub fn run(&mut self, mut poll: impl FnMut(&mut Game) -> bool) -> Result<(), ServerError> {
        info!(
            tick_rate = self.state.config.tick_rate,
            systems = self.scheduler.system_names().len(),
            "server loop started"
        );
        while poll(self) {
            let started = Instant::now();
            self.tick()?;
            if let Some(rest) = self.scheduler.remaining(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        info!(ticks = self.scheduler.tick_count(), "server loop stopped");
        Ok(())
    }

    /// Run an operator console line.
    pub fn console(&mut self, line: &str) -> Result<String, ServerError> {
        console::execute(&mut self.state, line)
    }

    /// Bring `name` into the world on `peer`. A character still in the world
    /// is reactivated, a saved one is restored, otherwise a new one is
    /// created at the spawn point.
    pub fn login(&mut self, name: &str, peer: u64) -> Result<EntityId, ServerError> {
        let admin = self.state.config.admins.iter().any(|a| a == name);

        if let Some(existing) = self.find_character(|c| c.name == name) {
            let world = &mut self.state.world;
            if world.has::<Inactive>(existing) {
                world.remove::<Inactive>(existing)?;
            }
            let character = world.get_mut::<Character>(existing)?;
            character.peer = peer;
            character.admin |= admin;
            world.add(existing, LoggedIn)?;
            self.publish(&Login {
                character: existing,
                peer,
            });
            self.announce_inventory(existing)?;
            return Ok(existing);
        }

        let saved = self.state.persistence.load_character(name)?;
        let (character, registered) = match saved {
            Some(loaded) => (self.restore_character(&loaded, peer, admin)?, false),
            None => (self.create_character(name, peer, admin)?, true),
        };

        self.publish(&Login { character, peer });
        if registered {
            self.publish(&Register {
                character,
                name: name.to_owned(),
            });
        }
        self.announce_inventory(character)?;
        Ok(character)
    }

    /// Take the character on `peer` out of play. It stays in the world,
    /// inactive, until its chunk unloads.
    pub fn logout(&mut self, peer: u64) -> Result<Option<EntityId>, ServerError> {
        let Some(character) = self.find_character(|c| c.peer == peer) else {
            debug!(peer, "logout for unknown peer");
            return Ok(None);
        };
        let world = &mut self.state.world;
        world.add(character, Inactive)?;
        if world.has::<LoggedIn>(character) {
            world.remove::<LoggedIn>(character)?;
        }
        self.publish(&Logout { character, peer });
        Ok(Some(character))
    }

    fn find_character(&self, matches: impl Fn(&Character) -> bool) -> Option<EntityId> {
        self.state
            .world
            .query_filtered::<(&Character,)>(&crate::components::live())
            .find(|(_, (c,))| matches(c))
            .map(|(e, _)| e)
    }

    fn spawn_point(&self) -> DVec2 {
        let [lat, lon] = self.state.config.spawn_point;
        DVec2::new(lat, lon)
    }

    fn create_character(&mut self, name: &str, peer: u64, admin: bool) -> Result<EntityId, ServerError> {
        let at = self.spawn_point();
        let state = &mut self.state;
        let entity = state.prototypes.instantiate_at(&mut state.world, PLAYER, at)?;
        state.world.add(
            entity,
            Character {
                name: name.to_owned(),
                peer,
                admin,
            },
        )?;
        state.world.add(entity, LoggedIn)?;
        let id = state.assign_id(entity)?;
        info!(%entity, id, name, "character created");
        Ok(entity)
    }

    /// Set a saved logical id, unless something live already holds it.
    fn restore_id(&mut self, entity: EntityId, id: u64) -> Result<(), ServerError> {
        let state = &mut self.state;
        if id == 0 || state.identities.get(id).is_some_and(|e| state.world.is_alive(e)) {
            warn!(%entity, id, "saved id unavailable, assigning a new one");
            state.assign_id(entity)?;
            return Ok(());
        }
        state.world.get_mut::<Identity>(entity)?.id = id;
        state.identities.insert(id, entity);
        Ok(())
    }

    fn restore_character(
        &mut self,
        loaded: &LoadedCharacter,
        peer: u64,
        admin: bool,
    ) -> Result<EntityId, ServerError> {
        let record = &loaded.character;
        let at = DVec2::new(record.position[0], record.position[1]);
        let state = &mut self.state;
        let entity = state.prototypes.instantiate_at(&mut state.world, &record.kind, at)?;
        state.world.add(
            entity,
            Character {
                name: record.name.clone(),
                peer,
                admin: admin || record.admin,
            },
        )?;
        if let Ok(health) = state.world.get_mut::<Health>(entity) {
            health.current = record.health.min(health.max);
        }
        state.world.add(entity, LoggedIn)?;
        self.restore_id(entity, record.id)?;

        let owner = self.state.link(entity);
        for saved in &loaded.items {
            let state = &mut self.state;
            let item = match state.prototypes.instantiate(&mut state.world, &saved.kind) {
                Ok(item) => item,
                Err(err) => {
                    warn!(id = saved.id, kind = %saved.kind, error = %err, "saved item dropped");
                    continue;
                }
            };
            state.world.get_mut::<Item>(item)?.amount = saved.amount;
            state.world.add(item, InInventory { owner })?;
            self.restore_id(item, saved.id)?;
            let link = self.state.link(item);
            self.state.world.get_mut::<Inventory>(entity)?.items.push(link);
        }
        info!(%entity, id = record.id, name = %record.name, items = loaded.items.len(), "character restored");
        Ok(entity)
    }

    /// Tell the owner's client about every stack it holds.
    fn announce_inventory(&mut self, owner: EntityId) -> Result<(), ServerError> {
        let items: Vec<EntityLink> = match self.state.world.get::<Inventory>(owner) {
            Ok(inventory) => inventory.items.clone(),
            Err(_) => return Ok(()),
        };
        for item in items {
            if self.state.world.is_alive(item.entity) {
                self.publish(&ItemAdded {
                    owner,
                    item: item.entity,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("state", &self.state)
            .field("tick", &self.scheduler.tick_count())
            .finish_non_exhaustive()
    }
}
