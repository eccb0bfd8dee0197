//! Everything a tick reads and writes, owned in one place and handed to
//! systems through a [`Context`](crate::schedule::Context).

use meridian_ecs::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::boundary::network::{self, Network, OutboundMessage};
use crate::boundary::persistence::Persistence;
use crate::chat::ChatHistory;
use crate::commands::CommandQueues;
use crate::components::{register_all, Identity};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::link::{EntityLink, IdentityMap};
use crate::model::Models;
use crate::noise::{BiomeSource, ConstantBiome, NoiseFn, ValueNoise};
use crate::prototype::PrototypeRegistry;
use crate::random;
use crate::spatial::chunk::ChunkMap;
use crate::spatial::quadtree::QuadTree;

pub struct GameState {
    pub world: World,
    pub config: ServerConfig,
    pub identities: IdentityMap,
    pub chunks: ChunkMap,
    pub tree: QuadTree,
    pub queues: CommandQueues,
    /// Played back right after the reactive group.
    pub start_buffer: CommandBuffer,
    /// Played back at the very end of the tick.
    pub end_buffer: CommandBuffer,
    pub prototypes: PrototypeRegistry,
    pub chat: ChatHistory,
    pub models: Models,
    pub persistence: Box<dyn Persistence>,
    pub network: Box<dyn Network>,
    pub noise: Box<dyn NoiseFn>,
    pub biomes: Box<dyn BiomeSource>,
    pub rng: Pcg64,
    /// Simulation time at the start of the current tick, in seconds.
    pub time: f64,
    pub tick: u64,
}

impl std::fmt::Debug for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameState")
            .field("world", &self.world)
            .field("tick", &self.tick)
            .field("identities", &self.identities.len())
            .field("chunks", &self.chunks.len())
            .field("tree", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl GameState {
    pub fn new(
        config: ServerConfig,
        persistence: Box<dyn Persistence>,
        network: Box<dyn Network>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let mut world = World::new();
        register_all(&mut world);
        Ok(Self {
            world,
            identities: IdentityMap::new(),
            chunks: ChunkMap::new(),
            tree: QuadTree::default(),
            queues: CommandQueues::new(),
            start_buffer: CommandBuffer::new(),
            end_buffer: CommandBuffer::new(),
            prototypes: PrototypeRegistry::new(),
            chat: ChatHistory::new(config.chat_history_capacity),
            models: Models::default(),
            persistence,
            network,
            noise: Box::new(ValueNoise::new(config.seed)),
            biomes: Box::new(ConstantBiome::default()),
            rng: Pcg64::seed_from_u64(config.seed),
            time: 0.0,
            tick: 0,
            config,
        })
    }

    /// A link to `entity` carrying its current logical id.
    pub fn link(&self, entity: EntityId) -> EntityLink {
        crate::components::link_to(&self.world, entity)
    }

    pub fn resolve(&self, link: &EntityLink) -> Option<EntityId> {
        link.resolve(&self.world, &self.identities)
    }

    /// Give `entity` a logical id now instead of at initialisation. Entities
    /// that already have one keep it.
    pub fn assign_id(&mut self, entity: EntityId) -> Result<u64, ServerError> {
        let current = self.world.get::<Identity>(entity)?.id;
        if current != 0 {
            return Ok(current);
        }
        let id = random::unique_id(&mut self.rng, &self.identities);
        self.world.get_mut::<Identity>(entity)?.id = id;
        self.identities.insert(id, entity);
        Ok(id)
    }

    pub fn send(&mut self, peer: u64, message: OutboundMessage) {
        network::send(self.network.as_mut(), peer, message);
    }
}
