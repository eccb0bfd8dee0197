//! Meridian server -- authoritative game-server layer on top of
//! [`meridian_ecs`].
//!
//! A [`Game`](game::Game) owns the [`GameState`](state::GameState), the event
//! bus and a fixed-timestep [`Scheduler`](schedule::Scheduler) running the
//! frame pipeline from [`systems::install`]. Inbound intents are pushed onto
//! the per-kind [`CommandQueues`](commands::CommandQueues) and executed on
//! the next tick. Persistence and transport sit behind the
//! [`Persistence`](boundary::Persistence) and [`Network`](boundary::Network)
//! traits.
//!
//! # Quick Start
//!
//! ```
//! use meridian_server::prelude::*;
//!
//! let net = RecordingNetwork::new();
//! let mut game = Game::new(
//!     ServerConfig::default(),
//!     Box::new(MemoryStore::new()),
//!     Box::new(net.clone()),
//! )
//! .unwrap();
//!
//! let ada = game.login("ada", 7).unwrap();
//! let sender = game.state().link(ada);
//! game.state_mut().queues.chat.enqueue(ChatCommand {
//!     sender,
//!     message: "hello".into(),
//! });
//! game.run_ticks(2).unwrap();
//! assert!(net
//!     .sent_to(7)
//!     .iter()
//!     .any(|m| matches!(m, OutboundMessage::Chat { message, .. } if message == "hello")));
//! ```

#![deny(unsafe_code)]

pub mod boundary;
pub mod chat;
pub mod commands;
pub mod components;
pub mod config;
pub mod console;
pub mod content;
pub mod error;
pub mod events;
pub mod game;
pub mod handlers;
pub mod inventory;
pub mod link;
pub mod model;
pub mod noise;
pub mod prototype;
pub mod random;
pub mod schedule;
pub mod spatial;
pub mod state;
pub mod systems;

/// Re-export the ECS crate for convenience.
pub use meridian_ecs;

/// Convenience re-exports for common server usage.
pub mod prelude {
    pub use meridian_ecs::prelude::*;

    pub use crate::boundary::{
        DeliveryMethod, MemoryStore, Network, OutboundMessage, Persistence, RecordingNetwork,
    };
    pub use crate::commands::{
        BuildCommand, ChatCommand, ChunkCommand, ClickCommand, CommandQueues, DoubleClickCommand,
        EntityCommand, InventoryCommand, InventoryOp, PickupCommand, PopupCommand, TeleportCommand,
    };
    pub use crate::components::*;
    pub use crate::config::ServerConfig;
    pub use crate::error::ServerError;
    pub use crate::game::Game;
    pub use crate::link::{EntityLink, IdentityMap};
    pub use crate::schedule::{Context, Group, Interval, Scheduler, System, TickConfig};
    pub use crate::spatial::{Aoi, Grid, QuadTree, Rect};
    pub use crate::state::GameState;
}
