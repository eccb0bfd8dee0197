//! The collaborators the core talks to: storage and transport.

pub mod network;
pub mod persistence;

pub use network::{DeliveryMethod, Network, OutboundMessage, RecordingNetwork};
pub use persistence::{MemoryStore, Persistence, Record, RecordKey, SaveBatch};
