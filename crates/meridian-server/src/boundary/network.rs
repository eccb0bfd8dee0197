//! Network boundary.
//!
//! Systems hand [`OutboundMessage`]s to a [`Network`] implementation together
//! with the delivery class for that message kind. Encoding and transport live
//! on the other side of the trait.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeliveryMethod {
    /// Ordered and retransmitted.
    Reliable,
    /// Unreliable, stale packets dropped.
    Sequenced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Full component bundle of an entity entering view.
    Spawn {
        id: u64,
        kind: String,
        components: BTreeMap<String, serde_json::Value>,
    },
    Transform {
        id: u64,
        position: [f64; 2],
        rotation: [f64; 4],
    },
    Health {
        id: u64,
        current: f32,
        max: f32,
    },
    Animation {
        id: u64,
        params: BTreeMap<String, f32>,
        triggers: Vec<String>,
    },
    Despawn {
        id: u64,
    },
    InventoryAdd {
        owner: u64,
        item: u64,
        kind: String,
        amount: u32,
    },
    InventoryUpdate {
        owner: u64,
        item: u64,
        amount: u32,
    },
    InventoryRemove {
        owner: u64,
        item: u64,
    },
    Chat {
        from: String,
        message: String,
    },
}

impl OutboundMessage {
    /// Delivery class for this message kind.
    pub fn delivery(&self) -> DeliveryMethod {
        match self {
            OutboundMessage::Transform { .. } => DeliveryMethod::Sequenced,
            _ => DeliveryMethod::Reliable,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Spawn { .. } => "spawn",
            OutboundMessage::Transform { .. } => "transform",
            OutboundMessage::Health { .. } => "health",
            OutboundMessage::Animation { .. } => "animation",
            OutboundMessage::Despawn { .. } => "despawn",
            OutboundMessage::InventoryAdd { .. } => "inventory_add",
            OutboundMessage::InventoryUpdate { .. } => "inventory_update",
            OutboundMessage::InventoryRemove { .. } => "inventory_remove",
            OutboundMessage::Chat { .. } => "chat",
        }
    }
}

/// Transport collaborator.
pub trait Network {
    fn send(&mut self, peer: u64, message: &OutboundMessage, delivery: DeliveryMethod);
}

/// Send `message` with the delivery class its kind calls for.
pub fn send(network: &mut dyn Network, peer: u64, message: OutboundMessage) {
    let delivery = message.delivery();
    network.send(peer, &message, delivery);
}

/// One recorded send.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub peer: u64,
    pub message: OutboundMessage,
    pub delivery: DeliveryMethod,
}

/// Keeps every send. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingNetwork {
    sent: Rc<RefCell<Vec<Envelope>>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.borrow().clone()
    }

    pub fn sent_to(&self, peer: u64) -> Vec<OutboundMessage> {
        self.sent
            .borrow()
            .iter()
            .filter(|e| e.peer == peer)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl Network for RecordingNetwork {
    fn send(&mut self, peer: u64, message: &OutboundMessage, delivery: DeliveryMethod) {
        self.sent.borrow_mut().push(Envelope {
            peer,
            message: message.clone(),
            delivery,
        });
    }
}

/// Logs sends at debug level. Used by the headless binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNetwork;

impl Network for LoggingNetwork {
    fn send(&mut self, peer: u64, message: &OutboundMessage, delivery: DeliveryMethod) {
        debug!(peer, kind = message.kind(), ?delivery, "outbound");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transforms_are_sequenced_everything_else_reliable() {
        let transform = OutboundMessage::Transform {
            id: 1,
            position: [0.0, 0.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
        };
        assert_eq!(transform.delivery(), DeliveryMethod::Sequenced);
        assert_eq!(
            OutboundMessage::Despawn { id: 1 }.delivery(),
            DeliveryMethod::Reliable
        );
    }

    #[test]
    fn recording_network_shares_log_between_clones() {
        let net = RecordingNetwork::new();
        let mut sink = net.clone();
        send(&mut sink, 4, OutboundMessage::Despawn { id: 9 });
        assert_eq!(net.sent_to(4), vec![OutboundMessage::Despawn { id: 9 }]);
        assert!(net.sent_to(5).is_empty());
        assert_eq!(net.take().len(), 1);
        assert!(net.sent().is_empty());
    }
}
