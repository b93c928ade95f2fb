//! The broadcast registry: the live-update channel's subscriber set.
//!
//! Each subscriber is an accepted `/updates` connection, represented here
//! only by its outbound message queue; the WebSocket pump on the other end
//! drains that queue. Broadcast is fire-and-forget, at-most-once per
//! subscriber: a failed enqueue (the pump is gone) is logged, the
//! subscriber is evicted after the fan-out pass, and the failure never
//! reaches the broadcaster's caller or stalls the remaining subscribers.
//!
//! The registry is owned by the control plane and lives exactly as long
//! as it does; there is no ambient global connection set.

use crate::bus::Signal;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque subscriber handle.
pub type SubscriberId = Uuid;

struct Subscriber {
    tx: mpsc::UnboundedSender<String>,
}

/// Subscriber set for the live-update channel.
#[derive(Default)]
pub struct BroadcastRegistry {
    subscribers: HashMap<SubscriberId, Subscriber>,
}

impl BroadcastRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue; returns its handle.
    pub fn subscribe(&mut self, tx: mpsc::UnboundedSender<String>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Subscriber { tx });
        debug!(subscriber = %id, "subscribed to update channel");
        id
    }

    /// Drop a subscriber. Idempotent.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            debug!(subscriber = %id, "unsubscribed from update channel");
        }
        removed
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether anyone is listening.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Fan a signal out to every subscriber.
    ///
    /// The signal is serialized once; each delivery is a single
    /// non-blocking enqueue. Failures are contained per subscriber: the
    /// dead ones are evicted after the pass and delivery to the rest is
    /// unaffected. Never returns an error.
    pub fn broadcast(&mut self, signal: &Signal) {
        let Some(message) = signal.encode() else {
            return;
        };
        let mut dead = Vec::new();
        for (id, subscriber) in &self.subscribers {
            if subscriber.tx.send(message.clone()).is_err() {
                warn!(subscriber = %id, "failed to deliver signal; dropping subscriber");
                dead.push(*id);
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
            info!(subscriber = %id, "evicted unreachable subscriber");
        }
    }
}
