//! Broadcast hub: fans each ingress event out to every push-stream consumer.
//!
//! Consumers come and go independently. Each one is a bounded queue drained
//! by its push-stream connection. Delivery is best effort, at most once per
//! registered consumer, in ingress order; there is no replay for consumers
//! that register later.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::Event;

/// Default queue depth per consumer.
pub const DEFAULT_CONSUMER_CAPACITY: usize = 256;

/// Identifier assigned at registration.
pub type ConsumerId = Uuid;

/// Serialized event as written to consumers.
pub type EventLine = Arc<str>;

/// A registered consumer.
struct Consumer {
    sender: mpsc::Sender<EventLine>,
    /// Dropped together with the consumer; releases its close watcher.
    _release: oneshot::Sender<()>,
}

type ConsumerMap = Arc<RwLock<HashMap<ConsumerId, Consumer>>>;

/// Handle returned to the push-stream connection.
pub struct Registration {
    pub id: ConsumerId,
    pub receiver: mpsc::Receiver<EventLine>,
}

/// Set of connected consumers.
pub struct BroadcastHub {
    consumers: ConsumerMap,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            consumers: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new consumer.
    ///
    /// A watcher task unregisters the consumer as soon as the receiving side
    /// is dropped (peer disconnected), so the set never grows unbounded.
    pub async fn register(&self) -> Registration {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.capacity);
        let (release, released) = oneshot::channel();
        let watch = sender.clone();

        let count = {
            let mut consumers = self.consumers.write().await;
            consumers.insert(
                id,
                Consumer {
                    sender,
                    _release: release,
                },
            );
            consumers.len()
        };
        info!(consumer = %id, consumers = count, "Consumer registered");

        let consumers = Arc::clone(&self.consumers);
        tokio::spawn(async move {
            tokio::select! {
                _ = watch.closed() => {
                    let removed = consumers.write().await.remove(&id).is_some();
                    if removed {
                        info!(consumer = %id, "Consumer disconnected, unregistered");
                    }
                }
                // Already unregistered by the hub; drop our sender so the stream ends.
                _ = released => {}
            }
        });

        Registration { id, receiver }
    }

    /// Remove a consumer. Returns whether it was registered.
    pub async fn unregister(&self, id: ConsumerId) -> bool {
        let removed = self.consumers.write().await.remove(&id).is_some();
        if removed {
            info!(consumer = %id, "Consumer unregistered");
        }
        removed
    }

    /// Deliver an event to every registered consumer.
    ///
    /// The event is serialized once. A consumer whose queue is closed or
    /// full is unregistered; the others still receive the event. Returns the
    /// number of consumers that received it.
    pub async fn publish(&self, event: &Event) -> usize {
        let line: EventLine = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let mut consumers = self.consumers.write().await;
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (id, consumer) in consumers.iter() {
            match consumer.sender.try_send(Arc::clone(&line)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(consumer = %id, "Consumer queue full, dropping consumer");
                    failed.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(consumer = %id, "Consumer closed during delivery");
                    failed.push(*id);
                }
            }
        }

        for id in &failed {
            consumers.remove(id);
        }

        debug!(
            topic = %event.topic,
            delivered,
            removed = failed.len(),
            remaining = consumers.len(),
            "Event broadcast"
        );
        delivered
    }

    /// Number of registered consumers.
    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CONSUMER_CAPACITY)
    }
}

#[cfg(test)]
mod tests;
