//! Event ingress: relay output -> decode -> clock merge -> hub.
//!
//! One long-running loop, one iteration per relayed message. Nothing that
//! goes wrong with a single message stops the loop; losing the relay
//! connection triggers a reconnect with backoff.

use std::sync::Arc;

use backon::Retryable;
use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::clock::LogicalClock;
use crate::event::{decode_event, Event, UNKNOWN_TOPIC};
use crate::hub::BroadcastHub;
use crate::relay::{RelayError, RelaySubscriber};
use crate::utils::retry::connection_backoff;
use crate::wire::Multipart;

/// Split a relayed message into `(topic, payload)`.
///
/// Two or more frames: first is the topic, second the payload. One frame:
/// topic `unknown`, the frame is the payload. No frames: nothing to do.
pub fn split_frames(message: Multipart) -> Option<(String, Bytes)> {
    let mut frames = message.into_frames().into_iter();
    match (frames.next(), frames.next()) {
        (Some(topic), Some(payload)) => {
            Some((String::from_utf8_lossy(&topic).into_owned(), payload))
        }
        (Some(payload), None) => Some((UNKNOWN_TOPIC.to_string(), payload)),
        _ => None,
    }
}

/// Ingress loop bound to one relay, clock and hub.
pub struct EventIngress {
    relay_addr: String,
    clock: Arc<LogicalClock>,
    hub: Arc<BroadcastHub>,
}

impl EventIngress {
    pub fn new(relay_addr: impl Into<String>, clock: Arc<LogicalClock>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            clock,
            hub,
        }
    }

    /// Run forever: connect, consume until the connection drops, reconnect.
    pub async fn run(&self) {
        loop {
            let addr = self.relay_addr.clone();
            let connected = (|| RelaySubscriber::connect(&addr))
                .retry(connection_backoff())
                .notify(|e: &RelayError, delay| {
                    warn!(addr = %addr, error = %e, ?delay, "Relay not reachable, retrying");
                })
                .await;

            match connected {
                Ok(mut subscriber) => {
                    info!(addr = %self.relay_addr, "Event ingress attached to relay");
                    let reason = self.consume(&mut subscriber).await;
                    warn!(addr = %self.relay_addr, error = %reason, "Relay connection lost");
                }
                Err(e) => {
                    error!(addr = %self.relay_addr, error = %e, "Giving up on relay for now");
                }
            }
        }
    }

    /// Consume from an attached subscriber until it fails.
    pub async fn consume(&self, subscriber: &mut RelaySubscriber) -> RelayError {
        loop {
            match subscriber.recv().await {
                Ok(message) => {
                    self.ingest(message).await;
                }
                Err(e) => return e,
            }
        }
    }

    /// Process one relayed message. Returns the forwarded event, if any.
    pub async fn ingest(&self, message: Multipart) -> Option<Event> {
        let Some((topic, payload)) = split_frames(message) else {
            warn!("Dropping relayed message with no frames");
            return None;
        };

        let event = match decode_event(&topic, &payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %topic, bytes = payload.len(), error = %e, "Dropping undecodable event");
                return None;
            }
        };

        if let Some(remote) = event.clock {
            let merged = self.clock.merge(remote);
            debug!(topic = %topic, remote, merged, "Event clock merged");
        }

        let delivered = self.hub.publish(&event).await;
        debug!(topic = %topic, delivered, "Event forwarded to hub");
        Some(event)
    }
}
