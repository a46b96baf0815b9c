//! Parley - chat event distribution core
//!
//! Producers publish `[topic, payload]` messages to a topic relay. A gateway
//! subscribes to the relay, decodes each event, merges its Lamport clock and
//! fans it out to every connected push-stream consumer. Consumers reconcile
//! the stream locally (dedup, focus, coordinator view) and talk to the chat
//! backend through a clock-carrying request/reply client.

pub mod clock;
pub mod config;
pub mod event;
pub mod gateway;
pub mod hub;
pub mod ingress;
pub mod reconciler;
pub mod relay;
pub mod rpc;
pub mod utils;
pub mod wire;
