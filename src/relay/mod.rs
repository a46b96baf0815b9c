//! Topic relay: many publishers in, many subscribers out.
//!
//! Architecture:
//! ```text
//! ┌───────────┐                                 ┌────────────┐
//! │ publisher │──┐                           ┌─▶│ subscriber │
//! └───────────┘  │   ┌─────────────────────┐ │  └────────────┘
//! ┌───────────┐  ├──▶│ inbound  │ outbound │─┼─▶┌────────────┐
//! │ publisher │──┘   │  listener│ listener │ │  │ subscriber │
//! └───────────┘      └─────────────────────┘ └─▶└────────────┘
//! ```
//!
//! Every message read from any publisher is forwarded verbatim, frame
//! boundaries intact, to every connected subscriber. No topic filtering,
//! no acknowledgement, no persistence. Fan-out runs over a bounded
//! broadcast channel whose capacity is the high-water mark; a lagging
//! subscriber loses the oldest messages instead of stalling publishers.

mod client;
mod server;

pub use client::{RelayPublisher, RelaySubscriber};
pub use server::TopicRelay;

use std::net::SocketAddr;

use crate::wire::WireError;

/// Default inbound (publisher-facing) bind address.
pub const DEFAULT_INBOUND_ADDR: &str = "0.0.0.0:5557";

/// Default outbound (subscriber-facing) bind address.
pub const DEFAULT_OUTBOUND_ADDR: &str = "0.0.0.0:5558";

/// Default per-subscriber high-water mark, in messages.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1000;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur in the relay or its clients.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to relay at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}

/// Bound addresses of a running relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayAddrs {
    pub inbound: SocketAddr,
    pub outbound: SocketAddr,
}
