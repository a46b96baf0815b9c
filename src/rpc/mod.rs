//! Request/reply boundary to the backend.
//!
//! Every call opens a fresh exchange: connect, send one single-frame
//! request `{"service": .., "data": {.., "clock": n}}`, wait for exactly
//! one reply frame, close. Calls share nothing but the logical clock.

mod backend;
mod client;
mod server;

pub use backend::{parse_roster, BackendClient, ServerInfo};
pub use client::RpcClient;
pub use server::{error_reply, serve_rpc, RpcHandler};

use serde_json::Value;

use crate::event::Record;

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors surfaced to the caller of an RPC.
///
/// None of these are retried here; retry policy belongs to the caller.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Backend unavailable at {addr}: {reason}")]
    Unavailable { addr: String, reason: String },

    #[error("Malformed reply to '{service}': {reason}")]
    MalformedReply { service: String, reason: String },

    #[error("Request data must not carry a 'clock' field")]
    ClockInjected,

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The `data` object of a reply, if present.
pub fn reply_data(reply: &Record) -> Option<&Record> {
    reply.get("data").and_then(Value::as_object)
}
