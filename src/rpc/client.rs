//! Single-exchange RPC client.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::{reply_data, Result, RpcError};
use crate::clock::{positive_clock, LogicalClock};
use crate::event::Record;
use crate::wire::{self, Multipart, WireError};

/// RPC client bound to one endpoint.
#[derive(Clone)]
pub struct RpcClient {
    addr: String,
    clock: Arc<LogicalClock>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>, clock: Arc<LogicalClock>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            clock,
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Call `service` with `data`.
    ///
    /// Ticks the clock and injects the value as `data.clock`; merges the
    /// reply's `data.clock` when it is a positive integer. The reply is
    /// returned as decoded.
    #[tracing::instrument(name = "rpc.call", skip(self, data), fields(addr = %self.addr))]
    pub async fn call(&self, service: &str, mut data: Record) -> Result<Record> {
        if data.contains_key("clock") {
            return Err(RpcError::ClockInjected);
        }

        let clock = self.clock.tick();
        data.insert("clock".into(), Value::from(clock));
        let request = serde_json::to_vec(&json!({ "service": service, "data": data }))?;

        let reply = match tokio::time::timeout(self.timeout, self.exchange(service, request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(service = %service, timeout = ?self.timeout, "RPC timed out");
                return Err(self.unavailable(format!("no reply within {:?}", self.timeout)));
            }
        };

        let frame = reply.frames().first().ok_or_else(|| RpcError::MalformedReply {
            service: service.to_string(),
            reason: "empty reply".to_string(),
        })?;

        let decoded: Record =
            serde_json::from_slice(frame).map_err(|e| RpcError::MalformedReply {
                service: service.to_string(),
                reason: e.to_string(),
            })?;

        let data = reply_data(&decoded).ok_or_else(|| RpcError::MalformedReply {
            service: service.to_string(),
            reason: "reply has no 'data' object".to_string(),
        })?;

        if let Some(remote) = positive_clock(data.get("clock")) {
            let merged = self.clock.merge(remote);
            debug!(service = %service, sent = clock, remote, merged, "RPC reply clock merged");
        } else {
            debug!(service = %service, sent = clock, "RPC reply without clock");
        }

        Ok(decoded)
    }

    async fn exchange(&self, service: &str, request: Vec<u8>) -> Result<Multipart> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        wire::write_message(&mut stream, &Multipart::single(request))
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        match wire::read_message(&mut stream).await {
            Ok(reply) => Ok(reply),
            Err(e @ (WireError::FrameTooLarge { .. } | WireError::TooManyFrames { .. })) => {
                Err(RpcError::MalformedReply {
                    service: service.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(self.unavailable(e.to_string())),
        }
    }

    fn unavailable(&self, reason: String) -> RpcError {
        RpcError::Unavailable {
            addr: self.addr.clone(),
            reason,
        }
    }
}
