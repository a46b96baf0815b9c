//! Typed helpers for the recognized backend services.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{reply_data, Result, RpcClient, RpcError};
use crate::clock::LogicalClock;
use crate::config::BackendConfig;
use crate::event::Record;

/// One entry of the reference service's server roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub rank: i64,
}

/// Backend calls made on behalf of consumers.
///
/// Every request carries a wall-clock `timestamp` (seconds) alongside the
/// injected logical clock, as all producers in the system do.
#[derive(Clone)]
pub struct BackendClient {
    chat: RpcClient,
    reference: RpcClient,
}

impl BackendClient {
    pub fn new(chat: RpcClient, reference: RpcClient) -> Self {
        Self { chat, reference }
    }

    /// Build both clients from configuration, sharing one clock.
    pub fn from_config(config: &BackendConfig, clock: Arc<LogicalClock>) -> Self {
        Self {
            chat: RpcClient::new(&config.rpc_addr, Arc::clone(&clock), config.timeout()),
            reference: RpcClient::new(&config.reference_addr, clock, config.timeout()),
        }
    }

    pub async fn login(&self, user: &str) -> Result<Record> {
        self.chat.call("login", args([("user", user)])).await
    }

    pub async fn users(&self) -> Result<Record> {
        self.chat.call("users", args([])).await
    }

    pub async fn channels(&self) -> Result<Record> {
        self.chat.call("channels", args([])).await
    }

    pub async fn create_channel(&self, channel: &str) -> Result<Record> {
        self.chat.call("channel", args([("channel", channel)])).await
    }

    pub async fn publish(&self, user: &str, channel: &str, message: &str) -> Result<Record> {
        self.chat
            .call(
                "publish",
                args([("user", user), ("channel", channel), ("message", message)]),
            )
            .await
    }

    pub async fn message(&self, src: &str, dst: &str, message: &str) -> Result<Record> {
        self.chat
            .call(
                "message",
                args([("src", src), ("dst", dst), ("message", message)]),
            )
            .await
    }

    pub async fn history(&self, channel: &str) -> Result<Record> {
        self.chat.call("history", args([("channel", channel)])).await
    }

    pub async fn private_history(&self, user1: &str, user2: &str) -> Result<Record> {
        self.chat
            .call("private_history", args([("user1", user1), ("user2", user2)]))
            .await
    }

    /// Raw roster reply from the reference service.
    pub async fn list(&self) -> Result<Record> {
        self.reference.call("list", args([])).await
    }

    /// Active servers with their ranks.
    pub async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let reply = self.list().await?;
        parse_roster(&reply)
    }
}

/// Extract `data.list` from a roster reply. A missing or null list is empty.
pub fn parse_roster(reply: &Record) -> Result<Vec<ServerInfo>> {
    match reply_data(reply).and_then(|d| d.get("list")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list.clone()).map_err(|e| RpcError::MalformedReply {
            service: "list".to_string(),
            reason: e.to_string(),
        }),
    }
}

fn args<const N: usize>(pairs: [(&str, &str); N]) -> Record {
    let mut data: Record = pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect();
    data.insert("timestamp".into(), Value::from(now_seconds()));
    data
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
