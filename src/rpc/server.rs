//! Request/reply listener.
//!
//! Answers each exchange with whatever the handler returns. Used by stub
//! backends and tests; the real backend lives outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::event::Record;
use crate::wire::{self, Multipart};

/// Handles one decoded request and produces the full reply record.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    async fn handle(&self, service: &str, data: Record) -> Record;
}

/// Reply sent for requests that cannot be decoded or routed.
pub fn error_reply(description: &str) -> Record {
    match json!({
        "service": "error",
        "data": {
            "status": "error",
            "timestamp": chrono::Utc::now().timestamp(),
            "description": description,
        }
    }) {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Accept exchanges until the task is dropped.
pub async fn serve_rpc(listener: TcpListener, handler: Arc<dyn RpcHandler>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = answer(stream, handler).await {
                        debug!(peer = %peer, error = %e, "RPC exchange failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept RPC connection"),
        }
    }
}

async fn answer(mut stream: TcpStream, handler: Arc<dyn RpcHandler>) -> wire::Result<()> {
    let request = wire::read_message(&mut stream).await?;

    let decoded = request
        .frames()
        .first()
        .and_then(|frame| serde_json::from_slice::<Record>(frame).ok());

    let reply = match decoded {
        Some(mut request) => {
            let service = request
                .get("service")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let data = match request.remove("data") {
                Some(Value::Object(data)) => data,
                _ => Record::new(),
            };
            handler.handle(&service, data).await
        }
        None => error_reply("failed to decode request"),
    };

    wire::write_message(&mut stream, &Multipart::single(encode_reply(&reply))).await
}

/// Serialize a reply; a record that cannot be encoded is answered with an
/// error reply instead.
pub(crate) fn encode_reply<T: Serialize + ?Sized>(reply: &T) -> Vec<u8> {
    match serde_json::to_vec(reply) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to encode RPC reply");
            serde_json::to_vec(&error_reply("failed to encode reply")).unwrap_or_default()
        }
    }
}
