//! parley-gateway: push-stream gateway
//!
//! Subscribes to the topic relay, decodes each event, merges its logical
//! clock and fans it out to every connected push-stream consumer. Also
//! fronts the chat backend's request/reply services over HTTP.
//!
//! ## Architecture
//! ```text
//! [parley-relay] -> [ingress] -> [hub] -> GET /api/events (SSE)
//!                                  ^
//! [HTTP requests] -> [RPC client] -+-> [chat backend / reference]
//! ```
//!
//! ## Configuration
//! - `gateway.http_addr`, `gateway.relay_addr`, `gateway.retry_ms`
//! - `backend.rpc_addr`, `backend.reference_addr`, `backend.timeout_ms`
//! - PARLEY_LOG: tracing filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use parley::clock::LogicalClock;
use parley::config::Config;
use parley::gateway::{self, GatewayState};
use parley::hub::BroadcastHub;
use parley::ingress::EventIngress;
use parley::rpc::BackendClient;
use parley::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting parley-gateway");

    let clock = Arc::new(LogicalClock::new());
    let hub = Arc::new(BroadcastHub::new(config.gateway.consumer_capacity));

    let ingress = EventIngress::new(
        config.gateway.relay_addr.clone(),
        Arc::clone(&clock),
        Arc::clone(&hub),
    );
    let ingress_task = tokio::spawn(async move { ingress.run().await });

    let state = GatewayState {
        backend: BackendClient::from_config(&config.backend, Arc::clone(&clock)),
        clock,
        hub,
        retry: Duration::from_millis(config.gateway.retry_ms),
    };

    let listener = TcpListener::bind(&config.gateway.http_addr).await?;

    tokio::select! {
        result = gateway::serve(listener, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down parley-gateway"),
    }

    ingress_task.abort();
    Ok(())
}
