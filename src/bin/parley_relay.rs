//! parley-relay: topic relay
//!
//! Forwards every `[topic, payload]` message from any publisher to every
//! subscriber, frame boundaries intact.
//!
//! ## Architecture
//! ```text
//! [producers] -> inbound (5557) -> [parley-relay] -> outbound (5558) -> [gateways]
//! ```
//!
//! ## Configuration
//! - `relay.inbound_addr`, `relay.outbound_addr`, `relay.high_water_mark`
//! - PARLEY_LOG: tracing filter (default: info)

use tracing::{error, info};

use parley::config::Config;
use parley::relay::TopicRelay;
use parley::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting parley-relay");

    // Bind failure is the one fatal error.
    let relay = TopicRelay::bind(&config.relay).await.map_err(|e| {
        error!(error = %e, "Failed to bind relay endpoints");
        e
    })?;

    tokio::select! {
        _ = relay.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!(forwarded = relay.forwarded_count(), "Shutting down parley-relay");
        }
    }

    Ok(())
}
