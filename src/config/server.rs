//! Relay and gateway configuration types.

use serde::Deserialize;

use crate::relay::{DEFAULT_HIGH_WATER_MARK, DEFAULT_INBOUND_ADDR, DEFAULT_OUTBOUND_ADDR};

/// Topic relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address publishers connect to.
    pub inbound_addr: String,
    /// Address subscribers connect to.
    pub outbound_addr: String,
    /// Messages a subscriber may fall behind before losing the oldest.
    pub high_water_mark: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            inbound_addr: DEFAULT_INBOUND_ADDR.to_string(),
            outbound_addr: DEFAULT_OUTBOUND_ADDR.to_string(),
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listen address.
    pub http_addr: String,
    /// Relay outbound address the event ingress subscribes to.
    pub relay_addr: String,
    /// Reconnect hint sent at the start of every push stream.
    pub retry_ms: u64,
    /// Queue depth per push-stream consumer.
    pub consumer_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            relay_addr: "127.0.0.1:5558".to_string(),
            retry_ms: 1000,
            consumer_capacity: crate::hub::DEFAULT_CONSUMER_CAPACITY,
        }
    }
}
