//! Relay client roles.

use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::debug;

use super::{RelayError, Result};
use crate::wire::{self, Multipart};

/// Connection to the relay's inbound side.
pub struct RelayPublisher {
    stream: TcpStream,
}

impl RelayPublisher {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RelayError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(addr = %addr, "Publisher connected to relay");
        Ok(Self { stream })
    }

    /// Publish a `[topic, payload]` message.
    pub async fn publish(&mut self, topic: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.send(&Multipart::topic(topic, payload)).await
    }

    /// Publish an arbitrary multipart message.
    pub async fn send(&mut self, message: &Multipart) -> Result<()> {
        wire::write_message(&mut self.stream, message).await?;
        Ok(())
    }
}

/// Connection to the relay's outbound side.
///
/// Receives every relayed message; there is no subscription filter.
pub struct RelaySubscriber {
    stream: TcpStream,
}

impl RelaySubscriber {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RelayError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        debug!(addr = %addr, "Subscriber connected to relay");
        Ok(Self { stream })
    }

    /// Wait for the next relayed message.
    pub async fn recv(&mut self) -> Result<Multipart> {
        Ok(wire::read_message(&mut self.stream).await?)
    }
}
