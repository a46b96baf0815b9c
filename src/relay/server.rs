//! Relay server loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{RelayAddrs, RelayError, Result};
use crate::config::RelayConfig;
use crate::wire::{self, Multipart, WireError};

/// Relay with both listeners bound.
///
/// Binding happens in [`TopicRelay::bind`] so that a bind failure surfaces
/// before anything runs; [`TopicRelay::run`] then never fails.
pub struct TopicRelay {
    inbound: TcpListener,
    outbound: TcpListener,
    sender: broadcast::Sender<Arc<Multipart>>,
    forwarded: Arc<AtomicU64>,
}

impl TopicRelay {
    /// Bind the inbound and outbound listeners.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let inbound = bind_listener(&config.inbound_addr).await?;
        let outbound = bind_listener(&config.outbound_addr).await?;
        let (sender, _) = broadcast::channel(config.high_water_mark.max(1));

        info!(
            inbound = %config.inbound_addr,
            outbound = %config.outbound_addr,
            high_water_mark = config.high_water_mark,
            "Topic relay bound"
        );

        Ok(Self {
            inbound,
            outbound,
            sender,
            forwarded: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Actual bound addresses (useful when binding port 0).
    pub fn local_addrs(&self) -> Result<RelayAddrs> {
        Ok(RelayAddrs {
            inbound: self.inbound.local_addr()?,
            outbound: self.outbound.local_addr()?,
        })
    }

    /// Number of subscribers currently attached.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total messages accepted from publishers.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Accept publishers and subscribers until the task is dropped.
    pub async fn run(&self) {
        info!("Topic relay running");
        loop {
            tokio::select! {
                accepted = self.inbound.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let sender = self.sender.clone();
                        let forwarded = Arc::clone(&self.forwarded);
                        tokio::spawn(serve_publisher(stream, peer, sender, forwarded));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept publisher"),
                },
                accepted = self.outbound.accept() => match accepted {
                    Ok((stream, peer)) => {
                        // Subscribe at accept time: anything relayed before this
                        // point is never seen by this subscriber.
                        let receiver = self.sender.subscribe();
                        tokio::spawn(serve_subscriber(stream, peer, receiver));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept subscriber"),
                },
            }
        }
    }
}

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Read messages from one publisher, in order, into the fan-out channel.
async fn serve_publisher(
    mut stream: TcpStream,
    peer: SocketAddr,
    sender: broadcast::Sender<Arc<Multipart>>,
    forwarded: Arc<AtomicU64>,
) {
    debug!(peer = %peer, "Publisher connected");
    loop {
        match wire::read_message(&mut stream).await {
            Ok(message) => {
                let bytes = message.byte_len();
                let frames = message.len();
                forwarded.fetch_add(1, Ordering::Relaxed);
                // Err means no subscribers right now; the message is simply dropped
                let receivers = sender.send(Arc::new(message)).unwrap_or(0);
                debug!(peer = %peer, frames, bytes, receivers, "Relayed message");
            }
            Err(WireError::Closed) => {
                debug!(peer = %peer, "Publisher disconnected");
                break;
            }
            Err(e) => {
                // Framing is lost for this connection only; other publishers continue.
                warn!(peer = %peer, error = %e, "Dropping publisher after framing error");
                break;
            }
        }
    }
}

/// Forward every relayed message to one subscriber until it goes away.
async fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    mut receiver: broadcast::Receiver<Arc<Multipart>>,
) {
    debug!(peer = %peer, "Subscriber connected");
    let (mut read_half, mut write_half) = stream.into_split();
    let mut probe = [0u8; 64];

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(message) => {
                    if let Err(e) = wire::write_message(&mut write_half, &message).await {
                        debug!(peer = %peer, error = %e, "Subscriber write failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(peer = %peer, skipped, "Subscriber over high-water mark, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Subscribers never send; a read returning means EOF or error.
            read = read_half.read(&mut probe) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            },
        }
    }
    debug!(peer = %peer, "Subscriber disconnected");
}
