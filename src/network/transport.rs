//! Transport abstraction
//!
//! The election engine only needs two things from the network: a way to
//! broadcast a datagram, and a callback for datagrams that arrive.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Outbound side: fire-and-forget broadcast to every node on the segment
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broadcast one datagram. Errors are for logging only; nothing retries.
    async fn broadcast(&self, datagram: &[u8]) -> Result<()>;
}

/// Inbound side: receives raw datagrams from the transport
#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn on_message(&self, datagram: &[u8], sender: SocketAddr);
}
