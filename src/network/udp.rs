//! UDP Broadcast Transport
//!
//! One socket bound to the cluster port both sends broadcasts and receives
//! everyone else's (including our own, which the handler filters out).

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::message::MAX_DATAGRAM_SIZE;
use super::transport::{DatagramHandler, Transport};
use crate::error::{Error, Result};

/// UDP broadcast transport
pub struct UdpTransport {
    /// Shared send/receive socket
    socket: Arc<UdpSocket>,
    /// Where broadcasts are sent
    broadcast_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind the cluster port. Failure here is fatal for the node.
    pub async fn bind(port: u16, broadcast_ip: Ipv4Addr) -> Result<Self> {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| Error::Network(format!("Failed to bind UDP port {}: {}", port, e)))?;

        socket
            .set_broadcast(true)
            .map_err(|e| Error::Network(format!("Failed to enable broadcast: {}", e)))?;

        let broadcast_addr = SocketAddr::V4(SocketAddrV4::new(broadcast_ip, port));
        tracing::info!(
            "UDP transport bound to {}, broadcasting to {}",
            bind_addr,
            broadcast_addr
        );

        Ok(Self {
            socket: Arc::new(socket),
            broadcast_addr,
        })
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Broadcast destination
    pub fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast_addr
    }

    /// Start the receive loop, delivering each datagram to `handler`.
    /// The loop ends when `shutdown` flips to true; the socket is released
    /// once the transport itself is dropped.
    pub fn spawn_listener(
        &self,
        handler: Arc<dyn DatagramHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                tokio::select! {
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, src)) => handler.on_message(&buf[..len], src).await,
                            Err(e) => tracing::debug!("UDP recv error: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("UDP listener stopped");
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn broadcast(&self, datagram: &[u8]) -> Result<()> {
        self.socket
            .send_to(datagram, self.broadcast_addr)
            .await
            .map_err(|e| Error::Network(format!("Broadcast to {} failed: {}", self.broadcast_addr, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Collector {
        received: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl DatagramHandler for Collector {
        async fn on_message(&self, datagram: &[u8], _sender: SocketAddr) {
            self.received.lock().unwrap().push(datagram.to_vec());
        }
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = UdpTransport::bind(0, Ipv4Addr::LOCALHOST).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = UdpTransport::bind(port, Ipv4Addr::LOCALHOST).await;
        assert!(matches!(err, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_listener_delivers_datagrams() {
        let transport = UdpTransport::bind(0, Ipv4Addr::LOCALHOST).await.unwrap();
        let port = transport.local_addr().unwrap().port();

        let collector = Arc::new(Collector {
            received: Mutex::new(Vec::new()),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = transport.spawn_listener(collector.clone(), shutdown_rx);

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"{\"hello\":1}", ("127.0.0.1", port)).await.unwrap();

        for _ in 0..50 {
            if !collector.received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(collector.received.lock().unwrap()[0], b"{\"hello\":1}".to_vec());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
