//! In-memory broadcast domain
//!
//! Stands in for a LAN segment so election behaviour can be exercised
//! deterministically without sockets. Every datagram sent by an endpoint is
//! delivered, in order, to every attached handler (the sender included, as
//! with real broadcast). Endpoints can be cut off to simulate partitions.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use super::transport::{DatagramHandler, Transport};
use crate::error::{Error, Result};

#[derive(Default)]
struct NetworkInner {
    /// Attached receivers
    handlers: Vec<(SocketAddr, Weak<dyn DatagramHandler>)>,
    /// Endpoints that can neither send nor receive
    isolated: HashSet<SocketAddr>,
    /// Every datagram successfully sent, with its sender
    sent: Vec<(SocketAddr, Vec<u8>)>,
}

/// Shared in-memory broadcast segment
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

/// One node's connection to a `MemoryNetwork`
pub struct MemoryEndpoint {
    addr: SocketAddr,
    network: MemoryNetwork,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint for the node at `addr`
    pub fn endpoint(&self, addr: SocketAddr) -> Arc<MemoryEndpoint> {
        Arc::new(MemoryEndpoint {
            addr,
            network: self.clone(),
        })
    }

    /// Register the receiver for `addr`. Held weakly so nodes can be dropped.
    pub fn attach(&self, addr: SocketAddr, handler: Weak<dyn DatagramHandler>) {
        let mut inner = self.lock();
        inner.handlers.retain(|(a, _)| *a != addr);
        inner.handlers.push((addr, handler));
    }

    /// Remove the receiver for `addr`
    pub fn detach(&self, addr: SocketAddr) {
        self.lock().handlers.retain(|(a, _)| *a != addr);
    }

    /// Cut `addr` off from the segment (or reconnect it)
    pub fn set_isolated(&self, addr: SocketAddr, isolated: bool) {
        let mut inner = self.lock();
        if isolated {
            inner.isolated.insert(addr);
        } else {
            inner.isolated.remove(&addr);
        }
    }

    /// All datagrams sent so far, oldest first
    pub fn sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkInner> {
        // A panic while holding the lock only happens in a failing test
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn deliver(&self, from: SocketAddr, datagram: &[u8]) -> Result<()> {
        let receivers: Vec<Arc<dyn DatagramHandler>> = {
            let mut inner = self.lock();
            if inner.isolated.contains(&from) {
                return Err(Error::Network(format!("{} is isolated", from)));
            }
            inner.sent.push((from, datagram.to_vec()));

            let isolated = inner.isolated.clone();
            inner
                .handlers
                .iter()
                .filter(|(addr, _)| !isolated.contains(addr))
                .filter_map(|(_, handler)| handler.upgrade())
                .collect()
        };

        for receiver in receivers {
            receiver.on_message(datagram, from).await;
        }
        Ok(())
    }
}

impl MemoryEndpoint {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Transport for MemoryEndpoint {
    async fn broadcast(&self, datagram: &[u8]) -> Result<()> {
        self.network.deliver(self.addr, datagram).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DatagramHandler for Recorder {
        async fn on_message(&self, datagram: &[u8], sender: SocketAddr) {
            self.seen.lock().unwrap().push((sender, datagram.to_vec()));
        }
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 3014))
    }

    fn attach(net: &MemoryNetwork, at: SocketAddr, recorder: &Arc<Recorder>) {
        let handler: Arc<dyn DatagramHandler> = recorder.clone();
        net.attach(at, Arc::downgrade(&handler));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let net = MemoryNetwork::new();
        let a = Recorder::new();
        let b = Recorder::new();
        attach(&net, addr(1), &a);
        attach(&net, addr(2), &b);

        net.endpoint(addr(1)).broadcast(b"ping").await.unwrap();

        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(b.seen.lock().unwrap()[0], (addr(1), b"ping".to_vec()));
        assert_eq!(net.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_isolated_endpoint() {
        let net = MemoryNetwork::new();
        let a = Recorder::new();
        let b = Recorder::new();
        attach(&net, addr(1), &a);
        attach(&net, addr(2), &b);

        net.set_isolated(addr(2), true);
        assert!(net.endpoint(addr(2)).broadcast(b"x").await.is_err());
        net.endpoint(addr(1)).broadcast(b"y").await.unwrap();
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 0);

        net.set_isolated(addr(2), false);
        net.endpoint(addr(1)).broadcast(b"z").await.unwrap();
        assert_eq!(b.count(), 1);
    }

    #[tokio::test]
    async fn test_detach_and_dropped_handlers() {
        let net = MemoryNetwork::new();
        let a = Recorder::new();
        attach(&net, addr(1), &a);
        {
            let gone = Recorder::new();
            attach(&net, addr(2), &gone);
        }

        net.endpoint(addr(3)).broadcast(b"1").await.unwrap();
        assert_eq!(a.count(), 1);

        net.detach(addr(1));
        net.endpoint(addr(3)).broadcast(b"2").await.unwrap();
        assert_eq!(a.count(), 1);
    }
}
