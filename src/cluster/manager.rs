//! Cluster Manager
//!
//! Owns the election state and wires it to a transport, the tick/tock
//! timers and the event channel. All mutations of the cluster state go
//! through one `RwLock` write guard and no guard is held across I/O, so
//! timers and inbound datagrams never interleave inside an update.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::heartbeat;
use crate::config::WolfHaConfig;
use crate::error::{Error, Result};
use crate::network::{DatagramHandler, Message, Transport};
use crate::state::{ClusterEvent, ClusterState, ConflictPolicy, LocalRole, NodeRecord, UserData};

/// Capacity of the event channel; slow subscribers miss older events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runtime options for a cluster manager
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Local hostname (election rank)
    pub hostname: String,
    /// Address advertised in heartbeats
    pub address: String,
    /// May this node become master
    pub eligible: bool,
    /// Tick period
    pub heartbeat_interval: Duration,
    /// Ticks per tock
    pub check_beats: u32,
    /// What to do when outranked by another master
    pub conflict_policy: ConflictPolicy,
    /// Size bound for user data, local and inbound
    pub max_data_bytes: usize,
    /// Initial user data
    pub data: UserData,
}

impl ClusterOptions {
    /// Options with protocol defaults (20s ticks, 3 ticks per tock)
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
            eligible: true,
            heartbeat_interval: Duration::from_secs(20),
            check_beats: 3,
            conflict_policy: ConflictPolicy::Relinquish,
            max_data_bytes: 8192,
            data: UserData::empty(),
        }
    }

    /// Build options from a loaded configuration and the resolved address
    pub fn from_config(config: &WolfHaConfig, address: String) -> Result<Self> {
        Ok(Self {
            hostname: config.hostname()?,
            address,
            eligible: config.node.eligible,
            heartbeat_interval: config.heartbeat_interval(),
            check_beats: config.cluster.check_beats,
            conflict_policy: ConflictPolicy::from_exit_flag(config.cluster.exit_on_conflict),
            max_data_bytes: config.cluster.max_data_bytes,
            data: config.initial_data()?,
        })
    }

    /// Evaluation period, which is also the staleness limit for peers
    pub fn tock_interval(&self) -> Duration {
        self.heartbeat_interval * self.check_beats
    }
}

/// Consistent view of the cluster taken under a single read lock
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatus {
    pub hostname: String,
    pub role: LocalRole,
    pub is_master: bool,
    pub is_slave: bool,
    pub eligible: bool,
    pub leader: Option<String>,
    pub uptime_seconds: u64,
    pub members: Vec<NodeRecord>,
}

/// Election and membership manager for one node
pub struct ClusterManager {
    pub(super) options: ClusterOptions,
    pub(super) state: RwLock<ClusterState>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<ClusterEvent>,
    started_at: Instant,
    shutting_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    exit_tx: watch::Sender<bool>,
}

impl ClusterManager {
    /// Create a manager; nothing runs until `start` (or manual tick/tock)
    pub fn new(options: ClusterOptions, transport: Arc<dyn Transport>) -> Self {
        let mut local = NodeRecord::new(options.hostname.clone(), options.address.clone());
        local.is_eligible = options.eligible;
        local.data = options.data.clone();

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        let (exit_tx, _) = watch::channel(false);

        Self {
            options,
            state: RwLock::new(ClusterState::new(local)),
            transport,
            events,
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
            exit_tx,
        }
    }

    /// Spawn the tick and tock loops. Returns their handles.
    pub fn start(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        tracing::info!(
            "Cluster manager starting for {} (eligible: {}, tick: {}s, tock: {}s)",
            self.options.hostname,
            self.options.eligible,
            self.options.heartbeat_interval.as_secs(),
            self.options.tock_interval().as_secs()
        );

        let ticks = tokio::spawn(heartbeat::run_ticks(Arc::clone(self), self.shutdown_signal()));
        let tocks = tokio::spawn(heartbeat::run_tocks(Arc::clone(self), self.shutdown_signal()));
        (ticks, tocks)
    }

    /// Subscribe to cluster notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    /// Flips to true once shutdown starts
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Flips to true when a conflict requires the host process to exit
    pub fn exit_signal(&self) -> watch::Receiver<bool> {
        self.exit_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn hostname(&self) -> &str {
        &self.options.hostname
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Run one election evaluation (a "tock"). No-op once shutdown has begun.
    pub async fn tock(&self) {
        if self.is_shutting_down() {
            return;
        }

        // Events go out under the write guard so subscribers see them in
        // the same order as the state changes
        let (exit_requested, rebroadcast) = {
            let mut state = self.state.write().await;
            let evaluation = state.evaluate(
                Instant::now(),
                self.options.tock_interval(),
                self.options.conflict_policy,
            );
            self.emit(evaluation.events);
            (evaluation.exit_requested, evaluation.rebroadcast)
        };

        if exit_requested {
            self.exit_tx.send_replace(true);
        }

        if rebroadcast {
            self.tick().await;
        }
    }

    /// Decode and apply one inbound datagram
    pub async fn handle_datagram(&self, datagram: &[u8], sender: SocketAddr) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let message = Message::decode(datagram)?;
        if message.hostname() == self.options.hostname {
            return Ok(());
        }

        tracing::trace!("Received {} from {} ({})", message.type_name(), message.hostname(), sender);

        match message {
            Message::Heartbeat(heartbeat) => {
                heartbeat.data.check_size(self.options.max_data_bytes)?;

                let mut state = self.state.write().await;
                let event = state.table_mut().upsert(heartbeat.into_record(), Instant::now());
                self.emit(event);
            }
            Message::Shutdown { hostname } => {
                let known = {
                    let mut state = self.state.write().await;
                    state.table_mut().mark_stale(&hostname)
                };

                if known {
                    tracing::info!("Node {} is shutting down", hostname);
                    self.tock().await;
                }
            }
        }

        Ok(())
    }

    /// Stop participating: one best-effort departure notice, then all
    /// timers and listeners stop. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Leaving cluster as {}", self.options.hostname);
        self.send(&Message::Shutdown {
            hostname: self.options.hostname.clone(),
        })
        .await;

        self.shutdown_tx.send_replace(true);
    }

    /// Encode and broadcast; failures are logged and dropped
    pub(super) async fn send(&self, message: &Message) {
        let datagram = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to encode {}: {}", message.type_name(), e);
                return;
            }
        };

        if let Err(e) = self.transport.broadcast(&datagram).await {
            tracing::warn!("Failed to broadcast {}: {}", message.type_name(), e);
        }
    }

    fn emit(&self, events: impl IntoIterator<Item = ClusterEvent>) {
        for event in events {
            match &event {
                ClusterEvent::Master | ClusterEvent::Slave => {
                    tracing::info!("Local node is now {}", event.name().to_uppercase())
                }
                _ => tracing::debug!("Cluster event: {}", event),
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }

    // ========== Queries ==========

    /// Consistent snapshot of the whole cluster view
    pub async fn status(&self) -> ClusterStatus {
        let state = self.state.read().await;
        ClusterStatus {
            hostname: state.hostname().to_string(),
            role: state.role(),
            is_master: state.is_master(),
            is_slave: state.is_slave(),
            eligible: state.self_eligible(),
            leader: state.leader().map(str::to_string),
            uptime_seconds: self.uptime().as_secs(),
            members: state.table().snapshot(),
        }
    }

    /// All known records, self included, ordered by hostname
    pub async fn members(&self) -> Vec<NodeRecord> {
        self.state.read().await.table().snapshot()
    }

    pub async fn member(&self, hostname: &str) -> Option<NodeRecord> {
        self.state.read().await.table().get(hostname).cloned()
    }

    /// Hostname of the known master
    pub async fn leader(&self) -> Option<String> {
        self.state.read().await.leader().map(str::to_string)
    }

    pub async fn role(&self) -> LocalRole {
        self.state.read().await.role()
    }

    pub async fn is_master(&self) -> bool {
        self.state.read().await.is_master()
    }

    pub async fn is_slave(&self) -> bool {
        self.state.read().await.is_slave()
    }

    pub fn is_eligible(&self) -> bool {
        self.options.eligible
    }

    /// Local user data as broadcast
    pub async fn data(&self) -> UserData {
        self.state.read().await.table().local().data.clone()
    }

    /// Replace local user data; goes out with the next heartbeat
    pub async fn set_data(&self, data: UserData) -> Result<()> {
        data.check_size(self.options.max_data_bytes)?;
        self.state.write().await.table_mut().local_mut().data = data;
        Ok(())
    }

    /// Exempt a peer from pruning, or lift the exemption
    pub async fn set_locked(&self, hostname: &str, locked: bool) -> Result<()> {
        self.state.write().await.table_mut().set_locked(hostname, locked)
    }
}

#[async_trait]
impl DatagramHandler for ClusterManager {
    async fn on_message(&self, datagram: &[u8], sender: SocketAddr) {
        match self.handle_datagram(datagram, sender).await {
            Ok(()) => {}
            Err(Error::ShuttingDown) => {}
            Err(e) => tracing::warn!("Dropping datagram from {}: {}", sender, e),
        }
    }
}
