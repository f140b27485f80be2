//! WolfHA - LAN Master Election and Membership
//!
//! Nodes on one broadcast segment announce themselves with periodic UDP
//! heartbeats and agree on a single master without a coordinator.
//!
//! # Architecture
//!
//! Every node broadcasts a heartbeat each tick. Every few ticks (a tock) it
//! prunes silent peers and re-evaluates the election: follow the known
//! master, otherwise promote itself if no eligible peer has a lower
//! hostname. When two masters see each other the higher hostname steps
//! down (or exits, if so configured).
//!
//! # Features
//!
//! - Deterministic lowest-hostname election with eligibility control
//! - Failover within one staleness window, immediate on graceful shutdown
//! - Opaque per-node JSON data carried in every heartbeat
//! - master/slave/addserver/deleteserver notifications
//! - HTTP API and `wolfhactl` for inspection

pub mod api;
pub mod cluster;
pub mod config;
pub mod error;
pub mod network;
pub mod state;

pub use config::WolfHaConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cluster::{ClusterManager, ClusterOptions, ClusterStatus};
    pub use crate::config::WolfHaConfig;
    pub use crate::error::{Error, Result};
    pub use crate::network::{Message, Transport, UdpTransport};
    pub use crate::state::{ClusterEvent, LocalRole, NodeRecord, UserData};
}
