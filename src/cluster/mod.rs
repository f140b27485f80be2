//! Cluster Module
//!
//! Runs the election: heartbeat timers, inbound datagram handling and the
//! event channel around the pure state in `crate::state`.

mod heartbeat;
mod manager;

pub use manager::{ClusterManager, ClusterOptions, ClusterStatus};
