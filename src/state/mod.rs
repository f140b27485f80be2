//! State Management Module
//!
//! Cluster membership, leader election and conflict resolution. Everything
//! here is synchronous; the cluster manager serializes access.

mod data;
mod events;
mod membership;
pub mod conflict;
pub mod election;

pub use data::UserData;
pub use events::ClusterEvent;
pub use membership::{MembershipTable, NodeRecord};
pub use conflict::{ConflictAction, ConflictPolicy};
pub use election::{ClusterState, Evaluation, LocalRole};
