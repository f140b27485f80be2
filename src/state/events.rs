//! Cluster notifications delivered to the host application

use crate::state::NodeRecord;

/// Notification emitted when the local role or the membership changes
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    /// The local node became master
    Master,
    /// The local node is (or became) a follower
    Slave,
    /// A node was heard from for the first time
    AddServer(NodeRecord),
    /// A node was removed; carries its last-known record
    DeleteServer(NodeRecord),
}

impl ClusterEvent {
    /// Event name as exposed to hooks and logs
    pub fn name(&self) -> &'static str {
        match self {
            ClusterEvent::Master => "master",
            ClusterEvent::Slave => "slave",
            ClusterEvent::AddServer(_) => "addserver",
            ClusterEvent::DeleteServer(_) => "deleteserver",
        }
    }
}

impl std::fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterEvent::AddServer(node) | ClusterEvent::DeleteServer(node) => {
                write!(f, "{} {}", self.name(), node.hostname)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}
