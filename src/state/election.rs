//! Leader Election
//!
//! Deterministic, coordinator-free election: every node runs the same
//! evaluation against the membership table on a fixed period, and the
//! lowest eligible hostname wins. No votes, no terms; stale nodes are
//! pruned and conflicting masters are resolved by rank.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::state::conflict::{self, ConflictAction, ConflictPolicy};
use crate::state::{ClusterEvent, MembershipTable, NodeRecord};

/// Role of the local node.
///
/// Entering `Master` or `Slave` emits a notification. Falling back from
/// `Slave` to `Unknown` when the followed master disappears does not: there
/// is no event for it, so hosts that need to know should poll `role()` or
/// watch for the `deleteserver` of the old master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalRole {
    /// No master known yet
    Unknown,
    /// Following another master
    Slave,
    /// This node is the master
    Master,
}

impl std::fmt::Display for LocalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalRole::Unknown => write!(f, "UNKNOWN"),
            LocalRole::Slave => write!(f, "SLAVE"),
            LocalRole::Master => write!(f, "MASTER"),
        }
    }
}

/// Side effects requested by one evaluation pass
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Notifications to deliver, in the order they happened
    pub events: Vec<ClusterEvent>,
    /// Send a heartbeat now instead of waiting for the next tick
    pub rebroadcast: bool,
    /// A higher-ranked master exists and the policy says to exit
    pub exit_requested: bool,
}

/// Everything the election engine owns. Mutated by one writer at a time.
#[derive(Debug)]
pub struct ClusterState {
    /// Membership table (self included)
    table: MembershipTable,
    /// Hostname of the known master
    leader: Option<String>,
    /// Local role
    role: LocalRole,
    /// Whether this node may self-promote
    self_eligible: bool,
}

impl ClusterState {
    /// Create the state for a freshly started node
    pub fn new(local: NodeRecord) -> Self {
        let self_eligible = local.is_eligible;
        let mut local = local;
        local.is_master = false;

        Self {
            table: MembershipTable::new(local),
            leader: None,
            role: LocalRole::Unknown,
            self_eligible,
        }
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut MembershipTable {
        &mut self.table
    }

    /// Hostname of the known master, if any
    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    pub fn role(&self) -> LocalRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == LocalRole::Master
    }

    pub fn is_slave(&self) -> bool {
        self.role == LocalRole::Slave
    }

    pub fn self_eligible(&self) -> bool {
        self.self_eligible
    }

    pub fn hostname(&self) -> &str {
        &self.table.local().hostname
    }

    /// Run one full evaluation pass (a "tock").
    ///
    /// Order matters: pruning happens before leader discovery so a dead
    /// master cannot block promotion, and promotion happens before the
    /// conflict check.
    pub fn evaluate(&mut self, now: Instant, max_age: Duration, policy: ConflictPolicy) -> Evaluation {
        let mut eval = Evaluation::default();

        let followed = self.leader.clone();
        self.table.touch_local(now);
        eval.events.extend(self.table.prune(now, max_age, &mut self.leader));

        self.discover_leader(followed, &mut eval);
        self.try_promote(&mut eval);
        self.check_conflict(policy, &mut eval);

        eval
    }

    /// `followed` is the leader as it was before this pass pruned anything
    fn discover_leader(&mut self, followed: Option<String>, eval: &mut Evaluation) {
        if self.role == LocalRole::Master {
            return;
        }

        // A leader that vanished or stopped claiming mastership is forgotten
        let still_master = match &self.leader {
            Some(leader) => self.table.get(leader).map(|n| n.is_master).unwrap_or(false),
            None => true,
        };
        if !still_master {
            if let Some(leader) = self.leader.take() {
                tracing::info!("Master {} no longer claims leadership", leader);
            }
        }

        let master = self
            .table
            .peers()
            .filter(|n| n.is_master)
            .map(|n| n.hostname.as_str())
            .min()
            .map(str::to_string);

        match master {
            Some(master) => {
                if self.leader.as_deref() != Some(master.as_str()) {
                    tracing::info!("Following master {}", master);
                    self.leader = Some(master);

                    if self.role != LocalRole::Slave {
                        self.role = LocalRole::Slave;
                        eval.events.push(ClusterEvent::Slave);
                    }
                }
            }
            None => {
                if self.role == LocalRole::Slave && self.leader.is_none() {
                    tracing::info!(
                        "No master known (was following {}), returning to UNKNOWN",
                        followed.as_deref().unwrap_or("none")
                    );
                    self.role = LocalRole::Unknown;
                }
            }
        }
    }

    fn try_promote(&mut self, eval: &mut Evaluation) {
        if self.leader.is_some() || self.role == LocalRole::Master || !self.self_eligible {
            return;
        }

        let local = self.table.local().hostname.as_str();
        let preferred = self
            .table
            .peers()
            .filter(|n| n.is_eligible && n.hostname.as_str() < local)
            .map(|n| n.hostname.as_str())
            .min();

        if let Some(preferred) = preferred {
            tracing::debug!("Not promoting: {} has higher priority", preferred);
            return;
        }

        let hostname = local.to_string();
        tracing::info!("No master found, {} becoming MASTER", hostname);

        self.role = LocalRole::Master;
        self.table.local_mut().is_master = true;
        self.leader = Some(hostname);
        eval.events.push(ClusterEvent::Master);
        eval.rebroadcast = true;
    }

    fn check_conflict(&mut self, policy: ConflictPolicy, eval: &mut Evaluation) {
        if self.role != LocalRole::Master {
            return;
        }

        if !self.table.peers().any(|n| n.is_master) {
            return;
        }

        let local = self.table.local().hostname.clone();
        match conflict::resolve(&local, self.table.peers(), policy) {
            ConflictAction::KeepLeadership => {
                for rival in self.table.peers().filter(|n| n.is_master) {
                    tracing::warn!(
                        "Master conflict: {} also claims master, it is outranked by {}",
                        rival.hostname,
                        local
                    );
                }
            }
            ConflictAction::Relinquish { winner } => {
                tracing::warn!("Master conflict: {} outranks {}, stepping down", winner, local);
                self.relinquish(eval);
            }
            ConflictAction::Exit { winner } => {
                tracing::error!(
                    "Master conflict: {} outranks {}, exit_on_conflict is set",
                    winner,
                    local
                );
                eval.exit_requested = true;
            }
        }
    }

    /// Give up mastership without claiming it back in the same pass
    fn relinquish(&mut self, eval: &mut Evaluation) {
        self.role = LocalRole::Slave;
        self.table.local_mut().is_master = false;
        self.leader = None;
        eval.events.push(ClusterEvent::Slave);
        eval.rebroadcast = true;
    }
}
