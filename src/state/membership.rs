//! Cluster Membership Table
//!
//! Tracks every node heard from on the broadcast segment, keyed by
//! hostname. The local node's own record lives beside the peer map so it
//! can never be pruned or replaced.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::state::{ClusterEvent, UserData};

/// State of a single node as last reported by that node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    /// Unique node identifier and election rank (lower wins)
    pub hostname: String,
    /// Advertised network address
    pub address: String,
    /// Node claims to be master
    pub is_master: bool,
    /// Node may become master
    pub is_eligible: bool,
    /// This is the local node's own record
    pub is_self: bool,
    /// Last heartbeat time; `None` once the record was marked stale (not serialized)
    #[serde(skip)]
    pub last_seen: Option<Instant>,
    /// Uptime reported by the node
    pub uptime_seconds: u64,
    /// Exempt from staleness pruning
    pub locked: bool,
    /// Opaque data published by the node
    pub data: UserData,
    /// When this record was first created
    pub first_seen: DateTime<Utc>,
}

impl NodeRecord {
    /// Create a record for a peer that was just heard from
    pub fn new(hostname: String, address: String) -> Self {
        Self {
            hostname,
            address,
            is_master: false,
            is_eligible: false,
            is_self: false,
            last_seen: Some(Instant::now()),
            uptime_seconds: 0,
            locked: false,
            data: UserData::empty(),
            first_seen: Utc::now(),
        }
    }

    /// Check whether the record has been heard from within `max_age` of `now`
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_duration_since(seen) <= max_age,
            None => false,
        }
    }

    /// Time since the last heartbeat, if the record is not marked stale
    pub fn since_seen(&self, now: Instant) -> Option<Duration> {
        self.last_seen.map(|seen| now.saturating_duration_since(seen))
    }
}

/// Membership table: the local record plus every known peer
#[derive(Debug)]
pub struct MembershipTable {
    /// This node's record
    local: NodeRecord,
    /// Peers keyed by hostname (never contains the local hostname)
    peers: HashMap<String, NodeRecord>,
}

impl MembershipTable {
    /// Create a table holding only the local node
    pub fn new(mut local: NodeRecord) -> Self {
        local.is_self = true;
        Self {
            local,
            peers: HashMap::new(),
        }
    }

    /// The local node's record
    pub fn local(&self) -> &NodeRecord {
        &self.local
    }

    pub(crate) fn local_mut(&mut self) -> &mut NodeRecord {
        &mut self.local
    }

    /// Look up any record, local included
    pub fn get(&self, hostname: &str) -> Option<&NodeRecord> {
        if hostname == self.local.hostname {
            Some(&self.local)
        } else {
            self.peers.get(hostname)
        }
    }

    /// All peer records (excluding self)
    pub fn peers(&self) -> impl Iterator<Item = &NodeRecord> {
        self.peers.values()
    }

    /// All records including self
    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        std::iter::once(&self.local).chain(self.peers.values())
    }

    /// Number of records including self
    pub fn len(&self) -> usize {
        self.peers.len() + 1
    }

    /// Copy of every record, ordered by hostname
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let mut nodes: Vec<NodeRecord> = self.records().cloned().collect();
        nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        nodes
    }

    /// Refresh the local record; self is always live
    pub fn touch_local(&mut self, now: Instant) {
        self.local.last_seen = Some(now);
    }

    /// Insert or fully replace a peer record.
    ///
    /// Returns an `AddServer` event when the hostname was not known before.
    /// The local-only `locked` flag and `first_seen` survive replacement.
    pub fn upsert(&mut self, mut record: NodeRecord, now: Instant) -> Option<ClusterEvent> {
        if record.hostname == self.local.hostname {
            tracing::trace!("Ignoring record claiming local hostname {}", record.hostname);
            return None;
        }

        record.is_self = false;
        record.last_seen = Some(now);

        match self.peers.get(&record.hostname) {
            Some(existing) => {
                record.locked = existing.locked;
                record.first_seen = existing.first_seen;
                self.peers.insert(record.hostname.clone(), record);
                None
            }
            None => {
                tracing::info!(
                    "New node {} at {} (master: {}, eligible: {})",
                    record.hostname,
                    record.address,
                    record.is_master,
                    record.is_eligible
                );
                self.peers.insert(record.hostname.clone(), record.clone());
                Some(ClusterEvent::AddServer(record))
            }
        }
    }

    /// Expire a peer immediately so the next prune removes it.
    /// Returns false if the hostname is unknown or is the local node.
    pub fn mark_stale(&mut self, hostname: &str) -> bool {
        match self.peers.get_mut(hostname) {
            Some(node) => {
                node.last_seen = None;
                true
            }
            None => false,
        }
    }

    /// Remove every unlocked peer not heard from within `max_age`.
    ///
    /// Clears `leader` when the leader is among the removed records and
    /// returns one `DeleteServer` event per removal.
    pub fn prune(
        &mut self,
        now: Instant,
        max_age: Duration,
        leader: &mut Option<String>,
    ) -> Vec<ClusterEvent> {
        let expired: Vec<String> = self
            .peers
            .values()
            .filter(|node| !node.locked && !node.is_fresh(now, max_age))
            .map(|node| node.hostname.clone())
            .collect();

        let mut events = Vec::with_capacity(expired.len());
        for hostname in expired {
            let Some(node) = self.peers.remove(&hostname) else {
                continue;
            };

            tracing::info!(
                "Removing node {} (last seen: {})",
                hostname,
                node.since_seen(now)
                    .map(|d| format!("{}s ago", d.as_secs()))
                    .unwrap_or_else(|| "departed".to_string())
            );

            if leader.as_deref() == Some(hostname.as_str()) {
                tracing::info!("Removed node {} was the master", hostname);
                *leader = None;
            }

            events.push(ClusterEvent::DeleteServer(node));
        }

        events
    }

    /// Exempt a record from pruning (or lift the exemption)
    pub fn set_locked(&mut self, hostname: &str, locked: bool) -> Result<()> {
        if hostname == self.local.hostname {
            // Self is never pruned regardless
            return Ok(());
        }

        let node = self
            .peers
            .get_mut(hostname)
            .ok_or_else(|| Error::NodeNotFound(hostname.to_string()))?;
        node.locked = locked;
        tracing::info!("Node {} {}", hostname, if locked { "locked" } else { "unlocked" });
        Ok(())
    }
}
