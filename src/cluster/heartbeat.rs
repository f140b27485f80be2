//! Heartbeat emission and the periodic tick/tock loops

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use super::ClusterManager;
use crate::network::{Heartbeat, Message};
use crate::state::ClusterState;

/// Snapshot the local record for broadcast, recording the current uptime
pub(crate) fn snapshot(state: &mut ClusterState, uptime: u64) -> Heartbeat {
    let is_master = state.is_master();
    let eligible = state.self_eligible();

    let local = state.table_mut().local_mut();
    local.uptime_seconds = uptime;

    Heartbeat {
        hostname: local.hostname.clone(),
        ip: local.address.clone(),
        master: is_master,
        eligible,
        uptime,
        data: local.data.clone(),
    }
}

impl ClusterManager {
    /// Broadcast one heartbeat (a "tick"). No-op once shutdown has begun.
    pub async fn tick(&self) {
        if self.is_shutting_down() {
            return;
        }

        let uptime = self.uptime().as_secs();
        let heartbeat = {
            let mut state = self.state.write().await;
            snapshot(&mut state, uptime)
        };

        tracing::trace!(
            "Heartbeat: master={} eligible={} uptime={}s",
            heartbeat.master,
            heartbeat.eligible,
            heartbeat.uptime
        );
        self.send(&Message::Heartbeat(heartbeat)).await;
    }
}

/// Tick loop: fires immediately, then every heartbeat interval
pub(crate) async fn run_ticks(manager: Arc<ClusterManager>, mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }

    let mut ticker = interval(manager.options.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => manager.tick().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Heartbeat loop stopped");
}

/// Tock loop: first evaluation one tock interval after start
pub(crate) async fn run_tocks(manager: Arc<ClusterManager>, mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }

    let period = manager.options.tock_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => manager.tock().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Election loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NodeRecord, UserData};

    #[tokio::test]
    async fn test_snapshot_reflects_local_state() {
        let mut local = NodeRecord::new("node-1".to_string(), "10.1.1.1".to_string());
        local.is_eligible = true;
        local.data = UserData::from_json(r#"{"shard":2}"#, 64).unwrap();
        let mut state = ClusterState::new(local);

        let hb = snapshot(&mut state, 17);
        assert_eq!(hb.hostname, "node-1");
        assert_eq!(hb.ip, "10.1.1.1");
        assert!(!hb.master);
        assert!(hb.eligible);
        assert_eq!(hb.uptime, 17);
        assert_eq!(hb.data.as_str(), r#"{"shard":2}"#);
        assert_eq!(state.table().local().uptime_seconds, 17);

        state.evaluate(
            Instant::now(),
            std::time::Duration::from_secs(60),
            crate::state::ConflictPolicy::Relinquish,
        );
        assert!(snapshot(&mut state, 18).master);
    }
}
