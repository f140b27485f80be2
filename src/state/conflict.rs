//! Master Conflict Resolution
//!
//! Decides what a master does when it sees another node also claiming
//! mastership. Only the outranked side gives way: the node with the lower
//! hostname keeps leadership, every other claimant steps down (or exits,
//! when configured to).

use crate::state::NodeRecord;

/// What to do when outranked by another master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Step down to slave and let the next evaluation recompute the winner
    Relinquish,
    /// Request host process shutdown
    Exit,
}

impl ConflictPolicy {
    pub fn from_exit_flag(exit_on_conflict: bool) -> Self {
        if exit_on_conflict {
            ConflictPolicy::Exit
        } else {
            ConflictPolicy::Relinquish
        }
    }
}

/// Outcome of a conflict check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictAction {
    /// No rival outranks us; rivals are expected to step down themselves
    KeepLeadership,
    /// Step down in favour of `winner`
    Relinquish { winner: String },
    /// Shut the process down; `winner` outranks us
    Exit { winner: String },
}

/// Resolve a conflict between the local master and rival master claims
pub fn resolve<'a>(
    local_hostname: &str,
    rivals: impl IntoIterator<Item = &'a NodeRecord>,
    policy: ConflictPolicy,
) -> ConflictAction {
    let winner = rivals
        .into_iter()
        .filter(|rival| rival.is_master && rival.hostname.as_str() < local_hostname)
        .map(|rival| rival.hostname.as_str())
        .min();

    match (winner, policy) {
        (None, _) => ConflictAction::KeepLeadership,
        (Some(winner), ConflictPolicy::Relinquish) => ConflictAction::Relinquish {
            winner: winner.to_string(),
        },
        (Some(winner), ConflictPolicy::Exit) => ConflictAction::Exit {
            winner: winner.to_string(),
        },
    }
}
