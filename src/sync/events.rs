use serde::{Deserialize, Serialize};

/// Why a drain was requested. Sent over the trigger channel to the
/// scheduler; the engine decides whether anything actually happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Process start with a non-empty queue
    Startup,
    /// A local mutation was committed
    MutationCommitted,
    /// Platform connectivity went from offline to online
    Reconnected,
    /// Explicit user request ("sync now")
    Requested,
}

/// Outcome of a drain pass, broadcast for presentation only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotification {
    Synced {
        records: usize,
    },
    /// "Saved locally, not yet synced"
    Failed {
        applied: usize,
        pending: usize,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadyRunning,
    EmptyQueue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Synced {
        records: usize,
    },
    /// The pass stopped at the first failing record. `applied` records
    /// reached the remote store, but all `pending` records stay queued.
    Failed {
        applied: usize,
        pending: usize,
        error: String,
    },
}

impl DrainOutcome {
    pub fn notification(&self) -> Option<SyncNotification> {
        match self {
            DrainOutcome::Skipped(_) => None,
            DrainOutcome::Synced { records } => Some(SyncNotification::Synced { records: *records }),
            DrainOutcome::Failed {
                applied,
                pending,
                error,
            } => Some(SyncNotification::Failed {
                applied: *applied,
                pending: *pending,
                error: error.clone(),
            }),
        }
    }
}
