pub mod connectivity;
pub mod engine;
pub mod events;
pub mod scheduler;

pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use engine::SyncEngine;
pub use events::{DrainOutcome, SkipReason, SyncNotification, SyncTrigger};
pub use scheduler::SyncScheduler;
