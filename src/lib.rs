//! Local-first sync engine for a trading journal.
//!
//! Every mutation commits to a local SQLite store and a durable queue
//! before anything touches the network; a background loop replays the
//! queue against the remote system of record whenever connectivity and
//! triggers allow.

pub mod api;
pub mod calculator;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod journal;
pub mod models;
pub mod projection;
pub mod sync;

#[cfg(test)]
mod test_helpers;

pub use api::{HttpRemoteStore, InMemoryRemoteStore, RemoteStore};
pub use config::{EngineConfig, RemoteConfig};
pub use error::{JournalError, JournalResult};
pub use journal::TradingJournal;
pub use models::{Entity, EntityType};
pub use projection::ReadModel;
pub use sync::{ConnectivityState, DrainOutcome, SyncNotification};
