pub mod connection;
pub mod migration_runner;
pub mod queue;
pub mod store;
pub mod sync_history;

pub use connection::Database;
pub use queue::MutationQueue;
pub use store::LocalStore;
