pub mod read_model;

pub use read_model::{AccountView, PendingEntity, ProjectionState, ReadModel, ReadModelProjector};
