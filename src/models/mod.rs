pub mod account;
pub mod entity;
pub mod mutation;
pub mod note;
pub mod settings;
pub mod sync_history;
pub mod trade;

pub use account::*;
pub use entity::*;
pub use mutation::*;
pub use note::*;
pub use settings::*;
pub use sync_history::*;
pub use trade::*;
