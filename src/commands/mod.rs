pub mod mutations;
pub mod sync;

pub use mutations::*;
pub use sync::*;
