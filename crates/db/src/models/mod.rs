pub mod achievement;
pub mod task;

pub use achievement::*;
pub use task::*;
