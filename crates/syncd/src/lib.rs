pub mod probe;
pub mod state;
