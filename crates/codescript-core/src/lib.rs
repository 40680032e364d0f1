pub mod actions;
pub mod archive;
pub mod config;
pub mod decoder;
pub mod error;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod stats;
pub mod workspace;

pub use actions::*;
pub use reducer::*;
pub use state::*;

pub use error::*;
