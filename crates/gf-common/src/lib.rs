#![doc = "Common types shared across the grid-freq workspace."]

pub mod config;
pub mod edge;
pub mod error;
pub mod metrics;
pub mod state;
pub mod time;

pub use config::*;
pub use edge::*;
pub use error::*;
pub use metrics::*;
pub use state::*;
pub use time::*;
