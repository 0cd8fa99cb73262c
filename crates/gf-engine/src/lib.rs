#![doc = "Frequency measurement engine: turns timestamped edges into drift-corrected estimates."]

pub mod calibrator;
pub mod debounce;
pub mod engine;
pub mod estimator;
pub mod history;
pub mod store;

pub use calibrator::*;
pub use debounce::*;
pub use engine::*;
pub use estimator::*;
pub use history::*;
pub use store::*;
