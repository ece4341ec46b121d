//! Data types shared by the `volley` engine: run configuration, stage profiles, threshold
//! expressions, metric snapshots and the results a run hands back.
mod config;
mod constants;
mod data;
mod error;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use stats::*;
pub use threshold::*;
