#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod check;
pub mod registry;
pub mod scenario;
pub mod stages;
pub mod threshold;
#[doc(hidden)]
pub mod transaction;

pub(crate) mod executor;
pub(crate) mod timer;

pub use load_test::{load_test, ConfigurableLoadTest, LoadTest};
pub use registry::MetricRegistry;
pub use scenario::{Scenario, VuContext};
pub use transaction::timed;
pub use volley_core::*;
pub use volley_macros::transaction;

pub mod prelude {
    pub use crate::check::check;
    pub use crate::load_test::{load_test, ConfigurableLoadTest};
    pub use crate::scenario::{Scenario, VuContext};
    pub use crate::transaction::timed;
    pub use volley_macros::transaction;

    pub use volley_core::{
        CheckOutcome, ConfigurationError, IterationError, IterationResult, MetricKind,
        RunConfig, RunSummary, Stage, Status,
    };
    pub use tokio_util::sync::CancellationToken;
}
