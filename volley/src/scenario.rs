//! The user-supplied unit of work a virtual user runs in a loop.
use crate::registry::{self, MetricRegistry};
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use volley_core::{IterationError, IterationResult};

/// A load test scenario.
///
/// Every virtual user calls [`Scenario::iterate`] repeatedly, concurrently with every other
/// virtual user, until it is told to stop. Any `async` closure or function taking a
/// [`VuContext`] and returning `Result<IterationResult, E>` is a scenario.
///
/// # Example
/// ```no_run
/// use volley::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let summary = load_test("health", |_ctx: VuContext| async move {
///         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
///         Ok::<_, anyhow::Error>(IterationResult::passed())
///     })
///     .stage(std::time::Duration::from_secs(30), 10)
///     .await?;
///
///     std::process::exit(summary.exit_code());
/// }
/// ```
pub trait Scenario: Send + Sync + 'static {
    fn iterate(
        &self,
        ctx: VuContext,
    ) -> impl Future<Output = Result<IterationResult, IterationError>> + Send;
}

impl<F, Fut, E> Scenario for F
where
    F: Fn(VuContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<IterationResult, E>> + Send,
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    fn iterate(
        &self,
        ctx: VuContext,
    ) -> impl Future<Output = Result<IterationResult, IterationError>> + Send {
        let fut = self(ctx);
        async move { fut.await.map_err(IterationError::failed) }
    }
}

/// Per-iteration handle given to the scenario.
#[derive(Clone, Debug)]
pub struct VuContext {
    vu_id: u64,
    iteration: u64,
    registry: Arc<MetricRegistry>,
}

impl VuContext {
    pub(crate) fn new(vu_id: u64, iteration: u64, registry: Arc<MetricRegistry>) -> Self {
        Self {
            vu_id,
            iteration,
            registry,
        }
    }

    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// Zero-based index of this iteration within its VU.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Record into a custom Rate metric. Misuse is logged, not returned.
    pub fn record_rate(&self, name: &str, value: bool) {
        registry::report(self.registry.record_rate(name, value));
    }

    /// Record into a custom Trend metric. Misuse is logged, not returned.
    pub fn record_trend(&self, name: &str, value: f64) {
        registry::report(self.registry.record_trend(name, value));
    }

    /// Record a duration, in milliseconds, into a custom Trend metric.
    pub fn record_duration(&self, name: &str, duration: Duration) {
        registry::report(self.registry.record_duration(name, duration));
    }
}
