use crate::check::CheckRunner;
use crate::registry::{report, MetricRegistry};
use crate::scenario::{Scenario, VuContext};
use arc_swap::ArcSwapOption;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use volley_core::{
    IterationError, IterationResult, IterationSummary, Status, VuReport, VuState,
    ITERATION_DURATION, ITERATION_ERRORS, ITERATION_FAILED,
};

/// State a VU shares with the pool that owns it.
pub(crate) struct VuShared {
    state: AtomicU8,
    iterations: AtomicU64,
    last_iteration: ArcSwapOption<IterationSummary>,
}

impl VuShared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(VuState::Idle.as_u8()),
            iterations: AtomicU64::new(0),
            last_iteration: ArcSwapOption::empty(),
        }
    }

    pub fn state(&self) -> VuState {
        VuState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: VuState, to: VuState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Ask the VU to stop after its in-flight iteration. A VU that has not started yet still
    /// runs one iteration.
    pub fn request_stop(&self) {
        self.transition(VuState::Running, VuState::Stopping);
    }

    pub fn mark_stopped(&self) {
        self.state.store(VuState::Stopped.as_u8(), Ordering::SeqCst);
    }

    pub fn report(&self, id: u64) -> VuReport {
        VuReport {
            id,
            state: self.state(),
            iterations: self.iterations.load(Ordering::SeqCst),
            last_iteration: self.last_iteration.load_full().map(|s| *s),
        }
    }
}

pub(crate) struct Vu<S> {
    pub id: u64,
    pub scenario: Arc<S>,
    pub registry: Arc<MetricRegistry>,
    pub shared: Arc<VuShared>,
    pub token: CancellationToken,
    pub pacing: Duration,
}

impl<S: Scenario> Vu<S> {
    pub async fn run(self) {
        self.shared.transition(VuState::Idle, VuState::Running);
        trace!("VU {} running", self.id);

        let mut iteration = 0;
        loop {
            let ctx = VuContext::new(self.id, iteration, self.registry.clone());

            let start = Instant::now();
            let outcome = AssertUnwindSafe(self.scenario.iterate(ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(IterationError::Panicked(panic_message(panic))));
            let elapsed = start.elapsed();

            let summary = self.record(iteration, outcome, elapsed);
            self.shared.last_iteration.store(Some(Arc::new(summary)));
            self.shared.iterations.fetch_add(1, Ordering::SeqCst);
            iteration += 1;

            if self.pacing.is_zero() {
                // NOTE: Scenarios that never yield would otherwise starve the controller.
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }

            if self.token.is_cancelled() {
                break;
            }
        }

        self.shared.transition(VuState::Running, VuState::Stopping);
        trace!("VU {} stopped after {iteration} iterations", self.id);
        self.shared.mark_stopped();
    }

    fn record(
        &self,
        iteration: u64,
        outcome: Result<IterationResult, IterationError>,
        elapsed: Duration,
    ) -> IterationSummary {
        match outcome {
            Ok(mut result) => {
                if result.duration.is_zero() {
                    result.duration = elapsed;
                }

                let checks_passed = CheckRunner::new(&self.registry).record(&result.checks);
                let status = if checks_passed {
                    result.status
                } else {
                    Status::Failed
                };
                trace!("VU {} iteration {iteration}: {status:?}", self.id);

                report(
                    self.registry
                        .record_duration(ITERATION_DURATION, result.duration),
                );
                report(self.registry.record_rate(ITERATION_ERRORS, false));
                report(
                    self.registry
                        .record_rate(ITERATION_FAILED, status == Status::Failed),
                );

                IterationSummary {
                    status,
                    duration: result.duration,
                }
            }
            Err(err) => {
                warn!("VU {} iteration {iteration}: {err}", self.id);

                report(self.registry.record_duration(ITERATION_DURATION, elapsed));
                report(self.registry.record_rate(ITERATION_ERRORS, true));
                report(self.registry.record_rate(ITERATION_FAILED, true));

                IterationSummary {
                    status: Status::Failed,
                    duration: elapsed,
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
