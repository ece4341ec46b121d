//! The pool of virtual users and their lifecycles.
use crate::registry::MetricRegistry;
use crate::scenario::Scenario;
use crate::transaction::{TransactionData, TRANSACTION_HOOK};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};
use volley_core::{VuReport, VuState};

mod vu;

use vu::{Vu, VuShared};

struct VuHandle {
    id: u64,
    shared: Arc<VuShared>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl VuHandle {
    fn stop(&self) {
        self.shared.request_stop();
        self.token.cancel();
    }

    fn report(&self) -> VuReport {
        self.shared.report(self.id)
    }
}

/// Owns every VU of a run. Only the run controller resizes it.
pub(crate) struct VuPool<S> {
    scenario: Arc<S>,
    registry: Arc<MetricRegistry>,
    pacing: Duration,
    stop: CancellationToken,
    active: Vec<VuHandle>,
    /// Signalled to stop but possibly still finishing an iteration.
    retiring: Vec<VuHandle>,
    finished: Vec<VuReport>,
    next_id: u64,
    peak: u64,
}

impl<S: Scenario> VuPool<S> {
    pub fn new(
        scenario: Arc<S>,
        registry: Arc<MetricRegistry>,
        pacing: Duration,
        stop: CancellationToken,
    ) -> Self {
        Self {
            scenario,
            registry,
            pacing,
            stop,
            active: vec![],
            retiring: vec![],
            finished: vec![],
            next_id: 0,
            peak: 0,
        }
    }

    pub fn set_concurrency(&mut self, concurrency: u64) {
        let current = self.concurrency();
        if current == concurrency {
            return;
        } else if current > concurrency {
            // NOTE: Newest VUs are retired first.
            for handle in self.active.drain(concurrency as usize..).rev() {
                handle.stop();
                self.retiring.push(handle);
            }
        } else {
            while self.concurrency() < concurrency {
                self.spawn();
            }
        }

        self.peak = self.peak.max(concurrency);
        self.reap();

        #[cfg(feature = "metrics")]
        metrics::gauge!("volley_vus").set(concurrency as f64);
    }

    pub fn concurrency(&self) -> u64 {
        self.active.len() as u64
    }

    pub fn peak(&self) -> u64 {
        self.peak
    }

    /// States of the VUs currently counted towards the concurrency.
    #[cfg(test)]
    pub fn states(&self) -> Vec<VuState> {
        self.active.iter().map(|h| h.shared.state()).collect()
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let shared = Arc::new(VuShared::new());
        let token = self.stop.child_token();
        let vu = Vu {
            id,
            scenario: self.scenario.clone(),
            registry: self.registry.clone(),
            shared: shared.clone(),
            token: token.clone(),
            pacing: self.pacing,
        };

        let hook = TransactionData::new(self.registry.clone());
        let task = tokio::spawn(
            TRANSACTION_HOOK
                .scope(hook, vu.run())
                .instrument(tracing::debug_span!("vu", id)),
        );

        self.active.push(VuHandle {
            id,
            shared,
            token,
            task,
        });
    }

    fn reap(&mut self) {
        let (done, retiring) = self
            .retiring
            .drain(..)
            .partition::<Vec<_>, _>(|h| h.task.is_finished());
        self.retiring = retiring;
        self.finished.extend(done.iter().map(VuHandle::report));
    }

    /// Stop every VU and wait for them to finish their in-flight iteration.
    ///
    /// With a `graceful_stop` bound, VUs still running once it elapses are aborted.
    pub async fn shutdown(mut self, graceful_stop: Option<Duration>) -> Vec<VuReport> {
        self.set_concurrency(0);
        self.stop.cancel();

        let deadline = graceful_stop.map(|d| Instant::now() + d);
        for mut handle in self.retiring.drain(..) {
            let res = match deadline {
                Some(deadline) => match timeout_at(deadline, &mut handle.task).await {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(
                            "VU {} did not finish its iteration within the graceful stop period; aborting.",
                            handle.id
                        );
                        handle.task.abort();
                        (&mut handle.task).await
                    }
                },
                None => (&mut handle.task).await,
            };

            if let Err(err) = res {
                if !err.is_cancelled() {
                    error!("VU {} task failed: {err}", handle.id);
                }
            }

            handle.shared.mark_stopped();
            self.finished.push(handle.report());
        }

        let mut reports = std::mem::take(&mut self.finished);
        reports.sort_by_key(|r| r.id);
        reports
    }
}
