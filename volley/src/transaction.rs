use crate::registry::{report, MetricRegistry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use volley_core::{transaction_metric, REQ_DURATION, REQ_FAILED};

/// Transaction hook used by the `#[transaction]` macro.
///
/// Times `func` and records the result into the running VU's metrics: `req_duration` and
/// `req_duration{<name>}` in milliseconds, and `req_failed` for `Err` results. Outside of a
/// load test the future simply runs.
pub async fn transaction_hook<T, R, E>(name: &str, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    if let Ok(hook) = TRANSACTION_HOOK.try_with(|v| v.clone()) {
        let (res, elapsed) = timed(func).await;
        hook.record(name, elapsed, res.is_ok());
        res
    } else {
        tracing::trace!("No hook available for transaction `{name}`.");
        func.await
    }
}

/// Await `func`, returning its output along with how long it took.
pub async fn timed<T: Future>(func: T) -> (T::Output, Duration) {
    let start = Instant::now();
    let res = func.await;
    (res, start.elapsed())
}

#[derive(Clone)]
pub(crate) struct TransactionData {
    registry: Arc<MetricRegistry>,
}

impl TransactionData {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    fn record(&self, name: &str, elapsed: Duration, success: bool) {
        report(self.registry.record_duration(REQ_DURATION, elapsed));
        report(
            self.registry
                .record_duration(&transaction_metric(name), elapsed),
        );
        report(self.registry.record_rate(REQ_FAILED, !success));
    }
}

tokio::task_local! {
    pub(crate) static TRANSACTION_HOOK: TransactionData;
}

#[cfg(test)]
mod tests {
    use super::*;
    use volley_core::{Aggregation, MetricSnapshot, RateSnapshot};

    async fn get_data(delay_ms: u64, fail: bool) -> Result<&'static str, &'static str> {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if fail {
            Err("503")
        } else {
            Ok(r#"{"status":"success"}"#)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn records_into_scoped_registry() {
        let registry = Arc::new(MetricRegistry::with_builtins());
        let data = TransactionData::new(registry.clone());

        TRANSACTION_HOOK
            .scope(data, async {
                assert!(transaction_hook("get_data", get_data(120, false)).await.is_ok());
                assert!(transaction_hook("get_data", get_data(80, true)).await.is_err());
                assert!(transaction_hook("health", get_data(5, false)).await.is_ok());
            })
            .await;

        let duration = registry.snapshot(REQ_DURATION).unwrap();
        assert_eq!(duration.count(), 3);
        assert_eq!(duration.aggregate(Aggregation::Max), Some(120.));
        assert_eq!(duration.aggregate(Aggregation::Min), Some(5.));

        let per_name = registry.snapshot(&transaction_metric("get_data")).unwrap();
        assert_eq!(per_name.aggregate(Aggregation::Avg), Some(100.));

        assert_eq!(
            registry.snapshot(REQ_FAILED),
            Some(MetricSnapshot::Rate(RateSnapshot {
                success: 1,
                total: 3
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn runs_without_a_hook() {
        assert_eq!(
            transaction_hook("get_data", get_data(1, true)).await,
            Err("503")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timed_measures_wall_time() {
        let (res, elapsed) = timed(get_data(250, false)).await;
        assert!(res.is_ok());
        assert_eq!(elapsed, Duration::from_millis(250));
    }
}
