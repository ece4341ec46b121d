use crate::MetricKind;
use std::time::Duration;

/// How often the run controller reconciles the VU pool against the stage profile.
pub const DEFAULT_CONTROL_INTERVAL: Duration = Duration::from_millis(100);

/// Abort-on-fail thresholds are re-evaluated at most this often.
pub const ABORT_EVALUATION_INTERVAL: Duration = Duration::from_secs(1);

/// Exit code a CLI wrapper should use when thresholds fail (matches k6).
pub const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

/// Pass rate over every check outcome.
pub const CHECKS: &str = "checks";
/// Rate of failed checks (`true` when a check did not pass).
pub const FAILURES: &str = "failures";
/// Wall time of each iteration, in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Rate of failed iterations: a failed status, a failed check, an error or a panic.
pub const ITERATION_FAILED: &str = "iteration_failed";
/// Rate of iterations where the scenario returned an error or panicked.
pub const ITERATION_ERRORS: &str = "iteration_errors";
/// Duration of each transaction, in milliseconds.
pub const REQ_DURATION: &str = "req_duration";
/// Rate of transactions that returned an error.
pub const REQ_FAILED: &str = "req_failed";

pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (CHECKS, MetricKind::Rate),
    (FAILURES, MetricKind::Rate),
    (ITERATION_DURATION, MetricKind::Trend),
    (ITERATION_FAILED, MetricKind::Rate),
    (ITERATION_ERRORS, MetricKind::Rate),
    (REQ_DURATION, MetricKind::Trend),
    (REQ_FAILED, MetricKind::Rate),
];

/// Name of the per-check pass-rate metric, e.g. `checks{status is 200}`.
pub fn check_metric(check: &str) -> String {
    format!("{CHECKS}{{{check}}}")
}

/// Name of the per-transaction duration metric, e.g. `req_duration{get_health}`.
pub fn transaction_metric(transaction: &str) -> String {
    format!("{REQ_DURATION}{{{transaction}}}")
}

/// Resolve the kind of a built-in metric or one of its tagged sub-metrics.
pub fn builtin_kind(name: &str) -> Option<MetricKind> {
    let base = match name.split_once('{') {
        Some((base, tag)) if tag.ends_with('}') => base,
        Some(_) => return None,
        None => name,
    };

    BUILTIN_METRICS
        .iter()
        .find(|(builtin, _)| *builtin == base)
        .map(|(_, kind)| *kind)
}
