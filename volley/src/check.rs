use crate::registry::{self, MetricRegistry};
use std::fmt;
use volley_core::{check_metric, CheckOutcome, CHECKS, FAILURES};

/// Evaluate a named assertion against `value`.
///
/// A predicate returning `Err` is a failed check, never an iteration error.
///
/// # Example
/// ```
/// use volley::prelude::*;
///
/// let outcome = check("status is 200", &200u16, |status| Ok::<_, String>(*status == 200));
/// assert!(outcome.passed);
/// ```
pub fn check<T, E, P>(name: impl Into<String>, value: &T, predicate: P) -> CheckOutcome
where
    T: ?Sized,
    E: fmt::Display,
    P: FnOnce(&T) -> Result<bool, E>,
{
    CheckOutcome::evaluate(name, value, predicate)
}

/// Routes check outcomes into the run's Rate metrics.
pub(crate) struct CheckRunner<'a> {
    registry: &'a MetricRegistry,
}

impl<'a> CheckRunner<'a> {
    pub fn new(registry: &'a MetricRegistry) -> Self {
        Self { registry }
    }

    /// Records every outcome into `checks`, `checks{<name>}` and `failures`. Returns whether
    /// all of them passed.
    pub fn record(&self, outcomes: &[CheckOutcome]) -> bool {
        let mut all_passed = true;
        for outcome in outcomes {
            registry::report(self.registry.record_rate(CHECKS, outcome.passed));
            registry::report(
                self.registry
                    .record_rate(&check_metric(&outcome.name), outcome.passed),
            );
            registry::report(self.registry.record_rate(FAILURES, !outcome.passed));
            all_passed &= outcome.passed;
        }
        all_passed
    }
}
