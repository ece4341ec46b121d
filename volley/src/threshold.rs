//! Pass/fail evaluation of thresholds against the run's metrics.
use crate::registry::MetricRegistry;
use std::collections::HashMap;
use volley_core::{MetricSnapshot, RunVerdict, Threshold, ThresholdOutcome};

/// Evaluate every threshold against the current state of `registry`.
///
/// Read-only: evaluating twice without new observations gives the same verdict.
pub fn evaluate(thresholds: &[Threshold], registry: &MetricRegistry) -> RunVerdict {
    let mut snapshots: HashMap<&str, Option<MetricSnapshot>> = HashMap::new();
    let outcomes = thresholds
        .iter()
        .map(|threshold| {
            let snapshot = snapshots
                .entry(threshold.metric())
                .or_insert_with(|| registry.snapshot(threshold.metric()));
            ThresholdOutcome::evaluate(threshold, snapshot.as_ref())
        })
        .collect();

    RunVerdict::from_outcomes(outcomes)
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdEvaluator {
    thresholds: Vec<Threshold>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn has_abort_thresholds(&self) -> bool {
        self.thresholds.iter().any(Threshold::aborts_on_fail)
    }

    pub fn evaluate(&self, registry: &MetricRegistry) -> RunVerdict {
        evaluate(&self.thresholds, registry)
    }

    /// The first failing abort-on-fail threshold, if any.
    pub fn abort_breach(&self, registry: &MetricRegistry) -> Option<ThresholdOutcome> {
        self.thresholds
            .iter()
            .filter(|t| t.aborts_on_fail())
            .map(|t| ThresholdOutcome::evaluate(t, registry.snapshot(t.metric()).as_ref()))
            .find(|outcome| !outcome.passed)
    }
}
