use crate::{MetricSnapshot, Threshold, VuReport, THRESHOLDS_FAILED_EXIT_CODE};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Result of checking one threshold against a metric snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    /// The aggregated value, `None` when the metric had no data.
    pub actual: Option<f64>,
    pub passed: bool,
}

impl ThresholdOutcome {
    /// A metric without observations passes vacuously; there is nothing to exceed.
    pub fn evaluate(threshold: &Threshold, snapshot: Option<&MetricSnapshot>) -> Self {
        let expr = threshold.expr();
        let actual = match snapshot {
            Some(snapshot) => snapshot.aggregate(expr.aggregation),
            None if expr.aggregation == crate::Aggregation::Count => Some(0.),
            None => None,
        };

        let passed = actual.map_or(true, |actual| expr.comparator.compare(actual, expr.bound));

        Self {
            threshold: threshold.clone(),
            actual,
            passed,
        }
    }
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "✓" } else { "✗" };
        match self.actual {
            Some(actual) => write!(f, "{mark} {} (actual={actual:.4})", self.threshold),
            None => write!(f, "{mark} {} (no data)", self.threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunVerdict {
    pub passed: bool,
    /// Every failed threshold, in declaration order.
    pub failed_thresholds: Vec<Threshold>,
    pub outcomes: Vec<ThresholdOutcome>,
    /// Set when an abort-on-fail threshold ended the run early.
    pub aborted: bool,
}

impl RunVerdict {
    pub fn from_outcomes(outcomes: Vec<ThresholdOutcome>) -> Self {
        let mut verdict = Self {
            passed: true,
            failed_thresholds: vec![],
            outcomes,
            aborted: false,
        };
        verdict.collect_failures();
        verdict
    }

    /// Mark the run as ended by `breach`.
    ///
    /// The breach is kept even if iterations that completed after it brought the metric back
    /// within bounds, so an aborted run never passes.
    pub fn aborted_by(mut self, breach: ThresholdOutcome) -> Self {
        match self
            .outcomes
            .iter_mut()
            .find(|o| o.threshold == breach.threshold)
        {
            Some(outcome) if outcome.passed => *outcome = breach,
            Some(_) => {}
            None => self.outcomes.push(breach),
        }

        self.aborted = true;
        self.collect_failures();
        self
    }

    fn collect_failures(&mut self) {
        self.failed_thresholds = self
            .outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.clone())
            .collect();
        self.passed = self.failed_thresholds.is_empty();
    }
}

/// Everything a load test reports once it has finished.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub name: String,
    pub verdict: RunVerdict,
    pub metrics: BTreeMap<String, MetricSnapshot>,
    pub peak_vus: u64,
    /// Completed iterations across every VU.
    pub iterations: u64,
    pub elapsed: Duration,
    /// The run was stopped externally before the stage profile completed.
    pub interrupted: bool,
    pub vus: Vec<VuReport>,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    /// Process exit code following the k6 convention.
    pub fn exit_code(&self) -> i32 {
        if self.verdict.passed {
            0
        } else {
            THRESHOLDS_FAILED_EXIT_CODE
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} iterations, peak {} VUs, {}",
            self.name,
            self.iterations,
            self.peak_vus,
            humantime::format_duration(round_to_millis(self.elapsed))
        )?;

        if self.interrupted {
            writeln!(f, "  interrupted before the stage profile completed")?;
        }
        if self.verdict.aborted {
            writeln!(f, "  aborted by a failing threshold")?;
        }

        for (name, snapshot) in &self.metrics {
            writeln!(f, "  {name:.<32} {snapshot}")?;
        }

        for outcome in &self.verdict.outcomes {
            writeln!(f, "  {outcome}")?;
        }

        Ok(())
    }
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
