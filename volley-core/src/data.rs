use crate::Aggregation;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Relative slack for percentile ranks that land within float error of an integer.
const RANK_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKind {
    /// Ratio of `true` observations over all observations.
    Rate,
    /// Distribution statistics over numeric observations.
    Trend,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Trend => write!(f, "trend"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateSnapshot {
    pub success: u64,
    pub total: u64,
}

impl RateSnapshot {
    /// `None` until the first observation.
    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.success as f64 / self.total as f64)
        }
    }

    pub fn failures(&self) -> u64 {
        self.total - self.success
    }
}

/// Exact distribution of a Trend metric at the time of the snapshot.
///
/// Values are kept sorted ascending so that every statistic is a pure function of the
/// observation multiset, independent of arrival order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrendSnapshot {
    values: Vec<f64>,
}

impl TrendSnapshot {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.retain(|v| v.is_finite());
        values.sort_by(f64::total_cmp);
        Self { values }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.)
    }

    /// Nearest-rank percentile: `sorted[ceil(p/100 * count) - 1]`, clamped to the valid range.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let count = self.values.len();
        if count == 0 {
            return None;
        }

        // NOTE: `p * count` picks up rounding error (99.9 * 41000 is 40959.00000000001), so
        // shave a relative epsilon off before taking the ceiling.
        let exact = p * count as f64 / 100.;
        let rank = (exact * (1. - RANK_EPSILON)).ceil() as i64 - 1;
        let index = rank.clamp(0, count as i64 - 1) as usize;
        Some(self.values[index])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSnapshot {
    Rate(RateSnapshot),
    Trend(TrendSnapshot),
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSnapshot::Rate(_) => MetricKind::Rate,
            MetricSnapshot::Trend(_) => MetricKind::Trend,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            MetricSnapshot::Rate(rate) => rate.total,
            MetricSnapshot::Trend(trend) => trend.count() as u64,
        }
    }

    /// Value of `aggregation` over this snapshot.
    ///
    /// `None` when the metric has no observations yet (except `count`, which is then `0`) or
    /// when the aggregation does not apply to the metric's kind.
    pub fn aggregate(&self, aggregation: Aggregation) -> Option<f64> {
        match (self, aggregation) {
            (_, Aggregation::Count) => Some(self.count() as f64),
            (MetricSnapshot::Rate(rate), Aggregation::Rate) => rate.rate(),
            (MetricSnapshot::Trend(trend), Aggregation::Min) => trend.min(),
            (MetricSnapshot::Trend(trend), Aggregation::Max) => trend.max(),
            (MetricSnapshot::Trend(trend), Aggregation::Avg) => trend.avg(),
            (MetricSnapshot::Trend(trend), Aggregation::Med) => trend.med(),
            (MetricSnapshot::Trend(trend), Aggregation::Percentile(p)) => trend.percentile(p),
            _ => None,
        }
    }
}

impl fmt::Display for MetricSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSnapshot::Rate(rate) => match rate.rate() {
                Some(value) => write!(
                    f,
                    "{:.2}% ({}/{})",
                    value * 100.,
                    rate.success,
                    rate.total
                ),
                None => write!(f, "no data"),
            },
            MetricSnapshot::Trend(trend) => match (trend.avg(), trend.min(), trend.max()) {
                (Some(avg), Some(min), Some(max)) => write!(
                    f,
                    "avg={avg:.2} min={min:.2} med={:.2} max={max:.2} p(90)={:.2} p(95)={:.2} count={}",
                    trend.med().unwrap_or(0.),
                    trend.percentile(90.).unwrap_or(0.),
                    trend.percentile(95.).unwrap_or(0.),
                    trend.count(),
                ),
                _ => write!(f, "no data"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Passed,
    Failed,
}

impl From<bool> for Status {
    fn from(passed: bool) -> Self {
        if passed {
            Status::Passed
        } else {
            Status::Failed
        }
    }
}

/// A single named assertion evaluated against an iteration's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
}

impl CheckOutcome {
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
        }
    }

    /// Run `predicate` against `value`. A predicate that errors counts as a failed check.
    pub fn evaluate<T, E, P>(name: impl Into<String>, value: &T, predicate: P) -> Self
    where
        T: ?Sized,
        E: fmt::Display,
        P: FnOnce(&T) -> Result<bool, E>,
    {
        let name = name.into();
        let passed = match predicate(value) {
            Ok(passed) => passed,
            Err(err) => {
                debug!("Check `{name}` could not be evaluated: {err}");
                false
            }
        };

        Self { name, passed }
    }
}

/// Outcome of one scenario invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IterationResult {
    pub status: Status,
    /// Left at zero, the executor stamps the measured wall time of the iteration.
    pub duration: Duration,
    pub checks: Vec<CheckOutcome>,
}

impl IterationResult {
    pub fn passed() -> Self {
        Self::default()
    }

    pub fn failed() -> Self {
        Self::with_status(Status::Failed)
    }

    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Evaluate and append a named check.
    pub fn check<T, E, P>(mut self, name: impl Into<String>, value: &T, predicate: P) -> Self
    where
        T: ?Sized,
        E: fmt::Display,
        P: FnOnce(&T) -> Result<bool, E>,
    {
        self.checks
            .push(CheckOutcome::evaluate(name, value, predicate));
        self
    }

    pub fn push_check(&mut self, outcome: CheckOutcome) {
        self.checks.push(outcome);
    }

    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VuState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl VuState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => VuState::Idle,
            1 => VuState::Running,
            2 => VuState::Stopping,
            _ => VuState::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            VuState::Idle => 0,
            VuState::Running => 1,
            VuState::Stopping => 2,
            VuState::Stopped => 3,
        }
    }
}

/// The parts of an iteration a VU remembers after routing it to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSummary {
    pub status: Status,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VuReport {
    pub id: u64,
    pub state: VuState,
    pub iterations: u64,
    pub last_iteration: Option<IterationSummary>,
}
