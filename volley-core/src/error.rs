use crate::MetricKind;
use std::error::Error as StdError;
use thiserror::Error;

/// Invalid run configuration. Detected before any virtual user is started.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No stages configured.")]
    NoStages,

    #[error("Stage profile has a total duration of zero.")]
    ZeroDuration,

    #[error("Control interval must be non-zero.")]
    ZeroControlInterval,

    #[error("Invalid duration `{input}`: {source}")]
    InvalidDuration {
        input: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Malformed threshold `{expression}` on `{metric}`: {source}")]
    MalformedThreshold {
        metric: String,
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Threshold references unknown metric `{0}`.")]
    UnknownMetric(String),

    #[error("`{aggregation}` cannot be applied to {kind} metric `{metric}`.")]
    UnsupportedAggregation {
        metric: String,
        aggregation: String,
        kind: MetricKind,
    },

    #[error("Metric `{name}` is declared as {declared} but is a built-in {builtin} metric.")]
    ConflictingMetric {
        name: String,
        declared: MetricKind,
        builtin: MetricKind,
    },
}

/// Reasons a threshold expression such as `p(95)<500` fails to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("expected one of `<`, `<=`, `>`, `>=`, `==`")]
    MissingComparator,

    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),

    #[error("invalid percentile `{0}`; expected p(N) with 0 < N <= 100")]
    InvalidPercentile(String),

    #[error("invalid bound `{0}`")]
    InvalidBound(String),
}

/// A scenario iteration that did not produce a result.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("Iteration failed: {0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),

    #[error("Iteration panicked: {0}")]
    Panicked(String),
}

impl IterationError {
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }
}

/// Misuse of the metric registry. Never fatal to a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("Metric `{name}` is a {actual} metric, not a {expected} metric.")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("Metric `{name}` ignored non-finite observation {value}.")]
    NonFinite { name: String, value: f64 },
}
