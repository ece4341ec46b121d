use crate::{
    builtin_kind, ConfigurationError, MetricKind, Threshold, DEFAULT_CONTROL_INTERVAL,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One segment of the ramp profile: move linearly towards `target` VUs over `duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stage {
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }

    /// Build a stage from a human readable duration such as `"30s"`, `"2m"` or `"1h 5m"`.
    pub fn parse(duration: &str, target: u64) -> Result<Self, ConfigurationError> {
        let parsed = humantime::parse_duration(duration).map_err(|source| {
            ConfigurationError::InvalidDuration {
                input: duration.to_string(),
                source,
            }
        })?;

        Ok(Self::new(parsed, target))
    }
}

/// A threshold as written in configuration, before its expression is parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdConfig {
    pub metric: String,
    pub expression: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub abort_on_fail: bool,
}

/// A custom metric recorded by the scenario that thresholds may reference.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricDecl {
    pub name: String,
    pub kind: MetricKind,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    pub name: String,
    pub stages: Vec<Stage>,
    /// An ordered list: several thresholds may target the same metric and all of them apply.
    #[cfg_attr(feature = "serde", serde(default))]
    pub thresholds: Vec<ThresholdConfig>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub metrics: Vec<MetricDecl>,
    /// Delay between the iterations of a single VU.
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub pacing: Duration,
    #[cfg_attr(
        feature = "serde",
        serde(default = "default_control_interval", with = "humantime_serde")
    )]
    pub control_interval: Duration,
    /// How long VUs may take to finish their in-flight iteration once the run stops.
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub graceful_stop: Option<Duration>,
    /// Abort-on-fail thresholds are not evaluated before this much of the run has elapsed.
    #[cfg_attr(feature = "serde", serde(default, with = "humantime_serde"))]
    pub abort_grace: Duration,
}

#[cfg(feature = "serde")]
fn default_control_interval() -> Duration {
    DEFAULT_CONTROL_INTERVAL
}

impl RunConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: vec![],
            thresholds: vec![],
            metrics: vec![],
            pacing: Duration::ZERO,
            control_interval: DEFAULT_CONTROL_INTERVAL,
            graceful_stop: None,
            abort_grace: Duration::ZERO,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Kind of a built-in or declared metric.
    pub fn metric_kind(&self, name: &str) -> Option<MetricKind> {
        builtin_kind(name).or_else(|| {
            self.metrics
                .iter()
                .find(|decl| decl.name == name)
                .map(|decl| decl.kind)
        })
    }

    /// Check the whole configuration and return its thresholds, parsed, in declaration order.
    pub fn validate(&self) -> Result<Vec<Threshold>, ConfigurationError> {
        validate_stages(&self.stages)?;

        if self.control_interval.is_zero() {
            return Err(ConfigurationError::ZeroControlInterval);
        }

        for decl in &self.metrics {
            if let Some(builtin) = builtin_kind(&decl.name) {
                if builtin != decl.kind {
                    return Err(ConfigurationError::ConflictingMetric {
                        name: decl.name.clone(),
                        declared: decl.kind,
                        builtin,
                    });
                }
            }
        }

        self.thresholds
            .iter()
            .map(|config| {
                let threshold = Threshold::parse(&config.metric, &config.expression)?
                    .abort_on_fail(config.abort_on_fail);

                let kind = self
                    .metric_kind(&config.metric)
                    .ok_or_else(|| ConfigurationError::UnknownMetric(config.metric.clone()))?;

                let aggregation = threshold.expr().aggregation;
                if !aggregation.supports(kind) {
                    return Err(ConfigurationError::UnsupportedAggregation {
                        metric: config.metric.clone(),
                        aggregation: aggregation.to_string(),
                        kind,
                    });
                }

                Ok(threshold)
            })
            .collect()
    }
}

/// A stage profile must be non-empty and span a non-zero amount of time. Individual
/// zero-length stages are allowed and act as instantaneous jumps.
pub fn validate_stages(stages: &[Stage]) -> Result<(), ConfigurationError> {
    if stages.is_empty() {
        return Err(ConfigurationError::NoStages);
    }

    if stages.iter().all(|s| s.duration.is_zero()) {
        return Err(ConfigurationError::ZeroDuration);
    }

    Ok(())
}
