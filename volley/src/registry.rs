//! Run-scoped metric storage.
//!
//! The name to metric map is copy-on-write: lookups are a single atomic load, and only the
//! first observation of a new name pays for cloning the map. Each metric then updates
//! without locks, so concurrent VUs recording into unrelated metrics never contend.
use arc_swap::ArcSwap;
use metrics_util::AtomicBucket;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use volley_core::{
    MetricError, MetricKind, MetricSnapshot, RateSnapshot, TrendSnapshot, BUILTIN_METRICS,
};

pub struct MetricRegistry {
    metrics: ArcSwap<HashMap<String, Arc<Metric>>>,
}

enum Metric {
    Rate(RateMetric),
    Trend(TrendMetric),
}

impl Metric {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Rate => Metric::Rate(RateMetric::default()),
            MetricKind::Trend => Metric::Trend(TrendMetric::default()),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Metric::Rate(_) => MetricKind::Rate,
            Metric::Trend(_) => MetricKind::Trend,
        }
    }

    fn snapshot(&self) -> MetricSnapshot {
        match self {
            Metric::Rate(rate) => MetricSnapshot::Rate(rate.snapshot()),
            Metric::Trend(trend) => MetricSnapshot::Trend(trend.snapshot()),
        }
    }
}

#[derive(Default)]
struct RateMetric {
    success: AtomicU64,
    total: AtomicU64,
}

impl RateMetric {
    fn record(&self, value: bool) {
        // NOTE: `total` is bumped first and read last so a snapshot never sees success > total.
        self.total.fetch_add(1, Ordering::SeqCst);
        if value {
            self.success.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&self) -> RateSnapshot {
        let success = self.success.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        RateSnapshot { success, total }
    }
}

struct TrendMetric {
    values: AtomicBucket<f64>,
}

impl Default for TrendMetric {
    fn default() -> Self {
        Self {
            values: AtomicBucket::new(),
        }
    }
}

impl TrendMetric {
    fn record(&self, value: f64) {
        self.values.push(value);
    }

    fn snapshot(&self) -> TrendSnapshot {
        TrendSnapshot::from_values(self.values.data())
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            metrics: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// A registry with every built-in metric registered up front, so they show up in
    /// snapshots even when nothing was recorded into them.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.metrics.store(Arc::new(
            BUILTIN_METRICS
                .iter()
                .map(|(name, kind)| (name.to_string(), Arc::new(Metric::new(*kind))))
                .collect(),
        ));
        registry
    }

    /// Register `name` ahead of time. Registering an existing metric of the same kind is a no-op.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<(), MetricError> {
        self.get_or_register(name, kind).map(|_| ())
    }

    pub fn record_rate(&self, name: &str, value: bool) -> Result<(), MetricError> {
        if let Metric::Rate(rate) = &*self.get_or_register(name, MetricKind::Rate)? {
            rate.record(value);
        }

        #[cfg(feature = "metrics")]
        export::rate(name, value);

        Ok(())
    }

    pub fn record_trend(&self, name: &str, value: f64) -> Result<(), MetricError> {
        if !value.is_finite() {
            return Err(MetricError::NonFinite {
                name: name.to_string(),
                value,
            });
        }

        if let Metric::Trend(trend) = &*self.get_or_register(name, MetricKind::Trend)? {
            trend.record(value);
        }

        #[cfg(feature = "metrics")]
        export::trend(name, value);

        Ok(())
    }

    /// Record a duration into a Trend metric, in milliseconds.
    pub fn record_duration(&self, name: &str, duration: Duration) -> Result<(), MetricError> {
        self.record_trend(name, duration.as_secs_f64() * 1000.)
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.metrics.load().get(name).map(|m| m.kind())
    }

    pub fn snapshot(&self, name: &str) -> Option<MetricSnapshot> {
        self.metrics.load().get(name).map(|m| m.snapshot())
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, MetricSnapshot> {
        self.metrics
            .load()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.snapshot()))
            .collect()
    }

    fn get_or_register(&self, name: &str, kind: MetricKind) -> Result<Arc<Metric>, MetricError> {
        loop {
            if let Some(metric) = self.metrics.load().get(name) {
                if metric.kind() != kind {
                    return Err(MetricError::KindMismatch {
                        name: name.to_string(),
                        expected: kind,
                        actual: metric.kind(),
                    });
                }
                return Ok(metric.clone());
            }

            // NOTE: Another VU may win the race to insert; the next load then picks its entry up.
            self.metrics.rcu(|current| {
                let mut next = HashMap::clone(current);
                next.entry(name.to_string())
                    .or_insert_with(|| Arc::new(Metric::new(kind)));
                next
            });
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let metrics = self.metrics.load();
        let mut names: Vec<_> = metrics.keys().collect();
        names.sort();
        f.debug_struct("MetricRegistry")
            .field("metrics", &names)
            .finish()
    }
}

/// Log a failed record call. Misuse of the registry never interrupts a run.
pub(crate) fn report(res: Result<(), MetricError>) {
    if let Err(err) = res {
        warn!("{err}");
    }
}

#[cfg(feature = "metrics")]
mod export {
    /// Splits `checks{status is 200}` into `("volley_checks", Some("status is 200"))`.
    fn split(name: &str) -> (String, Option<String>) {
        match name.split_once('{') {
            Some((base, tag)) if tag.ends_with('}') => (
                format!("volley_{base}"),
                Some(tag.trim_end_matches('}').to_string()),
            ),
            _ => (format!("volley_{name}"), None),
        }
    }

    pub(super) fn rate(name: &str, value: bool) {
        let (base, tag) = split(name);
        let outcome = if value { "true" } else { "false" };
        match tag {
            Some(tag) => metrics::counter!(base, "tag" => tag, "value" => outcome).increment(1),
            None => metrics::counter!(base, "value" => outcome).increment(1),
        }
    }

    pub(super) fn trend(name: &str, value: f64) {
        let (base, tag) = split(name);
        match tag {
            Some(tag) => metrics::histogram!(base, "tag" => tag).record(value),
            None => metrics::histogram!(base).record(value),
        }
    }
}
