use crate::{ConfigurationError, ExpressionError, MetricKind};
use std::fmt;
use std::str::FromStr;

/// The statistic a threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Min,
    Max,
    Avg,
    Med,
    Percentile(f64),
}

impl Aggregation {
    pub fn supports(&self, kind: MetricKind) -> bool {
        match self {
            Aggregation::Count => true,
            Aggregation::Rate => kind == MetricKind::Rate,
            _ => kind == MetricKind::Trend,
        }
    }
}

impl FromStr for Aggregation {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate" => Ok(Aggregation::Rate),
            "count" => Ok(Aggregation::Count),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "avg" => Ok(Aggregation::Avg),
            "med" => Ok(Aggregation::Med),
            other => {
                // Both `p(95)` and the shorthand `p95` are accepted.
                let digits = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .or_else(|| other.strip_prefix('p'))
                    .ok_or_else(|| ExpressionError::UnknownAggregation(other.to_string()))?;

                match digits.trim().parse::<f64>() {
                    Ok(p) if p > 0. && p <= 100. => Ok(Aggregation::Percentile(p)),
                    _ => Err(ExpressionError::InvalidPercentile(other.to_string())),
                }
            }
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparator {
    pub fn compare(&self, actual: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => actual < bound,
            Comparator::Le => actual <= bound,
            Comparator::Gt => actual > bound,
            Comparator::Ge => actual >= bound,
            Comparator::Eq => (actual - bound).abs() < f64::EPSILON,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
        };
        write!(f, "{op}")
    }
}

/// A parsed expression such as `p(95)<500` or `rate < 0.01`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparator: Comparator,
    pub bound: f64,
}

impl FromStr for ThresholdExpr {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(['<', '>', '='])
            .ok_or(ExpressionError::MissingComparator)?;
        let (lhs, rest) = s.split_at(split);

        let (comparator, rhs) = [
            ("<=", Comparator::Le),
            (">=", Comparator::Ge),
            ("==", Comparator::Eq),
            ("<", Comparator::Lt),
            (">", Comparator::Gt),
        ]
        .into_iter()
        .find_map(|(op, comparator)| rest.strip_prefix(op).map(|rhs| (comparator, rhs)))
        .ok_or(ExpressionError::MissingComparator)?;

        let aggregation = lhs.trim().parse()?;

        let rhs = rhs.trim();
        let bound = rhs
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or_else(|| ExpressionError::InvalidBound(rhs.to_string()))?;

        Ok(Self {
            aggregation,
            comparator,
            bound,
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparator, self.bound)
    }
}

/// A pass/fail rule bound to one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: String,
    expr: ThresholdExpr,
    abort_on_fail: bool,
}

impl Threshold {
    pub fn new(metric: &str, expr: ThresholdExpr) -> Self {
        Self {
            metric: metric.to_string(),
            expr,
            abort_on_fail: false,
        }
    }

    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigurationError> {
        let expr = expression
            .parse()
            .map_err(|source| ConfigurationError::MalformedThreshold {
                metric: metric.to_string(),
                expression: expression.to_string(),
                source,
            })?;

        Ok(Self::new(metric, expr))
    }

    pub fn abort_on_fail(mut self, abort_on_fail: bool) -> Self {
        self.abort_on_fail = abort_on_fail;
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn expr(&self) -> &ThresholdExpr {
        &self.expr
    }

    pub fn aborts_on_fail(&self) -> bool {
        self.abort_on_fail
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expr)
    }
}
