//! Metric descriptors and aggregation.
//!
//! A metric is configured on the command line as a colon-separated token
//! `name:column[:function[:period]]`: which whitespace-split column of each
//! log line to read, how to reduce the collected values, and how far back
//! from "now" a row may be timestamped to still count.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// One or more digits followed by exactly one unit letter, e.g. `5m`.
static PERIOD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([A-Za-z])$").unwrap());

/// Trailing time window attached to a metric, e.g. `30s`, `5m`, `2h`, `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    magnitude: i64,
    unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Unit {
    fn seconds(self) -> i64 {
        match self {
            Unit::Seconds => 1,
            Unit::Minutes => 60,
            Unit::Hours => 3600,
            Unit::Days => 86400,
        }
    }

    fn symbol(self) -> char {
        match self {
            Unit::Seconds => 's',
            Unit::Minutes => 'm',
            Unit::Hours => 'h',
            Unit::Days => 'd',
        }
    }
}

impl Period {
    /// Parse `<digits><unit>` where the unit is one of `s`, `m`, `h`, `d`
    /// (case-insensitive).
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let caps = PERIOD_PATTERN
            .captures(raw)
            .ok_or_else(|| ConfigError::BadPeriod(raw.to_string()))?;
        let magnitude: i64 = caps[1]
            .parse()
            .map_err(|_| ConfigError::BadPeriod(raw.to_string()))?;
        let unit = match caps[2].chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('s') => Unit::Seconds,
            Some('m') => Unit::Minutes,
            Some('h') => Unit::Hours,
            Some('d') => Unit::Days,
            _ => return Err(ConfigError::BadPeriod(raw.to_string())),
        };
        Ok(Period { magnitude, unit })
    }

    /// Window length in seconds.
    pub fn seconds(&self) -> i64 {
        self.magnitude * self.unit.seconds()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.symbol())
    }
}

/// Validated descriptor of one metric to extract.
///
/// Built once from a CLI token and never mutated afterwards; the values
/// collected during a scan live in a separate [`Accumulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    name: String,
    column: usize,
    function: Option<String>,
    period: Option<Period>,
}

impl MetricSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based index into the whitespace-split fields of each line.
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn function(&self) -> Option<&str> {
        self.function.as_deref()
    }

    pub fn period(&self) -> Option<Period> {
        self.period
    }

    /// Window length in seconds; `0` when no period is configured.
    pub fn timeshift(&self) -> i64 {
        self.period.map(|p| p.seconds()).unwrap_or(0)
    }

    /// Window start for a scan anchored at `now`. Rows timestamped strictly
    /// after the cutoff qualify. Without a period the cutoff is the epoch,
    /// so every row qualifies.
    pub fn cutoff(&self, now: i64) -> i64 {
        match self.period {
            Some(p) => now - p.seconds(),
            None => 0,
        }
    }

    /// Reduce the accumulated values with the configured function.
    ///
    /// Unknown function names are rejected here, not at construction —
    /// callers get a configuration error only once they ask for the value.
    pub fn evaluate(&self, acc: &Accumulator) -> Result<f64, EvalError> {
        let function = AggFunc::resolve(self.function.as_deref())?;

        if function == AggFunc::Last {
            let raw = acc
                .last_raw
                .as_deref()
                .ok_or_else(|| EvalError::NoData(self.name.clone()))?;
            let value: i64 = raw.parse().map_err(|_| EvalError::BadLastValue {
                metric: self.name.clone(),
                raw: raw.to_string(),
            })?;
            return Ok(value as f64);
        }

        let values = &acc.values;
        if values.is_empty() {
            return Err(EvalError::NoData(self.name.clone()));
        }

        let value = match function {
            AggFunc::Sum => values.iter().sum::<i64>() as f64,
            // Integer division: the mean truncates toward zero.
            AggFunc::Mean => (values.iter().sum::<i64>() / values.len() as i64) as f64,
            AggFunc::Median => median(values),
            AggFunc::Min => values.iter().copied().fold(values[0], i64::min) as f64,
            AggFunc::Max => values.iter().copied().fold(values[0], i64::max) as f64,
            AggFunc::Count => count_above(values, 0) as f64,
            AggFunc::Last => unreachable!("handled above"),
        };
        Ok(value)
    }
}

/// Median of a non-empty slice. Odd lengths take the middle element as an
/// integer; even lengths average the two middle elements and keep the
/// fraction — `[1,2,3,4]` is `2.5`, not `2`.
fn median(values: &[i64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    }
}

/// Number of values strictly greater than `threshold`.
fn count_above(values: &[i64], threshold: i64) -> i64 {
    values.iter().filter(|&&v| v > threshold).count() as i64
}

impl std::str::FromStr for MetricSpec {
    type Err = ConfigError;

    fn from_str(token: &str) -> Result<Self, ConfigError> {
        if !token.contains(':') {
            return Err(ConfigError::MissingColon(token.to_string()));
        }
        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() > 4 {
            return Err(ConfigError::TooManyParts(token.to_string()));
        }

        let name = parts[0];
        if name.is_empty() {
            return Err(ConfigError::MissingName(token.to_string()));
        }

        // parts.len() >= 2 because the token contains a colon.
        let column = parts[1];
        if column.is_empty() || !column.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::BadColumn(column.to_string()));
        }
        let column: usize = column
            .parse()
            .map_err(|_| ConfigError::BadColumn(parts[1].to_string()))?;

        // An empty trailing part (`name:2:`) means "unset", same as absent.
        let function = parts
            .get(2)
            .filter(|f| !f.is_empty())
            .map(|f| f.to_string());
        let period = match parts.get(3).filter(|p| !p.is_empty()) {
            Some(p) => Some(Period::parse(p)?),
            None => None,
        };

        Ok(MetricSpec {
            name: name.to_string(),
            column,
            function,
            period,
        })
    }
}

/// Closed set of aggregation functions. The configured name is resolved to a
/// variant at evaluation time so unknown names surface as configuration
/// errors there, matching the token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggFunc {
    Mean,
    Median,
    Sum,
    Min,
    Max,
    Count,
    Last,
}

impl AggFunc {
    fn resolve(name: Option<&str>) -> Result<Self, EvalError> {
        match name {
            Some("mean") => Ok(AggFunc::Mean),
            Some("median") => Ok(AggFunc::Median),
            Some("sum") => Ok(AggFunc::Sum),
            Some("min") => Ok(AggFunc::Min),
            Some("max") => Ok(AggFunc::Max),
            Some("count") => Ok(AggFunc::Count),
            Some("last") | None => Ok(AggFunc::Last),
            Some(other) => Err(EvalError::UnknownFunction(other.to_string())),
        }
    }
}

/// Values gathered for one metric across all scanned sources.
///
/// `values` only grows as sources are folded in; `last_raw` is overwritten by
/// each source, so it reflects the last line of the last source scanned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub values: Vec<i64>,
    pub last_raw: Option<String>,
}

impl Accumulator {
    /// Fold one source's scan outcome into this run-wide accumulator.
    pub fn absorb(&mut self, outcome: Accumulator) {
        self.values.extend(outcome.values);
        self.last_raw = outcome.last_raw;
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingColon(String),
    TooManyParts(String),
    MissingName(String),
    BadColumn(String),
    BadPeriod(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingColon(token) => {
                write!(f, "metric '{token}' must contain a ':'")
            }
            ConfigError::TooManyParts(token) => {
                write!(f, "metric '{token}' has too many parts (max 4)")
            }
            ConfigError::MissingName(token) => {
                write!(f, "metric '{token}' is missing a name")
            }
            ConfigError::BadColumn(column) => {
                write!(f, "column '{column}' must be a non-negative integer")
            }
            ConfigError::BadPeriod(period) => {
                write!(
                    f,
                    "period '{period}' must be digits followed by one of s, m, h, d"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum EvalError {
    UnknownFunction(String),
    NoData(String),
    BadLastValue { metric: String, raw: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownFunction(name) => write!(
                f,
                "unknown function '{name}'; expected one of mean, median, sum, min, max, count, last"
            ),
            EvalError::NoData(metric) => {
                write!(f, "metric '{metric}' has no values to aggregate")
            }
            EvalError::BadLastValue { metric, raw } => {
                write!(f, "metric '{metric}': last value '{raw}' is not an integer")
            }
        }
    }
}

impl std::error::Error for EvalError {}
