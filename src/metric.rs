use std::cmp::Ordering;
use std::fmt;

use anyhow::{Result, bail};
use serde::Deserialize;

/// How to clip a jobs x time matrix along the time axis before aggregating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Truncation {
    #[default]
    None,
    FirstK {
        k: usize,
    },
    LastK {
        k: usize,
    },
}

impl Truncation {
    fn clip(self, row: &[f64]) -> &[f64] {
        match self {
            Truncation::None => row,
            Truncation::FirstK { k } => &row[..k.min(row.len())],
            Truncation::LastK { k } => &row[row.len().saturating_sub(k)..],
        }
    }
}

/// One statistic computed from a jobs x time matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Mean over all values.
    Avg,
    /// Median over all values.
    Median,
    /// Standard deviation of the per-job means. Inter-job variance,
    /// not within-job noise.
    Std,
    /// Global maximum over all values.
    Max,
    /// Global minimum over all values.
    Min,
    /// Per-job maximum first, then averaged across jobs.
    MaxAvg,
    /// Per-job minimum first, then averaged across jobs.
    MinAvg,
}

impl Aggregate {
    /// Suffix appended to the display name to form the result name.
    pub fn suffix(self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Median => "med",
            Aggregate::Std => "std",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::MaxAvg => "max_avg",
            Aggregate::MinAvg => "min_avg",
        }
    }

    fn apply(self, matrix: &[Vec<f64>]) -> f64 {
        match self {
            Aggregate::Avg => mean(matrix.iter().flatten().copied()),
            Aggregate::Median => median(matrix.iter().flatten().copied().collect()),
            Aggregate::Std => std_dev(matrix.iter().map(|row| mean(row.iter().copied()))),
            Aggregate::Max => fold_extremum(matrix.iter().flatten().copied(), f64::max),
            Aggregate::Min => fold_extremum(matrix.iter().flatten().copied(), f64::min),
            Aggregate::MaxAvg => {
                mean(matrix.iter().map(|row| fold_extremum(row.iter().copied(), f64::max)))
            }
            Aggregate::MinAvg => {
                mean(matrix.iter().map(|row| fold_extremum(row.iter().copied(), f64::min)))
            }
        }
    }
}

/// Declarative rule for reducing a group's per-job time series for one
/// metric key into named scalar results. Immutable once constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricSpec {
    /// Key in the scalar log, e.g. "test/accuracy".
    key: String,
    /// Display name for result columns; defaults to the key.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    truncation: Truncation,
    /// If set, NaN samples are replaced with this before anything else.
    #[serde(default)]
    nan_replacement: Option<f64>,
    aggregates: Vec<Aggregate>,
    /// Sentinel rendered when no group member reports the key. Unset means
    /// the key is required and its absence is a fatal error.
    #[serde(default)]
    not_available_value: Option<String>,
    #[serde(default = "default_precision")]
    float_precision: usize,
}

fn default_precision() -> usize {
    2
}

impl MetricSpec {
    pub fn new(key: impl Into<String>, aggregates: impl Into<Vec<Aggregate>>) -> Self {
        Self {
            key: key.into(),
            name: None,
            truncation: Truncation::None,
            nan_replacement: None,
            aggregates: aggregates.into(),
            not_available_value: None,
            float_precision: 2,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn first_k(mut self, k: usize) -> Self {
        self.truncation = Truncation::FirstK { k };
        self
    }

    pub fn last_k(mut self, k: usize) -> Self {
        self.truncation = Truncation::LastK { k };
        self
    }

    pub fn replace_nan(mut self, value: f64) -> Self {
        self.nan_replacement = Some(value);
        self
    }

    pub fn not_available(mut self, value: impl Into<String>) -> Self {
        self.not_available_value = Some(value.into());
        self
    }

    pub fn precision(mut self, float_precision: usize) -> Self {
        self.float_precision = float_precision;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }

    /// Whether the key must be present in every member of a group.
    pub fn is_required(&self) -> bool {
        self.not_available_value.is_none()
    }

    /// Computes all requested aggregates from a rectangular jobs x time
    /// matrix (axis 0 = jobs that report the key). `None` means the key
    /// exists in zero jobs of the group; without a configured
    /// `not_available_value` that is a fatal configuration error.
    pub fn evaluate(&self, values: Option<&[Vec<f64>]>) -> Result<Vec<MetricResult>> {
        let matrix = values.map(|rows| self.prepare(rows));

        let mut results = Vec::with_capacity(self.aggregates.len());
        for aggregate in &self.aggregates {
            let value = match (&matrix, &self.not_available_value) {
                (Some(matrix), _) => ResultValue::Number(aggregate.apply(matrix)),
                (None, Some(sentinel)) => ResultValue::Text(sentinel.clone()),
                (None, None) => bail!(
                    "metric '{}' (key '{}'): no group member reports the key and no \
                     not_available_value is configured",
                    self.display_name(),
                    self.key,
                ),
            };
            results.push(MetricResult {
                name: format!("{} {}", self.display_name(), aggregate.suffix()),
                value,
                float_precision: self.float_precision,
            });
        }
        Ok(results)
    }

    /// NaN replacement, then truncation. Never mutates the input rows.
    fn prepare(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                self.truncation
                    .clip(row)
                    .iter()
                    .map(|&v| match self.nan_replacement {
                        Some(replacement) if v.is_nan() => replacement,
                        _ => v,
                    })
                    .collect()
            })
            .collect()
    }
}

/// A computed value under a result name, carrying its display precision.
///
/// Ordering is total: any text (sentinel) value sorts below any number,
/// two text values compare equal, numbers compare by value.
#[derive(Debug, Clone)]
pub struct MetricResult {
    pub name: String,
    pub value: ResultValue,
    pub float_precision: usize,
}

impl fmt::Display for MetricResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ResultValue::Text(text) => f.write_str(text),
            ResultValue::Number(number) => {
                write!(f, "{number:.prec$}", prec = self.float_precision)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResultValue {
    Number(f64),
    Text(String),
}

impl Ord for ResultValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ResultValue::Text(_), ResultValue::Text(_)) => Ordering::Equal,
            (ResultValue::Text(_), ResultValue::Number(_)) => Ordering::Less,
            (ResultValue::Number(_), ResultValue::Text(_)) => Ordering::Greater,
            (ResultValue::Number(a), ResultValue::Number(b)) => a.total_cmp(b),
        }
    }
}

impl PartialOrd for ResultValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ResultValue {}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0_usize;
    for value in values {
        sum += value;
        count += 1;
    }
    sum / count as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 { values[n / 2] } else { (values[n / 2 - 1] + values[n / 2]) / 2.0 }
}

/// Population standard deviation.
fn std_dev(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    let mu = mean(values.iter().copied());
    let variance = mean(values.iter().map(|v| (v - mu) * (v - mu)));
    variance.sqrt()
}

fn fold_extremum(values: impl Iterator<Item = f64>, pick: fn(f64, f64) -> f64) -> f64 {
    values.reduce(pick).unwrap_or(f64::NAN)
}
