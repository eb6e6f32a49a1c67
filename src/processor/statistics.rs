//! Descriptive statistics over a group's samples.
//!
//! The battery is the closed [`StatName`] enum; each variant maps to one
//! computation. Samples are sorted before anything is computed, so every
//! statistic depends only on the input multiset and is bit-reproducible.
//!
//! Policies:
//! - an empty sample set is replaced by [`EMPTY_SAMPLE_FALLBACK`] (`[0, 0]`)
//! - a statistic that cannot be computed (no unique mode, too few points)
//!   reports `0.0` and is listed in [`StatisticsOutcome::fallbacks`]
//! - `mode` is strict: a tie for the highest frequency has no unique mode

use crate::constants::{EMPTY_SAMPLE_FALLBACK, MEDIAN_GROUPED_INTERVAL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("no data points")]
    Empty,

    #[error("no unique mode; {count} values share the highest frequency")]
    NoUniqueMode { count: usize },

    #[error("{statistic} requires at least {required} data points, found {found}")]
    InsufficientData {
        statistic: StatName,
        required: usize,
        found: usize,
    },

    #[error("unknown statistic '{0}'")]
    UnknownStatistic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatName {
    Min,
    Max,
    Mean,
    Median,
    MedianLow,
    MedianHigh,
    MedianGrouped,
    Mode,
    Pstdev,
    Pvariance,
    Stdev,
    Variance,
}

impl StatName {
    pub const ALL: [StatName; 12] = [
        StatName::Min,
        StatName::Max,
        StatName::Mean,
        StatName::Median,
        StatName::MedianLow,
        StatName::MedianHigh,
        StatName::MedianGrouped,
        StatName::Mode,
        StatName::Pstdev,
        StatName::Pvariance,
        StatName::Stdev,
        StatName::Variance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatName::Min => "min",
            StatName::Max => "max",
            StatName::Mean => "mean",
            StatName::Median => "median",
            StatName::MedianLow => "median_low",
            StatName::MedianHigh => "median_high",
            StatName::MedianGrouped => "median_grouped",
            StatName::Mode => "mode",
            StatName::Pstdev => "pstdev",
            StatName::Pvariance => "pvariance",
            StatName::Stdev => "stdev",
            StatName::Variance => "variance",
        }
    }

    /// Compute this statistic over samples sorted in ascending order
    pub fn compute_sorted(&self, sorted: &[f64]) -> Result<f64, StatisticsError> {
        if sorted.is_empty() {
            return Err(StatisticsError::Empty);
        }
        match self {
            StatName::Min => Ok(sorted[0]),
            StatName::Max => Ok(sorted[sorted.len() - 1]),
            StatName::Mean => Ok(mean(sorted)),
            StatName::Median => Ok(median(sorted)),
            StatName::MedianLow => Ok(sorted[(sorted.len() - 1) / 2]),
            StatName::MedianHigh => Ok(sorted[sorted.len() / 2]),
            StatName::MedianGrouped => Ok(median_grouped(sorted, MEDIAN_GROUPED_INTERVAL)),
            StatName::Mode => mode(sorted),
            StatName::Pvariance => Ok(sum_of_squares(sorted) / sorted.len() as f64),
            StatName::Pstdev => Ok((sum_of_squares(sorted) / sorted.len() as f64).sqrt()),
            StatName::Variance => sample_variance(*self, sorted),
            StatName::Stdev => sample_variance(*self, sorted).map(f64::sqrt),
        }
    }
}

impl fmt::Display for StatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatName {
    type Err = StatisticsError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        StatName::ALL
            .into_iter()
            .find(|stat| stat.as_str() == name)
            .ok_or_else(|| StatisticsError::UnknownStatistic(name.to_string()))
    }
}

/// Result of computing a battery over one group
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsOutcome {
    pub values: BTreeMap<StatName, f64>,
    /// Statistics that could not be computed and were reported as `0.0`
    pub fallbacks: Vec<(StatName, StatisticsError)>,
    /// True when the input was empty and the fallback samples were used
    pub used_empty_fallback: bool,
}

/// Compute every statistic in `battery` over `samples`
pub fn compute(samples: &[f64], battery: &[StatName]) -> StatisticsOutcome {
    let used_empty_fallback = samples.is_empty();
    let mut sorted = if used_empty_fallback {
        EMPTY_SAMPLE_FALLBACK.to_vec()
    } else {
        samples.to_vec()
    };
    sorted.sort_by(f64::total_cmp);

    let mut values = BTreeMap::new();
    let mut fallbacks = Vec::new();
    for stat in battery {
        let value = match stat.compute_sorted(&sorted) {
            Ok(value) => value,
            Err(error) => {
                fallbacks.push((*stat, error));
                0.0
            }
        };
        values.insert(*stat, value);
    }

    StatisticsOutcome {
        values,
        fallbacks,
        used_empty_fallback,
    }
}

fn mean(sorted: &[f64]) -> f64 {
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median of continuous data grouped in classes of width `interval`,
/// centred on the middle value
fn median_grouped(sorted: &[f64], interval: f64) -> f64 {
    let n = sorted.len();
    let x = sorted[n / 2];
    let below = sorted.partition_point(|v| *v < x);
    let through = sorted.partition_point(|v| *v <= x);
    let lower_limit = x - interval / 2.0;
    let frequency = (through - below) as f64;
    lower_limit + interval * (n as f64 / 2.0 - below as f64) / frequency
}

fn mode(sorted: &[f64]) -> Result<f64, StatisticsError> {
    let mut best_value = sorted[0];
    let mut best_count = 0;
    let mut tied = 0;

    let mut start = 0;
    while start < sorted.len() {
        let value = sorted[start];
        let end = start + sorted[start..].partition_point(|v| *v == value);
        let count = end - start;
        if count > best_count {
            best_value = value;
            best_count = count;
            tied = 1;
        } else if count == best_count {
            tied += 1;
        }
        start = end;
    }

    if tied > 1 {
        Err(StatisticsError::NoUniqueMode { count: tied })
    } else {
        Ok(best_value)
    }
}

fn sum_of_squares(sorted: &[f64]) -> f64 {
    let center = mean(sorted);
    sorted.iter().map(|v| (v - center) * (v - center)).sum()
}

fn sample_variance(statistic: StatName, sorted: &[f64]) -> Result<f64, StatisticsError> {
    if sorted.len() < 2 {
        return Err(StatisticsError::InsufficientData {
            statistic,
            required: 2,
            found: sorted.len(),
        });
    }
    Ok(sum_of_squares(sorted) / (sorted.len() - 1) as f64)
}
