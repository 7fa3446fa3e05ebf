//! Accuracy metrics for forecast evaluation.

use crate::core::ForecastResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default threshold under which a ground-truth value is treated as zero for MAPE.
pub const DEFAULT_ZERO_THRESHOLD: f64 = 1e-8;

/// Names of the metrics recorded per model and fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Mae,
    Mse,
    Rmse,
    Mape,
    /// Number of points dropped from MAPE because the actual value was near zero.
    MapeExcluded,
    Smape,
    /// Mean of `predicted - actual`.
    Bias,
    /// Share of actuals inside the prediction interval.
    ///
    /// Not ranked: a wider interval always covers more, and models may use
    /// different nominal levels.
    Coverage,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Mae,
        Metric::Mse,
        Metric::Rmse,
        Metric::Mape,
        Metric::MapeExcluded,
        Metric::Smape,
        Metric::Bias,
        Metric::Coverage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Mae => "mae",
            Metric::Mse => "mse",
            Metric::Rmse => "rmse",
            Metric::Mape => "mape",
            Metric::MapeExcluded => "mape_excluded",
            Metric::Smape => "smape",
            Metric::Bias => "bias",
            Metric::Coverage => "coverage",
        }
    }

    /// Whether models can be ranked on this metric.
    pub fn is_rankable(self) -> bool {
        !matches!(self, Metric::MapeExcluded | Metric::Coverage)
    }

    /// Sort key under which smaller is better.
    pub(crate) fn ranking_key(self, value: f64) -> f64 {
        match self {
            Metric::Bias => value.abs(),
            _ => value,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accuracy metrics for one forecast against ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error over the non-excluded points (None if all excluded)
    pub mape: Option<f64>,
    /// Points excluded from MAPE for near-zero ground truth
    pub mape_excluded: usize,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// Mean signed error, predicted minus actual
    pub bias: f64,
    /// Empirical interval coverage (None without intervals)
    pub coverage: Option<f64>,
}

impl AccuracyMetrics {
    /// Flatten into the metric map stored by the scoreboard.
    pub fn to_map(&self) -> BTreeMap<Metric, f64> {
        let mut map = BTreeMap::new();
        map.insert(Metric::Mae, self.mae);
        map.insert(Metric::Mse, self.mse);
        map.insert(Metric::Rmse, self.rmse);
        if let Some(mape) = self.mape {
            map.insert(Metric::Mape, mape);
        }
        map.insert(Metric::MapeExcluded, self.mape_excluded as f64);
        map.insert(Metric::Smape, self.smape);
        map.insert(Metric::Bias, self.bias);
        if let Some(coverage) = self.coverage {
            map.insert(Metric::Coverage, coverage);
        }
        map
    }
}

/// Calculate accuracy metrics between actual and predicted values.
///
/// Returns `None` for empty or length-mismatched input.
///
/// # Example
/// ```
/// use airq_forecast::utils::metrics::calculate_metrics;
///
/// let m = calculate_metrics(&[0.0, 10.0, 20.0], &[1.0, 9.0, 22.0], 1e-8).unwrap();
/// assert_eq!(m.mape_excluded, 1);
/// assert!((m.mape.unwrap() - 10.0).abs() < 1e-12);
/// ```
pub fn calculate_metrics(
    actual: &[f64],
    predicted: &[f64],
    zero_threshold: f64,
) -> Option<AccuracyMetrics> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }

    let n = actual.len() as f64;
    let pairs = || actual.iter().zip(predicted.iter());

    let mae = pairs().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let mse = pairs().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();
    let bias = pairs().map(|(a, p)| p - a).sum::<f64>() / n;

    // MAPE over points with non-negligible ground truth
    let (mape_sum, mape_count) = pairs()
        .filter(|(a, _)| a.abs() > zero_threshold)
        .fold((0.0, 0usize), |(sum, count), (a, p)| {
            (sum + ((a - p) / a).abs(), count + 1)
        });
    let mape_excluded = actual.len() - mape_count;
    let mape = (mape_count > 0).then(|| 100.0 * mape_sum / mape_count as f64);

    let smape = pairs()
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n;

    Some(AccuracyMetrics {
        mae,
        mse,
        rmse,
        mape,
        mape_excluded,
        smape,
        bias,
        coverage: None,
    })
}

/// Score a forecast, including interval coverage when the forecast has intervals.
pub fn evaluate_forecast(
    actual: &[f64],
    forecast: &ForecastResult,
    zero_threshold: f64,
) -> Option<AccuracyMetrics> {
    let mut metrics = calculate_metrics(actual, forecast.point(), zero_threshold)?;
    if let (Some(lower), Some(upper)) = (forecast.lower(), forecast.upper()) {
        let inside = actual
            .iter()
            .zip(lower.iter().zip(upper))
            .filter(|(a, (lo, hi))| *lo <= *a && *a <= *hi)
            .count();
        metrics.coverage = Some(inside as f64 / actual.len() as f64);
    }
    Some(metrics)
}

/// Root mean squared error between two slices; NaN for bad input.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}
