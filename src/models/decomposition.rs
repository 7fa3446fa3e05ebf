//! Decomposition adapter: trend + seasonal + residual.
//!
//! The series is split with a centered moving average (2×m when the period is
//! even). Seasonal indices are phase means of the detrended values, normalised
//! to sum to zero. The forecast is a linear trend fitted to the deseasonalised
//! series, extended forward, plus the repeating seasonal pattern. The residual
//! is assumed zero-mean and only widens the intervals.

use crate::core::{CovariateBlock, ForecastResult, TimeSeriesFrame};
use crate::error::{FitError, PredictError};
use crate::models::{check_horizon, FittedModel, ModelAdapter, ModelVariant};
use crate::utils::ols::ols_fit;
use crate::utils::stats::{first_non_finite, mean, z_for_level};
use serde::{Deserialize, Serialize};

/// Hyperparameters of the decomposition adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionParams {
    /// Seasonal period in observations (7 for weekly cycles in daily data).
    pub period: usize,
    /// Fit the trend line on only the most recent observations.
    pub trend_window: Option<usize>,
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            period: 7,
            trend_window: None,
        }
    }
}

impl DecompositionParams {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            trend_window: None,
        }
    }

    pub fn with_trend_window(mut self, window: usize) -> Self {
        self.trend_window = Some(window);
        self
    }
}

/// Decomposition model family behind the adapter contract.
#[derive(Debug, Clone)]
pub struct DecompositionAdapter {
    id: String,
    params: DecompositionParams,
    max_horizon: usize,
    interval_level: f64,
}

impl DecompositionAdapter {
    pub fn new(
        id: impl Into<String>,
        params: DecompositionParams,
        max_horizon: usize,
        interval_level: f64,
    ) -> Self {
        Self {
            id: id.into(),
            params,
            max_horizon,
            interval_level,
        }
    }
}

/// Centered moving average; `None` where the window does not fit.
pub fn centered_moving_average(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let half = period / 2;
    let mut trend = vec![None; n];
    if period == 0 || n < 2 * half + 1 {
        return trend;
    }

    for (i, slot) in trend.iter_mut().enumerate().take(n - half).skip(half) {
        let value = if period % 2 == 1 {
            values[i - half..=i + half].iter().sum::<f64>() / period as f64
        } else {
            // 2×m filter: half weights on the two outermost points
            let inner: f64 = values[i - half + 1..i + half].iter().sum();
            (inner + 0.5 * (values[i - half] + values[i + half])) / period as f64
        };
        *slot = Some(value);
    }
    trend
}

/// Seasonal indices by phase, normalised to sum to zero.
pub fn seasonal_indices(values: &[f64], trend: &[Option<f64>], period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, (value, level)) in values.iter().zip(trend).enumerate() {
        if let Some(level) = level {
            sums[i % period] += value - level;
            counts[i % period] += 1;
        }
    }
    let raw: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();
    let offset = mean(&raw);
    raw.iter().map(|s| s - offset).collect()
}

impl ModelAdapter for DecompositionAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ModelVariant {
        ModelVariant::Decomposition
    }

    fn required_covariates(&self) -> &[String] {
        &[]
    }

    fn fit(&self, train: &TimeSeriesFrame) -> Result<Box<dyn FittedModel>, FitError> {
        let y = train.target();
        let n = y.len();
        let period = self.params.period;

        if period < 2 {
            return Err(FitError::InvalidHyperparameter(
                "seasonal period must be at least 2".into(),
            ));
        }
        // Two full cycles are needed to separate season from trend
        if n < 2 * period {
            return Err(FitError::InsufficientHistory {
                needed: 2 * period,
                got: n,
            });
        }
        if let Some(index) = first_non_finite(y) {
            return Err(FitError::NonFiniteInput { index });
        }

        let trend = centered_moving_average(y, period);
        let seasonal = seasonal_indices(y, &trend, period);

        let deseasonalised: Vec<f64> = y
            .iter()
            .enumerate()
            .map(|(i, v)| v - seasonal[i % period])
            .collect();

        let window = self.params.trend_window.unwrap_or(n).clamp(3, n);
        let start = n - window;
        let time: Vec<f64> = (start..n).map(|t| t as f64).collect();
        let line = ols_fit(&deseasonalised[start..], &[&time], true)?;

        let t_mean = mean(&time);
        let sxx: f64 = time.iter().map(|t| (t - t_mean).powi(2)).sum();

        Ok(Box::new(FittedDecomposition {
            seasonal,
            intercept: line.intercept,
            slope: line.coefficients[0],
            sigma: line.sigma2().sqrt(),
            n_train: n,
            window,
            t_mean,
            sxx,
            max_horizon: self.max_horizon,
            interval_level: self.interval_level,
        }))
    }
}

#[derive(Debug, Clone)]
struct FittedDecomposition {
    seasonal: Vec<f64>,
    intercept: f64,
    slope: f64,
    sigma: f64,
    n_train: usize,
    window: usize,
    t_mean: f64,
    sxx: f64,
    max_horizon: usize,
    interval_level: f64,
}

impl FittedModel for FittedDecomposition {
    fn predict(
        &self,
        horizon: usize,
        test: &CovariateBlock,
    ) -> Result<ForecastResult, PredictError> {
        check_horizon(horizon, self.max_horizon)?;
        let timestamps = test.horizon_timestamps(horizon)?;

        let z = z_for_level(self.interval_level);
        let period = self.seasonal.len();
        let mut point = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);

        for h in 1..=horizon {
            let t = (self.n_train - 1 + h) as f64;
            let value = self.intercept + self.slope * t + self.seasonal[(self.n_train - 1 + h) % period];
            let leverage = if self.sxx > 0.0 {
                (t - self.t_mean).powi(2) / self.sxx
            } else {
                0.0
            };
            let se = self.sigma * (1.0 + 1.0 / self.window as f64 + leverage).sqrt();
            point.push(value);
            lower.push(value - z * se);
            upper.push(value + z * se);
        }

        Ok(ForecastResult::from_values_with_intervals(
            timestamps, point, lower, upper,
        ))
    }

    fn max_horizon(&self) -> usize {
        self.max_horizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frequency;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::f64::consts::PI;

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    fn weekly(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 30.0 + 0.1 * i as f64 + 5.0 * (2.0 * PI * i as f64 / 7.0).sin())
            .collect()
    }

    fn frame(values: Vec<f64>) -> TimeSeriesFrame {
        let n = values.len();
        TimeSeriesFrame::univariate(days(n), values, Frequency::Fixed(Duration::days(1))).unwrap()
    }

    #[test]
    fn moving_average_handles_odd_and_even_periods() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let odd = centered_moving_average(&values, 3);
        assert_eq!(odd[0], None);
        assert_relative_eq!(odd[1].unwrap(), 1.0);
        assert_eq!(odd[9], None);

        let even = centered_moving_average(&values, 4);
        assert_eq!(even[1], None);
        // Linear input: the 2x4 average reproduces the center value
        assert_relative_eq!(even[2].unwrap(), 2.0);
        assert_relative_eq!(even[7].unwrap(), 7.0);
        assert_eq!(even[8], None);
    }

    #[test]
    fn seasonal_indices_sum_to_zero() {
        let values = weekly(70);
        let trend = centered_moving_average(&values, 7);
        let seasonal = seasonal_indices(&values, &trend, 7);
        assert_eq!(seasonal.len(), 7);
        assert_relative_eq!(seasonal.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn forecasts_trend_plus_season() {
        let values = weekly(84);
        let adapter = DecompositionAdapter::new("dec", DecompositionParams::new(7), 14, 0.95);
        let fitted = adapter.fit(&frame(values[..70].to_vec())).unwrap();

        let block = CovariateBlock::timestamps_only(days(84)[70..].to_vec());
        let forecast = fitted.predict(14, &block).unwrap();

        for (pred, actual) in forecast.point().iter().zip(&values[70..]) {
            assert!((pred - actual).abs() < 0.5, "pred {pred} vs {actual}");
        }
        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();
        assert!(lower.iter().zip(upper).all(|(l, u)| l <= u));
    }

    #[test]
    fn needs_two_full_cycles() {
        let adapter = DecompositionAdapter::new("dec", DecompositionParams::new(7), 14, 0.95);
        let err = adapter.fit(&frame(weekly(13))).err().unwrap();
        assert_eq!(err, FitError::InsufficientHistory { needed: 14, got: 13 });
        assert!(adapter.fit(&frame(weekly(14))).is_ok());
    }

    #[test]
    fn rejects_non_finite_target() {
        let mut values = weekly(30);
        values[3] = f64::INFINITY;
        let adapter = DecompositionAdapter::new("dec", DecompositionParams::new(7), 14, 0.95);
        assert_eq!(
            adapter.fit(&frame(values)).err().unwrap(),
            FitError::NonFiniteInput { index: 3 }
        );
    }

    #[test]
    fn trend_window_limits_line_fit() {
        // Level shift halfway: a short trend window follows the recent level
        let mut values = vec![10.0; 28];
        values.extend(vec![50.0; 28]);
        let values: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.01 * ((i * 5) % 7) as f64)
            .collect();

        let params = DecompositionParams::new(7).with_trend_window(14);
        let fitted = DecompositionAdapter::new("dec", params, 7, 0.95)
            .fit(&frame(values))
            .unwrap();
        let block = CovariateBlock::timestamps_only(days(63)[56..].to_vec());
        let forecast = fitted.predict(7, &block).unwrap();
        let level = forecast.point().iter().sum::<f64>() / 7.0;
        assert!((level - 50.0).abs() < 4.0, "level {level}");
    }
}
