//! Autoregressive adapter: AR(p) on a d-times differenced target.
//!
//! The differencing order is configuration, never auto-detected, so the same
//! training window always yields the same model. Optional exogenous regressors
//! are removed by OLS first; the AR part then models what they leave behind.

use crate::core::{CovariateBlock, ForecastResult, TimeSeriesFrame};
use crate::error::{FitError, PredictError};
use crate::models::diff::{cumulate, difference, integrate};
use crate::models::{check_horizon, FittedModel, ModelAdapter, ModelVariant};
use crate::utils::ols::{ols_fit, OlsResult};
use crate::utils::stats::{first_non_finite, z_for_level};
use serde::{Deserialize, Serialize};

/// Hyperparameters of the autoregressive adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoregressiveParams {
    /// AR order (p).
    pub order: usize,
    /// Differencing order (d).
    pub differencing: usize,
    /// Fit a constant on the differenced scale (drift when d = 1).
    pub include_intercept: bool,
    /// Covariates regressed out before the AR fit.
    pub exogenous: Vec<String>,
}

impl Default for AutoregressiveParams {
    fn default() -> Self {
        Self {
            order: 1,
            differencing: 1,
            include_intercept: true,
            exogenous: Vec::new(),
        }
    }
}

impl AutoregressiveParams {
    pub fn new(order: usize, differencing: usize) -> Self {
        Self {
            order,
            differencing,
            ..Default::default()
        }
    }

    pub fn with_exogenous(mut self, names: Vec<String>) -> Self {
        self.exogenous = names;
        self
    }

    pub fn without_intercept(mut self) -> Self {
        self.include_intercept = false;
        self
    }

    /// Minimum training length for this order and differencing.
    pub fn min_observations(&self) -> usize {
        self.differencing + 2 * self.order + usize::from(self.include_intercept) + 1
    }
}

/// Autoregressive model family behind the adapter contract.
#[derive(Debug, Clone)]
pub struct AutoregressiveAdapter {
    id: String,
    params: AutoregressiveParams,
    max_horizon: usize,
    interval_level: f64,
}

impl AutoregressiveAdapter {
    pub fn new(
        id: impl Into<String>,
        params: AutoregressiveParams,
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

    fn exogenous_columns<'a>(&self, train: &'a TimeSeriesFrame) -> Result<Vec<&'a [f64]>, FitError> {
        self.params
            .exogenous
            .iter()
            .map(|name| {
                let column = train.covariate(name).ok_or_else(|| {
                    FitError::DegenerateInput(format!("exogenous column '{name}' not in frame"))
                })?;
                if let Some(index) = first_non_finite(column) {
                    return Err(FitError::NonFiniteInput { index });
                }
                Ok(column)
            })
            .collect()
    }
}

impl ModelAdapter for AutoregressiveAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ModelVariant {
        ModelVariant::Autoregressive
    }

    fn required_covariates(&self) -> &[String] {
        &self.params.exogenous
    }

    fn fit(&self, train: &TimeSeriesFrame) -> Result<Box<dyn FittedModel>, FitError> {
        let y = train.target();
        let n = y.len();
        let p = self.params.order;
        let d = self.params.differencing;

        if p == 0 {
            return Err(FitError::InvalidHyperparameter(
                "autoregressive order must be at least 1".into(),
            ));
        }
        let needed = self.params.min_observations();
        if n < needed {
            return Err(FitError::InsufficientHistory { needed, got: n });
        }
        if let Some(index) = first_non_finite(y) {
            return Err(FitError::NonFiniteInput { index });
        }

        // Remove exogenous effects first
        let exog_columns = self.exogenous_columns(train)?;
        let (exog_fit, level) = if exog_columns.is_empty() {
            (None, y.to_vec())
        } else {
            let fit = ols_fit(y, &exog_columns, true)?;
            let mut row = vec![0.0; exog_columns.len()];
            let residual: Vec<f64> = (0..n)
                .map(|t| {
                    for (j, col) in exog_columns.iter().enumerate() {
                        row[j] = col[t];
                    }
                    y[t] - fit.predict_row(&row)
                })
                .collect();
            (Some(fit), residual)
        };

        // Lag regression on the differenced series
        let z = difference(&level, d);
        let rows = z.len() - p;
        let lag_columns: Vec<Vec<f64>> = (1..=p)
            .map(|lag| (0..rows).map(|t| z[t + p - lag]).collect())
            .collect();
        let lag_refs: Vec<&[f64]> = lag_columns.iter().map(|c| c.as_slice()).collect();
        let ar_fit = ols_fit(&z[p..], &lag_refs, self.params.include_intercept)?;

        let sigma2 = ar_fit.sigma2();
        if !sigma2.is_finite() {
            return Err(FitError::DegenerateInput("residual variance is not finite".into()));
        }

        Ok(Box::new(FittedAutoregressive {
            phi: ar_fit.coefficients.clone(),
            intercept: ar_fit.intercept,
            differencing: d,
            z_tail: z[z.len() - p..].to_vec(),
            level_tail: level[n - (d + 1).min(n)..].to_vec(),
            exogenous: self.params.exogenous.clone(),
            exog_fit,
            sigma2,
            max_horizon: self.max_horizon,
            interval_level: self.interval_level,
        }))
    }
}

/// Parameters of one autoregressive fit.
#[derive(Debug, Clone)]
struct FittedAutoregressive {
    phi: Vec<f64>,
    intercept: f64,
    differencing: usize,
    /// Last p values on the differenced scale.
    z_tail: Vec<f64>,
    /// Last d+1 undifferenced values, anchors for integration.
    level_tail: Vec<f64>,
    exogenous: Vec<String>,
    exog_fit: Option<OlsResult>,
    sigma2: f64,
    max_horizon: usize,
    interval_level: f64,
}

impl FittedAutoregressive {
    /// MA(∞) weights of the integrated process.
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let p = self.phi.len();
        let mut psi = vec![0.0; horizon];
        if horizon > 0 {
            psi[0] = 1.0;
        }
        for j in 1..horizon {
            psi[j] = (1..=p.min(j)).map(|i| self.phi[i - 1] * psi[j - i]).sum();
        }
        cumulate(&psi, self.differencing)
    }
}

impl FittedModel for FittedAutoregressive {
    fn predict(
        &self,
        horizon: usize,
        test: &CovariateBlock,
    ) -> Result<ForecastResult, PredictError> {
        check_horizon(horizon, self.max_horizon)?;
        let timestamps = test.horizon_timestamps(horizon)?;
        let exog = test.select(&self.exogenous, horizon)?;
        for row in 0..horizon {
            if exog.iter().any(|col| !col[row].is_finite()) {
                return Err(PredictError::NonFiniteCovariate { row });
            }
        }

        // Recursive forecast on the differenced scale
        let p = self.phi.len();
        let mut buffer = self.z_tail.clone();
        for _ in 0..horizon {
            let len = buffer.len();
            let next = self.intercept
                + (1..=p)
                    .map(|lag| self.phi[lag - 1] * buffer[len - lag])
                    .sum::<f64>();
            buffer.push(next);
        }
        let z_future = &buffer[p..];
        let mut point = integrate(z_future, &self.level_tail, self.differencing);

        if let Some(fit) = &self.exog_fit {
            let mut row = vec![0.0; exog.len()];
            for (t, value) in point.iter_mut().enumerate() {
                for (j, col) in exog.iter().enumerate() {
                    row[j] = col[t];
                }
                *value += fit.predict_row(&row);
            }
        }

        let z = z_for_level(self.interval_level);
        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for (h, value) in point.iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(value - half_width);
            upper.push(value + half_width);
        }

        Ok(ForecastResult::from_values_with_intervals(
            timestamps, point, lower, upper,
        ))
    }

    fn max_horizon(&self) -> usize {
        self.max_horizon
    }
}
