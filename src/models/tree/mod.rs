//! Tree-ensemble adapter: bagged regression trees on covariate columns.
//!
//! Each row of the training window is one sample; the target is regressed on
//! the configured feature columns at the same timestamp. Prediction therefore
//! needs those columns for every forecast step. All randomness (bootstrap
//! draws and per-split feature subsets) comes from one generator seeded by
//! the model config.

mod forest;
mod regression_tree;

use crate::backtest::CancellationToken;
use crate::core::{CovariateBlock, ForecastResult, TimeSeriesFrame};
use crate::error::{FitError, PredictError};
use crate::models::{check_horizon, FittedModel, ModelAdapter, ModelVariant};
use crate::utils::stats::{first_non_finite, z_for_level};
use forest::{fill_row, Forest, ForestSettings};
use regression_tree::TreeSettings;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters of the tree-ensemble adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeEnsembleParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Share of features considered at each split.
    pub feature_fraction: f64,
    /// Draw a bootstrap sample per tree.
    pub bootstrap: bool,
    /// Covariate columns used as regressors.
    pub features: Vec<String>,
}

impl Default for TreeEnsembleParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 6,
            min_samples_leaf: 5,
            feature_fraction: 1.0,
            bootstrap: true,
            features: Vec::new(),
        }
    }
}

impl TreeEnsembleParams {
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn with_feature_fraction(mut self, fraction: f64) -> Self {
        self.feature_fraction = fraction;
        self
    }

    pub fn without_bootstrap(mut self) -> Self {
        self.bootstrap = false;
        self
    }

    fn features_per_split(&self) -> usize {
        let k = self.features.len();
        ((self.feature_fraction * k as f64).ceil() as usize).clamp(1, k.max(1))
    }
}

/// Tree-ensemble model family behind the adapter contract.
#[derive(Debug, Clone)]
pub struct TreeEnsembleAdapter {
    id: String,
    params: TreeEnsembleParams,
    seed: u64,
    max_horizon: usize,
    interval_level: f64,
    abort: CancellationToken,
}

impl TreeEnsembleAdapter {
    pub fn new(
        id: impl Into<String>,
        params: TreeEnsembleParams,
        seed: u64,
        max_horizon: usize,
        interval_level: f64,
    ) -> Self {
        Self {
            id: id.into(),
            params,
            seed,
            max_horizon,
            interval_level,
            abort: CancellationToken::new(),
        }
    }

    /// Give up growing trees once `abort` is raised; the fit then fails with
    /// [`FitError::Aborted`].
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }
}

impl ModelAdapter for TreeEnsembleAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ModelVariant {
        ModelVariant::TreeEnsemble
    }

    fn required_covariates(&self) -> &[String] {
        &self.params.features
    }

    fn fit(&self, train: &TimeSeriesFrame) -> Result<Box<dyn FittedModel>, FitError> {
        let params = &self.params;
        if params.features.is_empty() {
            return Err(FitError::InvalidHyperparameter(
                "tree ensemble needs at least one feature column".into(),
            ));
        }
        if params.n_trees == 0 || params.max_depth == 0 || params.min_samples_leaf == 0 {
            return Err(FitError::InvalidHyperparameter(
                "n_trees, max_depth and min_samples_leaf must be positive".into(),
            ));
        }

        let y = train.target();
        let needed = params.min_samples_leaf.max(2);
        if y.len() < needed {
            return Err(FitError::InsufficientHistory {
                needed,
                got: y.len(),
            });
        }
        if let Some(index) = first_non_finite(y) {
            return Err(FitError::NonFiniteInput { index });
        }

        let columns = params
            .features
            .iter()
            .map(|name| {
                let column = train.covariate(name).ok_or_else(|| {
                    FitError::DegenerateInput(format!("feature column '{name}' not in frame"))
                })?;
                match first_non_finite(column) {
                    Some(index) => Err(FitError::NonFiniteInput { index }),
                    None => Ok(column),
                }
            })
            .collect::<Result<Vec<&[f64]>, FitError>>()?;

        let settings = ForestSettings {
            n_trees: params.n_trees,
            bootstrap: params.bootstrap,
            tree: TreeSettings {
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
                features_per_split: params.features_per_split(),
            },
        };
        let forest =
            Forest::fit(&columns, y, &settings, self.seed, &self.abort).ok_or(FitError::Aborted)?;
        debug!(
            model = %self.id,
            trees = params.n_trees,
            oob_rows = forest.oob_rows(),
            sigma = forest.residual_sigma(),
            "forest fitted"
        );

        Ok(Box::new(FittedTreeEnsemble {
            forest,
            features: params.features.clone(),
            max_horizon: self.max_horizon,
            interval_level: self.interval_level,
        }))
    }
}

#[derive(Debug, Clone)]
struct FittedTreeEnsemble {
    forest: Forest,
    features: Vec<String>,
    max_horizon: usize,
    interval_level: f64,
}

impl FittedModel for FittedTreeEnsemble {
    fn predict(
        &self,
        horizon: usize,
        test: &CovariateBlock,
    ) -> Result<ForecastResult, PredictError> {
        check_horizon(horizon, self.max_horizon)?;
        let timestamps = test.horizon_timestamps(horizon)?;
        let columns = test.select(&self.features, horizon)?;

        let half_width = z_for_level(self.interval_level) * self.forest.residual_sigma();
        let mut row = vec![0.0; columns.len()];
        let mut point = Vec::with_capacity(horizon);
        for step in 0..horizon {
            fill_row(&columns, step, &mut row);
            if row.iter().any(|v| !v.is_finite()) {
                return Err(PredictError::NonFiniteCovariate { row: step });
            }
            point.push(self.forest.predict(&row));
        }

        let lower = point.iter().map(|p| p - half_width).collect();
        let upper = point.iter().map(|p| p + half_width).collect();
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
    use crate::core::{FeatureSpec, Frequency};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    /// PM2.5 jumps when wind drops below 3 m/s.
    fn stagnation_frame(n: usize) -> TimeSeriesFrame {
        let wind: Vec<f64> = (0..n).map(|i| ((i * 7) % 10) as f64).collect();
        let humidity: Vec<f64> = (0..n).map(|i| 40.0 + ((i * 3) % 11) as f64).collect();
        let pm25: Vec<f64> = wind
            .iter()
            .enumerate()
            .map(|(i, &w)| (if w < 3.0 { 60.0 } else { 15.0 }) + (i % 3) as f64 * 0.1)
            .collect();
        TimeSeriesFrame::builder()
            .timestamps(days(n))
            .target(pm25)
            .covariate(FeatureSpec::continuous("wind_speed"), wind)
            .covariate(FeatureSpec::continuous("humidity"), humidity)
            .frequency(Frequency::Fixed(Duration::days(1)))
            .build()
            .unwrap()
    }

    fn adapter(seed: u64) -> TreeEnsembleAdapter {
        let params = TreeEnsembleParams::new(vec!["wind_speed".into(), "humidity".into()])
            .with_trees(25)
            .with_min_samples_leaf(2);
        TreeEnsembleAdapter::new("rf", params, seed, 14, 0.9)
    }

    fn block(wind: Vec<f64>) -> CovariateBlock {
        let n = wind.len();
        CovariateBlock::new(
            days(n),
            vec![
                ("wind_speed".to_string(), wind),
                ("humidity".to_string(), vec![45.0; n]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn separates_stagnant_days() {
        let fitted = adapter(42).fit(&stagnation_frame(120)).unwrap();
        let forecast = fitted.predict(2, &block(vec![1.0, 8.0])).unwrap();
        assert!(forecast.point()[0] > 45.0);
        assert!(forecast.point()[1] < 30.0);
        assert!(forecast.has_intervals());
    }

    #[test]
    fn seeded_fits_are_reproducible() {
        let frame = stagnation_frame(80);
        let wind = vec![2.0, 5.0, 9.0];
        let a = adapter(7).fit(&frame).unwrap().predict(3, &block(wind.clone())).unwrap();
        let b = adapter(7).fit(&frame).unwrap().predict(3, &block(wind)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_columns_predict_the_mean() {
        let n = 20;
        let frame = TimeSeriesFrame::builder()
            .timestamps(days(n))
            .target((0..n).map(|i| i as f64).collect())
            .covariate(FeatureSpec::continuous("wind_speed"), vec![4.0; n])
            .covariate(FeatureSpec::continuous("humidity"), vec![50.0; n])
            .build()
            .unwrap();
        let params = TreeEnsembleParams::new(vec!["wind_speed".into(), "humidity".into()])
            .without_bootstrap()
            .with_trees(3);
        let fitted = TreeEnsembleAdapter::new("rf", params, 0, 7, 0.95).fit(&frame).unwrap();
        let forecast = fitted.predict(1, &block(vec![4.0])).unwrap();
        assert!((forecast.point()[0] - 9.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_finite_features() {
        let n = 30;
        let mut wind: Vec<f64> = (0..n).map(|i| i as f64).collect();
        wind[12] = f64::NAN;
        let frame = TimeSeriesFrame::builder()
            .timestamps(days(n))
            .target(vec![1.0; n])
            .covariate(FeatureSpec::continuous("wind_speed"), wind)
            .covariate(FeatureSpec::continuous("humidity"), vec![50.0; n])
            .build()
            .unwrap();
        let err = adapter(1).fit(&frame).err().unwrap();
        assert_eq!(err, FitError::NonFiniteInput { index: 12 });
    }

    #[test]
    fn prediction_requires_feature_columns() {
        let fitted = adapter(3).fit(&stagnation_frame(60)).unwrap();
        let only_wind =
            CovariateBlock::new(days(2), vec![("wind_speed".to_string(), vec![1.0, 2.0])]).unwrap();
        assert_eq!(
            fitted.predict(2, &only_wind).unwrap_err(),
            PredictError::MissingColumn("humidity".into())
        );
        assert!(matches!(
            fitted.predict(3, &block(vec![1.0, 2.0])),
            Err(PredictError::MissingCovariates { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn short_history_is_reported() {
        let err = adapter(0).fit(&stagnation_frame(1)).err().unwrap();
        assert_eq!(err, FitError::InsufficientHistory { needed: 2, got: 1 });
    }

    #[test]
    fn raised_abort_fails_the_fit() {
        let abort = CancellationToken::new();
        abort.cancel();
        let err = adapter(4)
            .with_abort(abort)
            .fit(&stagnation_frame(60))
            .err()
            .unwrap();
        assert_eq!(err, FitError::Aborted);
    }
}
