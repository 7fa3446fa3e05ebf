//! Combination of per-model forecasts into one ensemble forecast.

mod combiner;
mod stacking;
mod weights;

pub use combiner::{EnsembleCombiner, ENSEMBLE_ID};
pub use stacking::nnls;
pub use weights::EnsembleWeights;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default guard added to historical RMSE before inverting it.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// How member weights are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingStrategy {
    #[default]
    Uniform,
    /// Weight proportional to `1 / (mean RMSE + epsilon)`.
    InverseError,
    /// Non-negative regression of actuals on out-of-fold member predictions.
    Stacked,
}

impl fmt::Display for WeightingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WeightingStrategy::Uniform => "uniform",
            WeightingStrategy::InverseError => "inverse_error",
            WeightingStrategy::Stacked => "stacked",
        })
    }
}

/// Which folds the combiner produces forecasts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineScope {
    /// Only the most recent processed fold.
    #[default]
    LatestFold,
    /// Every processed fold; the ensemble is scored like a member model.
    AllFolds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub strategy: WeightingStrategy,
    pub epsilon: f64,
    pub scope: CombineScope,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy: WeightingStrategy::Uniform,
            epsilon: DEFAULT_EPSILON,
            scope: CombineScope::LatestFold,
        }
    }
}

impl EnsembleConfig {
    pub fn new(strategy: WeightingStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_scope(mut self, scope: CombineScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(ConfigError::InvalidEpsilon(self.epsilon));
        }
        Ok(())
    }
}
