//! Per-model configuration and the adapter factory.

use crate::backtest::CancellationToken;
use crate::error::ConfigError;
use crate::models::autoregressive::{AutoregressiveAdapter, AutoregressiveParams};
use crate::models::decomposition::{DecompositionAdapter, DecompositionParams};
use crate::models::tree::{TreeEnsembleAdapter, TreeEnsembleParams};
use crate::models::{BoxedAdapter, ModelVariant};
use serde::{Deserialize, Serialize};

/// Default maximum forecast horizon accepted by a fitted model.
pub const DEFAULT_MAX_HORIZON: usize = 30;

/// Default prediction interval coverage.
pub const DEFAULT_INTERVAL_LEVEL: f64 = 0.95;

fn default_max_horizon() -> usize {
    DEFAULT_MAX_HORIZON
}

fn default_interval_level() -> f64 {
    DEFAULT_INTERVAL_LEVEL
}

/// Variant-specific hyperparameters, tagged by `variant`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Hyperparameters {
    Autoregressive(AutoregressiveParams),
    Decomposition(DecompositionParams),
    TreeEnsemble(TreeEnsembleParams),
}

impl Hyperparameters {
    pub fn variant(&self) -> ModelVariant {
        match self {
            Hyperparameters::Autoregressive(_) => ModelVariant::Autoregressive,
            Hyperparameters::Decomposition(_) => ModelVariant::Decomposition,
            Hyperparameters::TreeEnsemble(_) => ModelVariant::TreeEnsemble,
        }
    }
}

/// One configured model: identity, hyperparameters and seed.
///
/// The config is an immutable value; [`ModelConfig::build`] creates a fresh
/// adapter from it for every fold task.
///
/// # Example
///
/// ```
/// use airq_forecast::models::{ModelConfig, ModelVariant};
/// use airq_forecast::models::autoregressive::AutoregressiveParams;
///
/// let config = ModelConfig::autoregressive("ar3", AutoregressiveParams::new(3, 1))
///     .with_max_horizon(14);
/// let adapter = config.build();
/// assert_eq!(adapter.id(), "ar3");
/// assert_eq!(adapter.variant(), ModelVariant::Autoregressive);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub hyperparameters: Hyperparameters,
    #[serde(default)]
    pub random_seed: u64,
    #[serde(default = "default_max_horizon")]
    pub max_horizon: usize,
    #[serde(default = "default_interval_level")]
    pub interval_level: f64,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, hyperparameters: Hyperparameters) -> Self {
        Self {
            id: id.into(),
            hyperparameters,
            random_seed: 0,
            max_horizon: DEFAULT_MAX_HORIZON,
            interval_level: DEFAULT_INTERVAL_LEVEL,
        }
    }

    pub fn autoregressive(id: impl Into<String>, params: AutoregressiveParams) -> Self {
        Self::new(id, Hyperparameters::Autoregressive(params))
    }

    pub fn decomposition(id: impl Into<String>, params: DecompositionParams) -> Self {
        Self::new(id, Hyperparameters::Decomposition(params))
    }

    pub fn tree_ensemble(id: impl Into<String>, params: TreeEnsembleParams) -> Self {
        Self::new(id, Hyperparameters::TreeEnsemble(params))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_max_horizon(mut self, max_horizon: usize) -> Self {
        self.max_horizon = max_horizon;
        self
    }

    pub fn with_interval_level(mut self, level: f64) -> Self {
        self.interval_level = level;
        self
    }

    pub fn variant(&self) -> ModelVariant {
        self.hyperparameters.variant()
    }

    /// Covariates the configured model needs from the frame.
    pub fn required_covariates(&self) -> &[String] {
        match &self.hyperparameters {
            Hyperparameters::Autoregressive(p) => &p.exogenous,
            Hyperparameters::Decomposition(_) => &[],
            Hyperparameters::TreeEnsemble(p) => &p.features,
        }
    }

    /// Check hyperparameters before any fold runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidHyperparameter {
            model_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("model id must not be empty"));
        }
        if self.max_horizon == 0 {
            return Err(invalid("max_horizon must be greater than zero"));
        }
        if !(self.interval_level > 0.0 && self.interval_level < 1.0) {
            return Err(invalid("interval_level must lie strictly between 0 and 1"));
        }

        match &self.hyperparameters {
            Hyperparameters::Autoregressive(p) => {
                if p.order == 0 {
                    return Err(invalid("autoregressive order must be at least 1"));
                }
            }
            Hyperparameters::Decomposition(p) => {
                if p.period < 2 {
                    return Err(invalid("seasonal period must be at least 2"));
                }
            }
            Hyperparameters::TreeEnsemble(p) => {
                if p.n_trees == 0 {
                    return Err(invalid("n_trees must be at least 1"));
                }
                if p.max_depth == 0 || p.min_samples_leaf == 0 {
                    return Err(invalid("max_depth and min_samples_leaf must be at least 1"));
                }
                if p.features.is_empty() {
                    return Err(invalid("tree ensemble needs at least one feature column"));
                }
                if !(p.feature_fraction > 0.0 && p.feature_fraction <= 1.0) {
                    return Err(invalid("feature_fraction must lie in (0, 1]"));
                }
            }
        }
        Ok(())
    }

    /// Create a fresh adapter instance.
    pub fn build(&self) -> BoxedAdapter {
        self.build_abortable(CancellationToken::new())
    }

    /// Like [`ModelConfig::build`], but long-running fits stop early once
    /// `abort` is raised.
    pub(crate) fn build_abortable(&self, abort: CancellationToken) -> BoxedAdapter {
        match &self.hyperparameters {
            Hyperparameters::Autoregressive(p) => Box::new(AutoregressiveAdapter::new(
                self.id.clone(),
                p.clone(),
                self.max_horizon,
                self.interval_level,
            )),
            Hyperparameters::Decomposition(p) => Box::new(DecompositionAdapter::new(
                self.id.clone(),
                p.clone(),
                self.max_horizon,
                self.interval_level,
            )),
            Hyperparameters::TreeEnsemble(p) => Box::new(
                TreeEnsembleAdapter::new(
                    self.id.clone(),
                    p.clone(),
                    self.random_seed,
                    self.max_horizon,
                    self.interval_level,
                )
                .with_abort(abort),
            ),
        }
    }
}
