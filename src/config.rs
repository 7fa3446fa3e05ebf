//! Run-level configuration, loadable from TOML.
//!
//! ```toml
//! [fold]
//! window_mode = "fixed"
//! window_length = 300
//! step = 30
//! horizon = 7
//!
//! [ensemble]
//! strategy = "inverse_error"
//!
//! [execution]
//! max_workers = 4
//! timeout_ms = 5000
//!
//! [[models]]
//! id = "ar"
//! [models.hyperparameters]
//! variant = "autoregressive"
//! order = 2
//! ```

use crate::backtest::{EvaluatorSettings, FoldConfig};
use crate::ensemble::{EnsembleConfig, ENSEMBLE_ID};
use crate::error::ConfigError;
use crate::models::ModelConfig;
use crate::utils::metrics::DEFAULT_ZERO_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Worker pool, timeout and scoring options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads; unset uses one per core.
    pub max_workers: Option<usize>,
    /// Limit for a single fit+predict call, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Actuals with magnitude at or below this are left out of MAPE.
    pub mape_zero_threshold: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            timeout_ms: None,
            mape_zero_threshold: DEFAULT_ZERO_THRESHOLD,
        }
    }
}

impl ExecutionConfig {
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_mape_zero_threshold(mut self, threshold: f64) -> Self {
        self.mape_zero_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::ZeroParameter("max_workers"));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroParameter("timeout_ms"));
        }
        if !(self.mape_zero_threshold.is_finite() && self.mape_zero_threshold >= 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "mape_zero_threshold",
                value: self.mape_zero_threshold,
            });
        }
        Ok(())
    }

    pub(crate) fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            max_workers: self.max_workers,
            timeout: self.timeout_ms.map(Duration::from_millis),
            mape_zero_threshold: self.mape_zero_threshold,
        }
    }
}

/// Everything one orchestrated run needs besides the data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub fold: FoldConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl RunConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fold.validate()?;
        self.ensemble.validate()?;
        self.execution.validate()?;
        validate_models(&self.models)
    }
}

/// Model list checks shared by [`RunConfig`] and direct orchestrator calls.
pub(crate) fn validate_models(models: &[ModelConfig]) -> Result<(), ConfigError> {
    if models.is_empty() {
        return Err(ConfigError::NoModels);
    }
    let mut seen = HashSet::new();
    for model in models {
        if model.id == ENSEMBLE_ID {
            return Err(ConfigError::ReservedModelId(model.id.clone()));
        }
        if !seen.insert(model.id.as_str()) {
            return Err(ConfigError::DuplicateModelId(model.id.clone()));
        }
        model.validate()?;
    }
    Ok(())
}
