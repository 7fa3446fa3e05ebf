//! Adapter traits defining the uniform fit/predict contract for all model families.

use crate::core::{CovariateBlock, ForecastResult, TimeSeriesFrame};
use crate::error::{FitError, PredictError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model family tag used for dispatch and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    Autoregressive,
    Decomposition,
    TreeEnsemble,
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelVariant::Autoregressive => "autoregressive",
            ModelVariant::Decomposition => "decomposition",
            ModelVariant::TreeEnsemble => "tree_ensemble",
        })
    }
}

/// Wraps one forecasting algorithm behind a stateless fit call.
///
/// `fit` borrows the adapter immutably and returns the fitted parameters as an
/// owned handle. Nothing fitted is stored on the adapter itself, so a new fold
/// always starts from scratch.
pub trait ModelAdapter: Send + Sync {
    /// Identifier of this configured model.
    fn id(&self) -> &str;

    /// Model family.
    fn variant(&self) -> ModelVariant;

    /// Covariate columns the training and prediction frames must carry.
    fn required_covariates(&self) -> &[String];

    /// Fit the model to a training window.
    fn fit(&self, train: &TimeSeriesFrame) -> Result<Box<dyn FittedModel>, FitError>;
}

/// Parameters produced by a single fit call.
pub trait FittedModel: Send {
    /// Forecast `horizon` steps; `test` supplies timestamps and covariates.
    fn predict(&self, horizon: usize, test: &CovariateBlock)
        -> Result<ForecastResult, PredictError>;

    /// Largest horizon this model accepts.
    fn max_horizon(&self) -> usize;
}

/// Type alias for boxed adapter trait objects.
pub type BoxedAdapter = Box<dyn ModelAdapter>;

/// Reject horizons beyond the configured maximum.
pub(crate) fn check_horizon(horizon: usize, max: usize) -> Result<(), PredictError> {
    if horizon > max {
        return Err(PredictError::HorizonTooLarge {
            requested: horizon,
            max,
        });
    }
    Ok(())
}
