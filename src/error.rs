//! Error types for the backtesting and ensemble engine.
//!
//! Errors are split by the stage that raises them. Configuration and schema
//! errors abort a run before any fold starts; fit and predict errors stay local
//! to one model on one fold and end up in the scoreboard as failed entries.

use thiserror::Error;

/// Crate-level result alias; the orchestrator's error wraps every other stage.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Problems building or slicing a [`TimeSeriesFrame`](crate::core::TimeSeriesFrame).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    /// Two parallel columns disagree on length.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Timestamps are not strictly increasing at `index`.
    #[error("timestamps must be strictly increasing (violated at index {index})")]
    NonIncreasingTimestamps { index: usize },

    /// The gap before `index` does not match the declared fixed frequency.
    #[error("timestamp at index {index} does not match the declared frequency")]
    FrequencyMismatch { index: usize },

    /// A value does not fit the declared feature kind.
    #[error("column '{column}' has a value at index {index} that is not a valid {kind}")]
    InvalidFeatureValue {
        column: String,
        index: usize,
        kind: &'static str,
    },

    /// A requested row range falls outside the frame.
    #[error("range {start}..{end} out of bounds (size: {len})")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    /// The frame has no rows.
    #[error("frame is empty")]
    Empty,

    /// Schema-level problem (duplicate or unknown columns).
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Covariate schema mismatches.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The same column name appears twice in a schema.
    #[error("duplicate covariate column '{0}'")]
    DuplicateColumn(String),

    /// A model requires covariates the frame does not provide.
    #[error("model '{model_id}' requires covariates not present in the frame: {missing:?}")]
    MissingColumns {
        model_id: String,
        missing: Vec<String>,
    },
}

/// Invalid fold, ensemble, model or execution configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A size parameter that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroParameter(&'static str),

    /// The series is too short to produce a single fold.
    #[error("insufficient history: need at least {needed} observations, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// No models were configured.
    #[error("at least one model must be configured")]
    NoModels,

    /// Two model configurations share an id.
    #[error("duplicate model id '{0}'")]
    DuplicateModelId(String),

    /// A model id collides with an id the engine reserves.
    #[error("model id '{0}' is reserved")]
    ReservedModelId(String),

    /// Hyperparameters failed validation.
    #[error("model '{model_id}': {reason}")]
    InvalidHyperparameter { model_id: String, reason: String },

    /// The ensemble epsilon must be finite and positive.
    #[error("ensemble epsilon must be finite and positive, got {0}")]
    InvalidEpsilon(f64),

    /// A numeric option is outside its allowed range.
    #[error("invalid value for {name}: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    /// The configuration document could not be parsed.
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Fit failures, local to one model on one fold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Not enough training rows for the configured lag or seasonal order.
    #[error("insufficient history: need at least {needed}, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// NaN or infinite value in the training data.
    #[error("non-finite value at index {index}")]
    NonFiniteInput { index: usize },

    /// The design matrix is singular or otherwise unusable.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Hyperparameters that cannot be fitted.
    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    /// The caller gave up on the fit before it finished.
    #[error("fit abandoned before completion")]
    Aborted,
}

/// Predict failures, local to one model on one fold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    /// The requested horizon exceeds the model's configured maximum.
    #[error("horizon {requested} exceeds configured maximum {max}")]
    HorizonTooLarge { requested: usize, max: usize },

    /// The covariate block lacks rows for the horizon.
    #[error("covariate rows missing: need {expected}, got {got}")]
    MissingCovariates { expected: usize, got: usize },

    /// The covariate block lacks a required column.
    #[error("covariate column '{0}' missing from prediction input")]
    MissingColumn(String),

    /// A covariate needed for prediction is NaN or infinite.
    #[error("non-finite covariate at row {row}")]
    NonFiniteCovariate { row: usize },

    /// The model returned a forecast of the wrong length.
    #[error("forecast has {got} points, expected {expected}")]
    WrongLength { expected: usize, got: usize },

    /// The model produced a NaN or infinite point forecast.
    #[error("non-finite forecast at step {step}")]
    NonFiniteForecast { step: usize },
}

/// Combination failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnsembleError {
    /// Every model failed, nothing to combine.
    #[error("no viable models to combine{}", fold_suffix(.fold_id))]
    NoViableModels { fold_id: Option<usize> },

    /// Model forecasts do not share the same timestamps.
    #[error("forecast of model '{model_id}' is not aligned with the other members")]
    MisalignedForecasts { model_id: String },

    /// The weight set does not cover a contributing model.
    #[error("no weight for model '{0}'")]
    MissingWeight(String),
}

fn fold_suffix(fold_id: &Option<usize>) -> String {
    match fold_id {
        Some(id) => format!(" for fold {id}"),
        None => String::new(),
    }
}

/// Why a model produced no forecast for one fold.
///
/// This is what the scoreboard and the audit log record for failed entries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    #[error("fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("predict failed: {0}")]
    Predict(#[from] PredictError),

    #[error("timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("adapter panicked: {0}")]
    Panicked(String),

    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("combination failed: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("fold input invalid: {0}")]
    Frame(#[from] FrameError),
}

/// Unrecoverable run failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    /// Every model failed on every fold that ran.
    #[error("no model produced a forecast on any of the {folds} folds")]
    NoSuccessfulFolds { folds: usize },

    /// The worker pool could not be created.
    #[error("could not start worker pool: {0}")]
    WorkerPool(String),

    /// Cancellation arrived before any fold started.
    #[error("run cancelled before any fold started")]
    Cancelled,
}
