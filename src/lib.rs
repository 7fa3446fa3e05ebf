//! # airq-forecast
//!
//! Multi-model backtesting and ensemble forecasting for air-quality series.
//!
//! A run takes one immutable [`TimeSeriesFrame`](core::TimeSeriesFrame), cuts it
//! into rolling-origin folds, fits every configured model on every fold in
//! parallel, scores the forecasts, and combines the final fold's forecasts into
//! one ensemble forecast. Failures of a model on a fold are recorded, not fatal.
//!
//! Models: autoregressive with configurable differencing, trend/seasonal
//! decomposition, and a seeded bagged regression-tree ensemble.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod backtest;
pub mod config;
pub mod core;
pub mod ensemble;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod scoreboard;
pub mod store;
pub mod utils;

pub use error::{OrchestratorError, Result};

pub mod prelude {
    pub use crate::backtest::{CancellationToken, FoldAudit, FoldConfig, ModelStatus, WindowMode};
    pub use crate::config::{ExecutionConfig, RunConfig};
    pub use crate::core::{
        CovariateBlock, FeatureKind, FeatureSchema, FeatureSpec, ForecastResult, Frequency,
        TimeSeriesFrame,
    };
    pub use crate::ensemble::{CombineScope, EnsembleConfig, EnsembleWeights, WeightingStrategy};
    pub use crate::error::{OrchestratorError, Result};
    pub use crate::models::{
        AutoregressiveParams, DecompositionParams, ModelConfig, ModelVariant, TreeEnsembleParams,
    };
    pub use crate::orchestrator::{ForecastOrchestrator, RunReport};
    pub use crate::scoreboard::{Scoreboard, ScoreboardSummary};
    pub use crate::store::{InMemoryStore, Measurement, Pollutant, SeriesStore};
    pub use crate::utils::metrics::{AccuracyMetrics, Metric};
}
