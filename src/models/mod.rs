//! Forecasting model adapters.
//!
//! Three families sit behind [`ModelAdapter`]: an autoregressive model on the
//! differenced target, a trend/seasonal decomposition, and a bagged tree
//! ensemble over covariates. [`ModelConfig`] is the serialisable description
//! that builds a fresh adapter per fold.

mod traits;

pub mod autoregressive;
pub mod config;
pub mod decomposition;
pub mod diff;
pub mod tree;

pub use autoregressive::{AutoregressiveAdapter, AutoregressiveParams};
pub use config::{Hyperparameters, ModelConfig, DEFAULT_INTERVAL_LEVEL, DEFAULT_MAX_HORIZON};
pub use decomposition::{DecompositionAdapter, DecompositionParams};
pub use traits::{BoxedAdapter, FittedModel, ModelAdapter, ModelVariant};
pub use tree::{TreeEnsembleAdapter, TreeEnsembleParams};

pub(crate) use traits::check_horizon;
