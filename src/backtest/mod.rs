//! Leakage-free temporal cross-validation.

mod audit;
mod cancel;
mod evaluator;
mod fold;
mod runner;

pub use audit::{FoldAudit, ModelStatus, ModelStatusEntry};
pub use cancel::CancellationToken;
pub use evaluator::{BacktestOutcome, EvaluatorSettings, RollingOriginEvaluator};
pub use fold::{fold_ranges, generate_folds, Fold, FoldConfig, TimeRange, WindowMode};
pub use runner::{run_fold_model, FoldForecast};
pub(crate) use runner::catch_panic;
