//! Numeric helpers shared by the models, the scoreboard and the combiner.

pub mod metrics;
pub mod ols;
pub mod stats;

pub use metrics::{calculate_metrics, evaluate_forecast, AccuracyMetrics, Metric};
pub use ols::{ols_fit, OlsResult};
pub use stats::z_for_level;
