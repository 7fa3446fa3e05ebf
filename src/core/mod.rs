//! Core data structures shared by every stage of the engine.

mod forecast;
mod frame;

pub use forecast::{ForecastPoint, ForecastResult};
pub use frame::{
    CovariateBlock, FeatureKind, FeatureSchema, FeatureSpec, FrameBuilder, Frequency,
    TimeSeriesFrame,
};
