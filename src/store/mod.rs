//! Series store adapters: where frames come from.
//!
//! Fetching and persisting raw data is out of scope; a store hands the engine
//! an immutable frame together with its covariate schema.

mod pivot;
mod pollutant;

pub use pivot::{pivot_measurements, Measurement};
pub use pollutant::{Pollutant, UnknownPollutant};

use crate::core::{FeatureSchema, TimeSeriesFrame};
use crate::error::FrameError;
use std::sync::Arc;

/// Source of time-indexed feature/target tables.
pub trait SeriesStore {
    /// Covariate names and kinds of the frame [`SeriesStore::load`] returns.
    fn schema(&self) -> &FeatureSchema;

    /// Load the series. The frame is shared read-only by every fold task.
    fn load(&self) -> Result<Arc<TimeSeriesFrame>, FrameError>;
}

/// Store over a frame already in memory.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    frame: Arc<TimeSeriesFrame>,
}

impl InMemoryStore {
    pub fn new(frame: TimeSeriesFrame) -> Self {
        Self {
            frame: Arc::new(frame),
        }
    }

    /// Pivot station measurements into a store.
    pub fn from_measurements(
        records: &[Measurement],
        target: Pollutant,
        covariates: &[&str],
    ) -> Result<Self, FrameError> {
        pivot_measurements(records, target.code(), covariates).map(Self::new)
    }
}

impl SeriesStore for InMemoryStore {
    fn schema(&self) -> &FeatureSchema {
        self.frame.schema()
    }

    fn load(&self) -> Result<Arc<TimeSeriesFrame>, FrameError> {
        if self.frame.is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(Arc::clone(&self.frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Frequency;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn loads_shared_frame() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records: Vec<Measurement> = (0..5)
            .flat_map(|d| {
                let ts = t0 + Duration::hours(d);
                [
                    Measurement::new(ts, "pm25", 8.0 + d as f64),
                    Measurement::new(ts, "temperature", 15.0),
                ]
            })
            .collect();
        let store = InMemoryStore::from_measurements(&records, Pollutant::Pm25, &["temperature"])
            .unwrap();

        assert!(store.schema().contains("temperature"));
        let a = store.load().unwrap();
        let b = store.load().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.frequency(), Frequency::Fixed(Duration::hours(1)));
    }

    #[test]
    fn empty_frame_does_not_load() {
        let frame = TimeSeriesFrame::univariate(Vec::new(), Vec::new(), Frequency::Irregular).unwrap();
        assert_eq!(InMemoryStore::new(frame).load().unwrap_err(), FrameError::Empty);
    }
}
