//! Forecast result structure for holding timestamped predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub point: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Point predictions with optional prediction intervals, ordered by timestamp.
///
/// Intervals are all-or-nothing: either every step has both bounds or none does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastResult {
    timestamps: Vec<DateTime<Utc>>,
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl ForecastResult {
    /// Create a forecast from point predictions.
    pub fn from_values(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        Self {
            timestamps,
            point: values,
            lower: None,
            upper: None,
        }
    }

    /// Create a forecast with prediction intervals.
    pub fn from_values_with_intervals(
        timestamps: Vec<DateTime<Utc>>,
        values: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());
        debug_assert_eq!(values.len(), lower.len());
        debug_assert_eq!(values.len(), upper.len());
        Self {
            timestamps,
            point: values,
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Point predictions.
    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    /// Iterate rows in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = ForecastPoint> + '_ {
        (0..self.horizon()).map(move |i| ForecastPoint {
            timestamp: self.timestamps[i],
            point: self.point[i],
            lower: self.lower.as_ref().map(|l| l[i]),
            upper: self.upper.as_ref().map(|u| u[i]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn stamps(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    #[test]
    fn forecast_from_values_has_no_intervals() {
        let forecast = ForecastResult::from_values(stamps(3), vec![1.0, 2.0, 3.0]);

        assert!(!forecast.is_empty());
        assert_eq!(forecast.horizon(), 3);
        assert_eq!(forecast.point(), &[1.0, 2.0, 3.0]);
        assert!(!forecast.has_intervals());
        assert!(forecast.lower().is_none());
        assert!(forecast.iter().all(|p| p.lower.is_none() && p.upper.is_none()));
    }

    #[test]
    fn forecast_rows_carry_intervals() {
        let forecast = ForecastResult::from_values_with_intervals(
            stamps(2),
            vec![2.0, 3.0],
            vec![1.0, 2.0],
            vec![3.0, 4.0],
        );

        assert!(forecast.has_intervals());
        let rows: Vec<_> = forecast.iter().collect();
        assert_eq!(rows[1].point, 3.0);
        assert_eq!(rows[1].lower, Some(2.0));
        assert_eq!(rows[1].upper, Some(4.0));
        assert_eq!(rows[0].timestamp, forecast.timestamps()[0]);
    }

    #[test]
    fn default_forecast_is_empty() {
        let forecast = ForecastResult::default();
        assert!(forecast.is_empty());
        assert_eq!(forecast.horizon(), 0);
    }
}
