//! Rolling-origin fold generation.
//!
//! Window length, step and horizon are counted in observations. Folds come out
//! in increasing time order; fold ids are their positions in that order.

use crate::core::TimeSeriesFrame;
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// How the training window moves between folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Fixed-length window sliding forward by `step`.
    #[default]
    Fixed,
    /// Training start pinned at the first row; the end advances by `step`.
    Expanding,
}

/// Configuration for rolling-origin cross-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    pub window_mode: WindowMode,
    /// Training rows (the initial window in expanding mode).
    pub window_length: usize,
    /// Rows the origin advances between folds.
    pub step: usize,
    /// Test rows per fold.
    pub horizon: usize,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            window_mode: WindowMode::Fixed,
            window_length: 90,
            step: 7,
            horizon: 7,
        }
    }
}

impl FoldConfig {
    /// Sliding window of `window_length` rows.
    pub fn fixed(window_length: usize, step: usize, horizon: usize) -> Self {
        Self {
            window_mode: WindowMode::Fixed,
            window_length,
            step,
            horizon,
        }
    }

    /// Growing window starting with `initial_window` rows.
    pub fn expanding(initial_window: usize, step: usize, horizon: usize) -> Self {
        Self {
            window_mode: WindowMode::Expanding,
            window_length: initial_window,
            step,
            horizon,
        }
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Rows needed for a single fold.
    pub fn min_observations(&self) -> usize {
        self.window_length + self.horizon
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_length == 0 {
            return Err(ConfigError::ZeroParameter("window_length"));
        }
        if self.step == 0 {
            return Err(ConfigError::ZeroParameter("step"));
        }
        if self.horizon == 0 {
            return Err(ConfigError::ZeroParameter("horizon"));
        }
        Ok(())
    }
}

/// Inclusive timestamp bounds of a row range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start.format("%Y-%m-%d %H:%M"), self.end.format("%Y-%m-%d %H:%M"))
    }
}

/// One train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub id: usize,
    /// Training rows.
    pub train: Range<usize>,
    /// Test rows, starting right after the training rows.
    pub test: Range<usize>,
    pub train_bounds: TimeRange,
    pub test_bounds: TimeRange,
}

impl Fold {
    pub fn horizon(&self) -> usize {
        self.test.len()
    }
}

/// Row ranges of every fold for a series of `n` rows.
///
/// Assumes a validated config.
pub fn fold_ranges(n: usize, config: &FoldConfig) -> Vec<(Range<usize>, Range<usize>)> {
    let mut ranges = Vec::new();
    let mut end = config.window_length;
    while end + config.horizon <= n {
        let start = match config.window_mode {
            WindowMode::Fixed => end - config.window_length,
            WindowMode::Expanding => 0,
        };
        ranges.push((start..end, end..end + config.horizon));
        end += config.step;
    }
    ranges
}

/// Generate folds over a frame in increasing time order.
///
/// # Example
///
/// ```
/// use airq_forecast::backtest::{generate_folds, FoldConfig};
/// use airq_forecast::core::{Frequency, TimeSeriesFrame};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// let timestamps: Vec<_> = (0..400).map(|d| start + Duration::days(d)).collect();
/// let frame = TimeSeriesFrame::univariate(
///     timestamps,
///     vec![12.0; 400],
///     Frequency::Fixed(Duration::days(1)),
/// )
/// .unwrap();
///
/// let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
/// assert_eq!(folds.len(), 4);
/// assert!(folds.iter().all(|f| f.test.len() == 7));
/// ```
pub fn generate_folds(frame: &TimeSeriesFrame, config: &FoldConfig) -> Result<Vec<Fold>, ConfigError> {
    config.validate()?;
    let n = frame.len();
    let ranges = fold_ranges(n, config);
    if ranges.is_empty() {
        return Err(ConfigError::InsufficientHistory {
            needed: config.min_observations(),
            got: n,
        });
    }

    let timestamps = frame.timestamps();
    let bounds = |range: &Range<usize>| TimeRange {
        start: timestamps[range.start],
        end: timestamps[range.end - 1],
    };

    Ok(ranges
        .into_iter()
        .enumerate()
        .map(|(id, (train, test))| Fold {
            id,
            train_bounds: bounds(&train),
            test_bounds: bounds(&test),
            train,
            test,
        })
        .collect())
}
