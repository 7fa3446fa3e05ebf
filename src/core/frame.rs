//! Immutable, time-indexed target/covariate tables.

use crate::error::{FrameError, PredictError, SchemaError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Value type of a covariate column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Any real value (weather readings, rolling means).
    #[default]
    Continuous,
    /// Integral values stored as `f64` (hour of day, lag counts).
    Discrete,
    /// Indicator column, 0 or 1.
    Flag,
}

impl FeatureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Continuous => "continuous",
            FeatureKind::Discrete => "discrete",
            FeatureKind::Flag => "flag",
        }
    }

    fn accepts(self, value: f64) -> bool {
        if !value.is_finite() {
            // Missing values are the adapters' concern.
            return true;
        }
        match self {
            FeatureKind::Continuous => true,
            FeatureKind::Discrete => value.fract() == 0.0,
            FeatureKind::Flag => value == 0.0 || value == 1.0,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named covariate column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn new(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self::new(name, FeatureKind::Continuous)
    }
}

/// Ordered list of covariate columns a frame carries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
}

impl FeatureSchema {
    /// Build a schema, rejecting duplicate names.
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self, SchemaError> {
        for (i, spec) in features.iter().enumerate() {
            if features[..i].iter().any(|other| other.name == spec.name) {
                return Err(SchemaError::DuplicateColumn(spec.name.clone()));
            }
        }
        Ok(Self { features })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Check that every required column is present, naming all that are not.
    pub fn require(&self, model_id: &str, required: &[String]) -> Result<(), SchemaError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !self.contains(name))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::MissingColumns {
                model_id: model_id.to_string(),
                missing,
            })
        }
    }
}

/// Sampling frequency of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frequency {
    /// Every gap equals this duration.
    Fixed(Duration),
    /// Gaps vary; no check is applied.
    #[default]
    Irregular,
}

impl Frequency {
    /// Infer a fixed frequency when every gap is identical.
    pub fn infer(timestamps: &[DateTime<Utc>]) -> Self {
        let mut gaps = timestamps.windows(2).map(|w| w[1] - w[0]);
        match gaps.next() {
            Some(first) if gaps.all(|g| g == first) => Frequency::Fixed(first),
            _ => Frequency::Irregular,
        }
    }

    pub fn step(&self) -> Option<Duration> {
        match self {
            Frequency::Fixed(step) => Some(*step),
            Frequency::Irregular => None,
        }
    }
}

/// Ordered (timestamp, target, covariates) table.
///
/// Construction validates the invariants; afterwards the frame is never mutated.
/// Covariates are stored column-major: `covariates[column][row]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    timestamps: Vec<DateTime<Utc>>,
    target: Vec<f64>,
    covariates: Vec<Vec<f64>>,
    schema: FeatureSchema,
    frequency: Frequency,
}

impl TimeSeriesFrame {
    /// Create a frame, validating ordering, shape, feature kinds and frequency.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        target: Vec<f64>,
        covariates: Vec<Vec<f64>>,
        schema: FeatureSchema,
        frequency: Frequency,
    ) -> Result<Self, FrameError> {
        let n = timestamps.len();
        if target.len() != n {
            return Err(FrameError::LengthMismatch {
                expected: n,
                got: target.len(),
            });
        }
        if covariates.len() != schema.len() {
            return Err(FrameError::LengthMismatch {
                expected: schema.len(),
                got: covariates.len(),
            });
        }
        for i in 1..n {
            if timestamps[i] <= timestamps[i - 1] {
                return Err(FrameError::NonIncreasingTimestamps { index: i });
            }
        }
        if let Frequency::Fixed(step) = frequency {
            for i in 1..n {
                if timestamps[i] - timestamps[i - 1] != step {
                    return Err(FrameError::FrequencyMismatch { index: i });
                }
            }
        }
        for (column, spec) in covariates.iter().zip(schema.features()) {
            if column.len() != n {
                return Err(FrameError::LengthMismatch {
                    expected: n,
                    got: column.len(),
                });
            }
            if let Some(index) = column.iter().position(|&v| !spec.kind.accepts(v)) {
                return Err(FrameError::InvalidFeatureValue {
                    column: spec.name.clone(),
                    index,
                    kind: spec.kind.as_str(),
                });
            }
        }

        Ok(Self {
            timestamps,
            target,
            covariates,
            schema,
            frequency,
        })
    }

    /// Create a frame without covariates.
    pub fn univariate(
        timestamps: Vec<DateTime<Utc>>,
        target: Vec<f64>,
        frequency: Frequency,
    ) -> Result<Self, FrameError> {
        Self::new(timestamps, target, Vec::new(), FeatureSchema::empty(), frequency)
    }

    pub fn builder() -> FrameBuilder {
        FrameBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn target(&self) -> &[f64] {
        &self.target
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// Values of a named covariate column.
    pub fn covariate(&self, name: &str) -> Option<&[f64]> {
        self.schema
            .index_of(name)
            .map(|idx| self.covariates[idx].as_slice())
    }

    /// Owned copy of the rows in `range`.
    pub fn slice(&self, range: Range<usize>) -> Result<TimeSeriesFrame, FrameError> {
        self.check_range(&range)?;
        Ok(Self {
            timestamps: self.timestamps[range.clone()].to_vec(),
            target: self.target[range.clone()].to_vec(),
            covariates: self
                .covariates
                .iter()
                .map(|c| c[range.clone()].to_vec())
                .collect(),
            schema: self.schema.clone(),
            frequency: self.frequency,
        })
    }

    /// Covariate rows of `range`, as handed to a fitted model's predict call.
    pub fn covariate_block(&self, range: Range<usize>) -> Result<CovariateBlock, FrameError> {
        self.check_range(&range)?;
        Ok(CovariateBlock {
            timestamps: self.timestamps[range.clone()].to_vec(),
            names: self.schema.names().map(str::to_string).collect(),
            columns: self
                .covariates
                .iter()
                .map(|c| c[range.clone()].to_vec())
                .collect(),
        })
    }

    /// The next `horizon` timestamps after the end of a fixed-frequency frame.
    pub fn future_timestamps(&self, horizon: usize) -> Option<Vec<DateTime<Utc>>> {
        let step = self.frequency.step()?;
        let last = self.last_timestamp()?;
        Some((1..=horizon as i32).map(|h| last + step * h).collect())
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), FrameError> {
        if range.start > range.end || range.end > self.len() {
            return Err(FrameError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: self.len(),
            });
        }
        Ok(())
    }
}

/// Builder for [`TimeSeriesFrame`], adding covariate columns one at a time.
#[derive(Debug, Clone, Default)]
pub struct FrameBuilder {
    timestamps: Vec<DateTime<Utc>>,
    target: Vec<f64>,
    features: Vec<FeatureSpec>,
    columns: Vec<Vec<f64>>,
    frequency: Option<Frequency>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamps(mut self, timestamps: Vec<DateTime<Utc>>) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn target(mut self, target: Vec<f64>) -> Self {
        self.target = target;
        self
    }

    pub fn covariate(mut self, spec: FeatureSpec, values: Vec<f64>) -> Self {
        self.features.push(spec);
        self.columns.push(values);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    /// Build the frame; without an explicit frequency one is inferred.
    pub fn build(self) -> Result<TimeSeriesFrame, FrameError> {
        let schema = FeatureSchema::new(self.features)?;
        let frequency = self
            .frequency
            .unwrap_or_else(|| Frequency::infer(&self.timestamps));
        TimeSeriesFrame::new(self.timestamps, self.target, self.columns, schema, frequency)
    }
}

/// Covariate rows for a forecast period, with their timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CovariateBlock {
    timestamps: Vec<DateTime<Utc>>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl CovariateBlock {
    /// Build a block for future periods; every column must match the timestamps.
    pub fn new(
        timestamps: Vec<DateTime<Utc>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, FrameError> {
        let n = timestamps.len();
        for (i, (name, values)) in columns.iter().enumerate() {
            if values.len() != n {
                return Err(FrameError::LengthMismatch {
                    expected: n,
                    got: values.len(),
                });
            }
            if columns[..i].iter().any(|(other, _)| other == name) {
                return Err(SchemaError::DuplicateColumn(name.clone()).into());
            }
        }
        let (names, columns) = columns.into_iter().unzip();
        Ok(Self {
            timestamps,
            names,
            columns,
        })
    }

    /// Timestamps only, for models that ignore covariates.
    pub fn timestamps_only(timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            timestamps,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Select `names` in order, truncated to the first `horizon` rows.
    pub(crate) fn select(
        &self,
        names: &[String],
        horizon: usize,
    ) -> Result<Vec<&[f64]>, PredictError> {
        if self.len() < horizon {
            return Err(PredictError::MissingCovariates {
                expected: horizon,
                got: self.len(),
            });
        }
        names
            .iter()
            .map(|name| {
                self.column(name)
                    .map(|c| &c[..horizon])
                    .ok_or_else(|| PredictError::MissingColumn(name.clone()))
            })
            .collect()
    }

    /// The first `horizon` timestamps, or a row shortfall error.
    pub(crate) fn horizon_timestamps(
        &self,
        horizon: usize,
    ) -> Result<Vec<DateTime<Utc>>, PredictError> {
        if self.len() < horizon {
            return Err(PredictError::MissingCovariates {
                expected: horizon,
                got: self.len(),
            });
        }
        Ok(self.timestamps[..horizon].to_vec())
    }
}
