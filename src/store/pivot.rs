//! Long-to-wide reshaping of station measurements.

use crate::core::{FeatureSchema, FeatureSpec, Frequency, TimeSeriesFrame};
use crate::error::FrameError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One reading of one parameter at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub parameter: String,
    pub value: f64,
}

impl Measurement {
    pub fn new(timestamp: DateTime<Utc>, parameter: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            parameter: parameter.into(),
            value,
        }
    }
}

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Pivot measurements into a frame with `target` as the target column and
/// `covariates` as continuous covariates, in the given order.
///
/// Duplicate readings of a parameter at the same timestamp are averaged and
/// non-finite readings are ignored. Timestamps lacking the target or any
/// covariate are dropped. The frequency is inferred from what remains.
pub fn pivot_measurements(
    records: &[Measurement],
    target: &str,
    covariates: &[&str],
) -> Result<TimeSeriesFrame, FrameError> {
    let schema = FeatureSchema::new(
        covariates
            .iter()
            .map(|name| FeatureSpec::continuous(*name))
            .collect(),
    )?;
    let column_of: HashMap<&str, usize> = std::iter::once(target)
        .chain(covariates.iter().copied())
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();
    let width = covariates.len() + 1;

    let mut rows: BTreeMap<DateTime<Utc>, Vec<Accumulator>> = BTreeMap::new();
    for record in records {
        if !record.value.is_finite() {
            continue;
        }
        let Some(&column) = column_of.get(record.parameter.as_str()) else {
            continue;
        };
        let row = rows
            .entry(record.timestamp)
            .or_insert_with(|| (0..width).map(|_| Accumulator::default()).collect());
        row[column].sum += record.value;
        row[column].count += 1;
    }

    let mut timestamps = Vec::with_capacity(rows.len());
    let mut target_values = Vec::with_capacity(rows.len());
    let mut columns = vec![Vec::with_capacity(rows.len()); covariates.len()];
    for (timestamp, row) in rows {
        if row.iter().any(|acc| acc.count == 0) {
            continue;
        }
        let mut means = row.iter().map(|acc| acc.sum / acc.count as f64);
        timestamps.push(timestamp);
        target_values.extend(means.next());
        for (column, value) in columns.iter_mut().zip(means) {
            column.push(value);
        }
    }

    if timestamps.is_empty() {
        return Err(FrameError::Empty);
    }
    let frequency = Frequency::infer(&timestamps);
    TimeSeriesFrame::new(timestamps, target_values, columns, schema, frequency)
}
