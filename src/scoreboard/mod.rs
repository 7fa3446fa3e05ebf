//! Per-fold, per-model results and the comparison summary built from them.
//!
//! The ledger is append-only. Writes take the write half of an `RwLock`, so
//! one record is committed at a time; readers only ever see committed records.

mod summary;

pub use summary::{MetricStats, ModelSummary, ScoreboardSummary};

use crate::core::ForecastResult;
use crate::error::FailureReason;
use crate::utils::metrics::{AccuracyMetrics, Metric};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Whether a model produced a forecast for a fold.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordStatus {
    Ok,
    Failed(FailureReason),
}

/// One model's metrics on one fold. Failed entries carry no metric values.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub model_id: String,
    pub fold_id: usize,
    pub values: BTreeMap<Metric, f64>,
    pub status: RecordStatus,
}

impl MetricRecord {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, RecordStatus::Ok)
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

#[derive(Debug, Default)]
struct FoldEntry {
    fold_id: usize,
    actual: Vec<f64>,
    forecasts: BTreeMap<String, ForecastResult>,
}

#[derive(Debug, Default)]
struct Ledger {
    folds: Vec<FoldEntry>,
    records: Vec<MetricRecord>,
}

impl Ledger {
    fn fold(&self, fold_id: usize) -> Option<&FoldEntry> {
        self.folds.iter().find(|f| f.fold_id == fold_id)
    }

    fn fold_mut(&mut self, fold_id: usize) -> &mut FoldEntry {
        let position = match self.folds.iter().position(|f| f.fold_id == fold_id) {
            Some(position) => position,
            None => {
                self.folds.push(FoldEntry {
                    fold_id,
                    ..Default::default()
                });
                self.folds.len() - 1
            }
        };
        &mut self.folds[position]
    }
}

/// Thread-safe, append-only store of backtest results.
#[derive(Debug, Default)]
pub struct Scoreboard {
    ledger: RwLock<Ledger>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a fold with its ground truth. Registering an existing fold is a no-op.
    pub fn register_fold(&self, fold_id: usize, actual: Vec<f64>) {
        let mut ledger = self.write();
        if ledger.fold(fold_id).is_none() {
            ledger.folds.push(FoldEntry {
                fold_id,
                actual,
                forecasts: BTreeMap::new(),
            });
        }
    }

    /// Record a successful forecast and its metrics.
    pub fn record_success(
        &self,
        fold_id: usize,
        model_id: &str,
        forecast: ForecastResult,
        metrics: &AccuracyMetrics,
    ) {
        let mut ledger = self.write();
        ledger
            .fold_mut(fold_id)
            .forecasts
            .insert(model_id.to_string(), forecast);
        ledger.records.push(MetricRecord {
            model_id: model_id.to_string(),
            fold_id,
            values: metrics.to_map(),
            status: RecordStatus::Ok,
        });
    }

    /// Record that a model produced nothing for a fold.
    pub fn record_failure(&self, fold_id: usize, model_id: &str, reason: FailureReason) {
        let mut ledger = self.write();
        ledger.fold_mut(fold_id);
        ledger.records.push(MetricRecord {
            model_id: model_id.to_string(),
            fold_id,
            values: BTreeMap::new(),
            status: RecordStatus::Failed(reason),
        });
    }

    /// All records in commit order.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.read().records.clone()
    }

    pub fn records_for(&self, model_id: &str) -> Vec<MetricRecord> {
        self.read()
            .records
            .iter()
            .filter(|r| r.model_id == model_id)
            .cloned()
            .collect()
    }

    /// Fold ids in commit order.
    pub fn fold_ids(&self) -> Vec<usize> {
        self.read().folds.iter().map(|f| f.fold_id).collect()
    }

    pub fn latest_fold(&self) -> Option<usize> {
        self.read().folds.last().map(|f| f.fold_id)
    }

    /// Model ids in order of first appearance.
    pub fn model_ids(&self) -> Vec<String> {
        let ledger = self.read();
        let mut ids: Vec<String> = Vec::new();
        for record in &ledger.records {
            if !ids.contains(&record.model_id) {
                ids.push(record.model_id.clone());
            }
        }
        ids
    }

    /// Models with a forecast for the fold, sorted by id.
    pub fn successful_models(&self, fold_id: usize) -> Vec<String> {
        self.read()
            .fold(fold_id)
            .map(|f| f.forecasts.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn successful_entries(&self, fold_id: usize) -> usize {
        self.read().fold(fold_id).map_or(0, |f| f.forecasts.len())
    }

    pub fn forecast(&self, fold_id: usize, model_id: &str) -> Option<ForecastResult> {
        self.read()
            .fold(fold_id)
            .and_then(|f| f.forecasts.get(model_id).cloned())
    }

    /// Every successful forecast for the fold, sorted by model id.
    pub fn forecasts(&self, fold_id: usize) -> Vec<(String, ForecastResult)> {
        self.read()
            .fold(fold_id)
            .map(|f| {
                f.forecasts
                    .iter()
                    .map(|(id, forecast)| (id.clone(), forecast.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ground truth of the fold's test window.
    pub fn actual(&self, fold_id: usize) -> Option<Vec<f64>> {
        self.read().fold(fold_id).map(|f| f.actual.clone())
    }

    /// Mean of `metric` over the model's successful folds, optionally only
    /// folds with id below `before_fold`.
    pub fn mean_metric(
        &self,
        model_id: &str,
        metric: Metric,
        before_fold: Option<usize>,
    ) -> Option<f64> {
        let ledger = self.read();
        let values: Vec<f64> = ledger
            .records
            .iter()
            .filter(|r| r.model_id == model_id && r.is_ok())
            .filter(|r| before_fold.map_or(true, |cutoff| r.fold_id < cutoff))
            .filter_map(|r| r.value(metric))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Fold ids before `before_fold` in which every listed model succeeded,
    /// with the forecasts in `model_ids` order and the ground truth.
    pub(crate) fn out_of_fold_rows(
        &self,
        model_ids: &[String],
        before_fold: Option<usize>,
    ) -> Vec<(Vec<Vec<f64>>, Vec<f64>)> {
        let ledger = self.read();
        ledger
            .folds
            .iter()
            .filter(|f| before_fold.map_or(true, |cutoff| f.fold_id < cutoff))
            .filter_map(|f| {
                let predictions = model_ids
                    .iter()
                    .map(|id| f.forecasts.get(id).map(|fc| fc.point().to_vec()))
                    .collect::<Option<Vec<_>>>()?;
                Some((predictions, f.actual.clone()))
            })
            .collect()
    }

    pub fn has_success(&self) -> bool {
        self.read().records.iter().any(MetricRecord::is_ok)
    }

    pub fn summary(&self) -> ScoreboardSummary {
        let ledger = self.read();
        ScoreboardSummary::from_records(&ledger.records, ledger.folds.len())
    }

    /// Best model by mean `metric`; ties resolve to the lexically smaller id.
    pub fn best_model(&self, metric: Metric) -> Option<String> {
        self.summary().best_model(metric).map(str::to_string)
    }
}
