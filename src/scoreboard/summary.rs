//! Aggregated per-model view of the scoreboard.

use super::{MetricRecord, RecordStatus};
use crate::error::FailureReason;
use crate::utils::metrics::Metric;
use crate::utils::stats::{mean, std_dev};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Mean, spread and rank of one metric for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricStats {
    pub mean: f64,
    /// Sample standard deviation across folds (0 for a single fold).
    pub std_dev: f64,
    /// Folds that contributed a value.
    pub count: usize,
    /// 1-based rank among models reporting this metric; `None` for counts.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model_id: String,
    pub ok_folds: usize,
    pub failed_folds: usize,
    pub metrics: BTreeMap<Metric, MetricStats>,
    /// Failure reason per failed fold.
    pub failures: Vec<(usize, FailureReason)>,
}

impl ModelSummary {
    pub fn stats(&self, metric: Metric) -> Option<&MetricStats> {
        self.metrics.get(&metric)
    }
}

/// Per-model metric table, sorted by model id.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardSummary {
    pub folds: usize,
    pub models: Vec<ModelSummary>,
}

impl ScoreboardSummary {
    pub(crate) fn from_records(records: &[MetricRecord], folds: usize) -> Self {
        let mut by_model: BTreeMap<&str, Vec<&MetricRecord>> = BTreeMap::new();
        for record in records {
            by_model.entry(&record.model_id).or_default().push(record);
        }

        let mut models: Vec<ModelSummary> = by_model
            .into_iter()
            .map(|(model_id, records)| summarize_model(model_id, &records))
            .collect();
        assign_ranks(&mut models);

        Self { folds, models }
    }

    pub fn model(&self, model_id: &str) -> Option<&ModelSummary> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    /// Rank-1 model for `metric`.
    pub fn best_model(&self, metric: Metric) -> Option<&str> {
        self.models
            .iter()
            .find(|m| m.stats(metric).and_then(|s| s.rank) == Some(1))
            .map(|m| m.model_id.as_str())
    }

    /// Model ids ordered by rank on `metric`; models without the metric are left out.
    pub fn ranking(&self, metric: Metric) -> Vec<&str> {
        let mut ranked: Vec<(usize, &str)> = self
            .models
            .iter()
            .filter_map(|m| {
                m.stats(metric)
                    .and_then(|s| s.rank)
                    .map(|r| (r, m.model_id.as_str()))
            })
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, id)| id).collect()
    }
}

fn summarize_model(model_id: &str, records: &[&MetricRecord]) -> ModelSummary {
    let mut values: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();
    let mut failures = Vec::new();
    let mut ok_folds = 0;

    for record in records {
        match &record.status {
            RecordStatus::Ok => {
                ok_folds += 1;
                for (metric, value) in &record.values {
                    values.entry(*metric).or_default().push(*value);
                }
            }
            RecordStatus::Failed(reason) => failures.push((record.fold_id, reason.clone())),
        }
    }

    let metrics = values
        .into_iter()
        .map(|(metric, vals)| {
            let stats = MetricStats {
                mean: mean(&vals),
                std_dev: std_dev(&vals),
                count: vals.len(),
                rank: None,
            };
            (metric, stats)
        })
        .collect();

    ModelSummary {
        model_id: model_id.to_string(),
        ok_folds,
        failed_folds: failures.len(),
        metrics,
        failures,
    }
}

fn assign_ranks(models: &mut [ModelSummary]) {
    for metric in Metric::ALL.into_iter().filter(|m| m.is_rankable()) {
        let mut order: Vec<(usize, f64)> = models
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.stats(metric).map(|s| (i, metric.ranking_key(s.mean))))
            .collect();
        // Models are already sorted by id, so a stable sort breaks ties lexically
        order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        for (rank, (index, _)) in order.into_iter().enumerate() {
            if let Some(stats) = models[index].metrics.get_mut(&metric) {
                stats.rank = Some(rank + 1);
            }
        }
    }
}

impl fmt::Display for ScoreboardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>4} {:>6} {:>10} {:>10} {:>10} {:>8}",
            "model", "ok", "failed", "mae", "rmse", "mape", "rank"
        )?;
        for model in &self.models {
            let cell = |metric: Metric| {
                model
                    .stats(metric)
                    .map(|s| format!("{:.3}", s.mean))
                    .unwrap_or_else(|| "-".to_string())
            };
            let rank = model
                .stats(Metric::Rmse)
                .and_then(|s| s.rank)
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<16} {:>4} {:>6} {:>10} {:>10} {:>10} {:>8}",
                model.model_id,
                model.ok_folds,
                model.failed_folds,
                cell(Metric::Mae),
                cell(Metric::Rmse),
                cell(Metric::Mape),
                rank
            )?;
        }
        Ok(())
    }
}
