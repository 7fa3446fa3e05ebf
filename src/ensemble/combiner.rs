//! Weighting and combination of member forecasts.

use super::stacking::nnls;
use super::{EnsembleConfig, EnsembleWeights, WeightingStrategy};
use crate::core::ForecastResult;
use crate::error::EnsembleError;
use crate::scoreboard::Scoreboard;
use crate::utils::metrics::Metric;
use tracing::{debug, warn};

/// Model id under which ensemble forecasts are recorded.
pub const ENSEMBLE_ID: &str = "ensemble";

/// Turns per-model forecasts plus their error history into one forecast.
#[derive(Debug, Clone, Default)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Weights for `members` from the scoreboard history.
    ///
    /// `before_fold` restricts the history to folds with smaller ids, which is
    /// what keeps the weights for fold N free of fold N's own outcome. When a
    /// strategy lacks the history it needs it falls back: stacked to inverse
    /// error, inverse error to uniform.
    pub fn weights(
        &self,
        members: &[String],
        scoreboard: &Scoreboard,
        before_fold: Option<usize>,
    ) -> Result<EnsembleWeights, EnsembleError> {
        if members.is_empty() {
            return Err(EnsembleError::NoViableModels { fold_id: before_fold });
        }
        let weights = match self.config.strategy {
            WeightingStrategy::Uniform => EnsembleWeights::uniform(members),
            WeightingStrategy::InverseError => self.inverse_error(members, scoreboard, before_fold),
            WeightingStrategy::Stacked => self.stacked(members, scoreboard, before_fold),
        };
        debug!(strategy = %weights.strategy(), members = members.len(), "ensemble weights computed");
        Ok(weights)
    }

    fn inverse_error(
        &self,
        members: &[String],
        scoreboard: &Scoreboard,
        before_fold: Option<usize>,
    ) -> EnsembleWeights {
        let errors: Option<Vec<(String, f64)>> = members
            .iter()
            .map(|id| {
                scoreboard
                    .mean_metric(id, Metric::Rmse, before_fold)
                    .map(|rmse| (id.clone(), rmse))
            })
            .collect();

        match errors {
            Some(errors) => EnsembleWeights::inverse_error(&errors, self.config.epsilon),
            None => {
                warn!("no error history for every member, using uniform weights");
                EnsembleWeights::uniform(members)
            }
        }
    }

    fn stacked(
        &self,
        members: &[String],
        scoreboard: &Scoreboard,
        before_fold: Option<usize>,
    ) -> EnsembleWeights {
        let rows = scoreboard.out_of_fold_rows(members, before_fold);
        let mut columns = vec![Vec::new(); members.len()];
        let mut target = Vec::new();
        for (predictions, actual) in rows {
            for (column, values) in columns.iter_mut().zip(predictions) {
                column.extend(values);
            }
            target.extend(actual);
        }

        if target.len() < members.len() {
            warn!(
                rows = target.len(),
                members = members.len(),
                "too few out-of-fold rows for stacking, using inverse-error weights"
            );
            return self.inverse_error(members, scoreboard, before_fold);
        }

        let solution = nnls(&columns, &target);
        if solution.iter().all(|w| *w <= 0.0) {
            warn!("stacked regression gave all-zero weights, using inverse-error weights");
            return self.inverse_error(members, scoreboard, before_fold);
        }
        let raw = members.iter().cloned().zip(solution).collect();
        EnsembleWeights::normalized(raw, WeightingStrategy::Stacked)
    }

    /// Weighted combination of aligned member forecasts.
    ///
    /// A single member comes back unchanged. Intervals are combined only when
    /// every member has them.
    pub fn combine(
        &self,
        members: &[(String, ForecastResult)],
        weights: &EnsembleWeights,
    ) -> Result<ForecastResult, EnsembleError> {
        let Some((first_id, first)) = members.first() else {
            return Err(EnsembleError::NoViableModels { fold_id: None });
        };
        if members.len() == 1 {
            if weights.get(first_id).is_none() {
                return Err(EnsembleError::MissingWeight(first_id.clone()));
            }
            return Ok(first.clone());
        }

        let mut member_weights = Vec::with_capacity(members.len());
        for (id, forecast) in members {
            if forecast.timestamps() != first.timestamps() {
                return Err(EnsembleError::MisalignedForecasts {
                    model_id: id.clone(),
                });
            }
            let weight = weights
                .get(id)
                .ok_or_else(|| EnsembleError::MissingWeight(id.clone()))?;
            member_weights.push(weight);
        }

        // Renormalise over the members actually present
        let total: f64 = member_weights.iter().sum();
        let shares: Vec<f64> = member_weights
            .iter()
            .map(|w| {
                if total > 0.0 {
                    w / total
                } else {
                    1.0 / members.len() as f64
                }
            })
            .collect();

        let point = weighted_sum(members, &shares, point_values);
        let timestamps = first.timestamps().to_vec();

        if members.iter().all(|(_, f)| f.has_intervals()) {
            let lower = weighted_sum(members, &shares, ForecastResult::lower);
            let upper = weighted_sum(members, &shares, ForecastResult::upper);
            Ok(ForecastResult::from_values_with_intervals(
                timestamps, point, lower, upper,
            ))
        } else {
            Ok(ForecastResult::from_values(timestamps, point))
        }
    }

    /// Combine every successful member forecast of one fold, weighted by
    /// history from earlier folds only.
    pub fn combine_fold(
        &self,
        scoreboard: &Scoreboard,
        fold_id: usize,
    ) -> Result<(ForecastResult, EnsembleWeights), EnsembleError> {
        let members: Vec<(String, ForecastResult)> = scoreboard
            .forecasts(fold_id)
            .into_iter()
            .filter(|(id, _)| id != ENSEMBLE_ID)
            .collect();
        if members.is_empty() {
            return Err(EnsembleError::NoViableModels {
                fold_id: Some(fold_id),
            });
        }

        let ids: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
        let weights = self.weights(&ids, scoreboard, Some(fold_id))?;
        let forecast = self.combine(&members, &weights)?;
        Ok((forecast, weights))
    }
}

fn point_values(forecast: &ForecastResult) -> Option<&[f64]> {
    Some(forecast.point())
}

fn weighted_sum(
    members: &[(String, ForecastResult)],
    shares: &[f64],
    series: fn(&ForecastResult) -> Option<&[f64]>,
) -> Vec<f64> {
    let horizon = members.first().map_or(0, |(_, f)| f.horizon());
    let mut out = vec![0.0; horizon];
    for ((_, forecast), share) in members.iter().zip(shares) {
        if let Some(values) = series(forecast) {
            for (slot, value) in out.iter_mut().zip(values) {
                *slot += share * value;
            }
        }
    }
    out
}
