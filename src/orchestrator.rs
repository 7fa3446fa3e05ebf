//! End-to-end run: validate, backtest, score, combine.

use crate::backtest::{
    catch_panic, generate_folds, BacktestOutcome, CancellationToken, FoldAudit, FoldConfig,
    RollingOriginEvaluator,
};
use crate::config::{validate_models, ExecutionConfig, RunConfig};
use crate::core::{CovariateBlock, ForecastResult, TimeSeriesFrame};
use crate::ensemble::{
    CombineScope, EnsembleCombiner, EnsembleConfig, EnsembleWeights, ENSEMBLE_ID,
};
use crate::error::{
    ConfigError, EnsembleError, FailureReason, OrchestratorError, PredictError, Result,
};
use crate::models::ModelConfig;
use crate::scoreboard::{Scoreboard, ScoreboardSummary};
use crate::utils::metrics::evaluate_forecast;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Ensemble forecast for the final processed fold.
    pub forecast: ForecastResult,
    /// Weights used for [`RunReport::forecast`].
    pub weights: EnsembleWeights,
    /// Fold the final forecast covers.
    pub final_fold: usize,
    /// Why later processed folds could not be combined, when `final_fold`
    /// is not the last processed fold.
    pub final_fold_error: Option<EnsembleError>,
    pub summary: ScoreboardSummary,
    pub audit: Vec<FoldAudit>,
    /// Full per-fold results, including every member forecast.
    pub scoreboard: Arc<Scoreboard>,
    /// True when cancellation skipped some folds.
    pub cancelled: bool,
    /// Model configs of the run, kept for [`ForecastOrchestrator::forecast_ahead`].
    pub models: Vec<ModelConfig>,
    pub ensemble: EnsembleConfig,
}

/// Sequences fold generation, evaluation and combination for one run.
///
/// # Example
///
/// ```
/// use airq_forecast::prelude::*;
/// use chrono::{Duration, TimeZone, Utc};
/// use std::sync::Arc;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let timestamps = (0..120).map(|d| start + Duration::days(d)).collect();
/// let values = (0..120).map(|d| 30.0 + (d % 7) as f64 * 2.0).collect();
/// let frame = TimeSeriesFrame::univariate(timestamps, values, Frequency::Fixed(Duration::days(1)))
///     .unwrap();
///
/// let models = vec![
///     ModelConfig::autoregressive("ar", AutoregressiveParams::new(2, 0)),
///     ModelConfig::decomposition("weekly", DecompositionParams::new(7)),
/// ];
/// let report = ForecastOrchestrator::new(ExecutionConfig::default())
///     .run(
///         Arc::new(frame),
///         &models,
///         &FoldConfig::fixed(60, 14, 7),
///         &EnsembleConfig::new(WeightingStrategy::InverseError),
///     )
///     .unwrap();
/// assert_eq!(report.forecast.horizon(), 7);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ForecastOrchestrator {
    execution: ExecutionConfig,
    cancel: CancellationToken,
}

impl ForecastOrchestrator {
    pub fn new(execution: ExecutionConfig) -> Self {
        Self {
            execution,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs started by this orchestrator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Run with every setting taken from a [`RunConfig`].
    pub fn run_config(frame: Arc<TimeSeriesFrame>, config: &RunConfig) -> Result<RunReport> {
        ForecastOrchestrator::new(config.execution.clone()).run(
            frame,
            &config.models,
            &config.fold,
            &config.ensemble,
        )
    }

    /// Backtest every model and combine the final fold.
    ///
    /// Configuration and schema problems fail before any fold runs. Fold-local
    /// failures only end the run when no model succeeded anywhere.
    pub fn run(
        &self,
        frame: Arc<TimeSeriesFrame>,
        models: &[ModelConfig],
        fold_config: &FoldConfig,
        ensemble_config: &EnsembleConfig,
    ) -> Result<RunReport> {
        fold_config.validate()?;
        ensemble_config.validate()?;
        self.execution.validate()?;
        validate_models(models)?;
        for model in models {
            frame.schema().require(&model.id, model.required_covariates())?;
        }
        let folds = generate_folds(&frame, fold_config)?;
        let n_folds = folds.len();

        info!(
            rows = frame.len(),
            folds = n_folds,
            models = models.len(),
            strategy = %ensemble_config.strategy,
            "starting forecast run"
        );

        let scoreboard = Arc::new(Scoreboard::new());
        let evaluator = RollingOriginEvaluator::new(
            folds,
            models.to_vec(),
            self.execution.evaluator_settings(),
        )
        .with_cancellation(self.cancel.clone());
        let outcome = evaluator.run(Arc::clone(&frame), &scoreboard)?;

        if outcome.processed_folds.is_empty() {
            if outcome.cancelled {
                warn!("run cancelled before any fold started");
                return Err(OrchestratorError::Cancelled);
            }
            return Err(OrchestratorError::NoSuccessfulFolds { folds: n_folds });
        }

        self.finish(scoreboard, outcome, models, ensemble_config)
    }

    /// Build the report from a finished evaluation.
    ///
    /// The final forecast comes from the latest processed fold that has at least
    /// one successful member. A later fold where every model failed is reported
    /// in [`RunReport::final_fold_error`] instead of failing the run.
    fn finish(
        &self,
        scoreboard: Arc<Scoreboard>,
        outcome: BacktestOutcome,
        models: &[ModelConfig],
        ensemble_config: &EnsembleConfig,
    ) -> Result<RunReport> {
        if !scoreboard.has_success() {
            return Err(OrchestratorError::NoSuccessfulFolds {
                folds: outcome.processed_folds.len(),
            });
        }

        let combiner = EnsembleCombiner::new(ensemble_config.clone());
        if ensemble_config.scope == CombineScope::AllFolds {
            self.score_ensemble(&combiner, &scoreboard, &outcome);
        }

        let mut final_fold_error = None;
        let mut combined = None;
        for &fold_id in outcome.processed_folds.iter().rev() {
            match combiner.combine_fold(&scoreboard, fold_id) {
                Ok((forecast, weights)) => {
                    combined = Some((fold_id, forecast, weights));
                    break;
                }
                Err(err) => {
                    warn!(fold = fold_id, %err, "no ensemble for fold, trying the previous one");
                    if final_fold_error.is_none() {
                        final_fold_error = Some(err);
                    }
                }
            }
        }
        let Some((final_fold, forecast, weights)) = combined else {
            return Err(final_fold_error
                .unwrap_or(EnsembleError::NoViableModels { fold_id: None })
                .into());
        };
        let summary = scoreboard.summary();

        info!(
            final_fold,
            processed = outcome.processed_folds.len(),
            cancelled = outcome.cancelled,
            weighting = %weights.strategy(),
            "forecast run finished"
        );

        Ok(RunReport {
            forecast,
            weights,
            final_fold,
            final_fold_error,
            summary,
            audit: outcome.audit,
            scoreboard,
            cancelled: outcome.cancelled,
            models: models.to_vec(),
            ensemble: ensemble_config.clone(),
        })
    }

    /// Combine and score every processed fold under [`ENSEMBLE_ID`].
    fn score_ensemble(
        &self,
        combiner: &EnsembleCombiner,
        scoreboard: &Scoreboard,
        outcome: &BacktestOutcome,
    ) {
        for &fold_id in &outcome.processed_folds {
            let combined = combiner
                .combine_fold(scoreboard, fold_id)
                .map_err(FailureReason::from)
                .and_then(|(forecast, _)| {
                    let actual = scoreboard.actual(fold_id).unwrap_or_default();
                    let metrics = evaluate_forecast(
                        &actual,
                        &forecast,
                        self.execution.mape_zero_threshold,
                    )
                    .ok_or(PredictError::WrongLength {
                        expected: actual.len(),
                        got: forecast.horizon(),
                    })?;
                    Ok((forecast, metrics))
                });

            match combined {
                Ok((forecast, metrics)) => {
                    debug!(fold = fold_id, rmse = metrics.rmse, "ensemble scored");
                    scoreboard.record_success(fold_id, ENSEMBLE_ID, forecast, &metrics);
                }
                Err(reason) => {
                    warn!(fold = fold_id, %reason, "ensemble could not be formed for fold");
                    scoreboard.record_failure(fold_id, ENSEMBLE_ID, reason);
                }
            }
        }
    }

    /// Forecast past the end of `frame`.
    ///
    /// Every model that succeeded on at least one backtest fold is refitted on
    /// the whole frame and asked for `future.len()` steps. Members are weighted
    /// from the complete backtest history of `report`.
    pub fn forecast_ahead(
        &self,
        frame: &TimeSeriesFrame,
        future: &CovariateBlock,
        report: &RunReport,
    ) -> Result<ForecastResult> {
        let horizon = future.len();
        if horizon == 0 {
            return Err(ConfigError::ZeroParameter("horizon").into());
        }
        let viable: Vec<&ModelConfig> = report
            .models
            .iter()
            .filter(|m| report.summary.model(&m.id).is_some_and(|s| s.ok_folds > 0))
            .collect();

        let members: Vec<(String, ForecastResult)> = viable
            .par_iter()
            .filter_map(|model| match refit_and_predict(frame, model, future) {
                Ok(forecast) => Some((model.id.clone(), forecast)),
                Err(reason) => {
                    warn!(model = %model.id, %reason, "model failed on the full history");
                    None
                }
            })
            .collect();
        if members.is_empty() {
            return Err(EnsembleError::NoViableModels { fold_id: None }.into());
        }

        let combiner = EnsembleCombiner::new(report.ensemble.clone());
        let ids: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
        let weights = combiner.weights(&ids, &report.scoreboard, None)?;
        info!(
            horizon,
            members = members.len(),
            weighting = %weights.strategy(),
            "forecasting ahead"
        );
        Ok(combiner.combine(&members, &weights)?)
    }
}

fn refit_and_predict(
    frame: &TimeSeriesFrame,
    model: &ModelConfig,
    future: &CovariateBlock,
) -> std::result::Result<ForecastResult, FailureReason> {
    catch_panic(|| {
        let fitted = model.build().fit(frame)?;
        let forecast = fitted.predict(future.len(), future)?;
        if forecast.horizon() != future.len() {
            return Err(PredictError::WrongLength {
                expected: future.len(),
                got: forecast.horizon(),
            }
            .into());
        }
        if let Some(step) = forecast.point().iter().position(|v| !v.is_finite()) {
            return Err(PredictError::NonFiniteForecast { step }.into());
        }
        Ok(forecast)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{EvaluatorSettings, ModelStatus};
    use crate::core::{FeatureSpec, Frequency};
    use crate::error::{PredictError, SchemaError};
    use crate::models::{AutoregressiveParams, DecompositionParams, TreeEnsembleParams};
    use chrono::{Duration, TimeZone, Utc};

    fn frame(n: usize) -> Arc<TimeSeriesFrame> {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let timestamps = (0..n).map(|d| start + Duration::days(d as i64)).collect();
        let values = (0..n)
            .map(|i| 40.0 + 6.0 * ((i % 7) as f64) + 0.5 * ((i * 7) % 3) as f64)
            .collect();
        Arc::new(
            TimeSeriesFrame::univariate(timestamps, values, Frequency::Fixed(Duration::days(1)))
                .unwrap(),
        )
    }

    fn models() -> Vec<ModelConfig> {
        vec![
            ModelConfig::autoregressive("ar", AutoregressiveParams::new(3, 0)),
            ModelConfig::decomposition("weekly", DecompositionParams::new(7)),
        ]
    }

    fn orchestrator() -> ForecastOrchestrator {
        ForecastOrchestrator::new(ExecutionConfig::default().with_max_workers(2))
    }

    #[test]
    fn run_produces_final_fold_ensemble() {
        let report = orchestrator()
            .run(
                frame(150),
                &models(),
                &FoldConfig::fixed(60, 14, 7),
                &EnsembleConfig::default(),
            )
            .unwrap();
        assert_eq!(report.final_fold, report.scoreboard.latest_fold().unwrap());
        assert_eq!(report.forecast.horizon(), 7);
        assert_eq!(report.weights.len(), 2);
        assert_eq!(report.summary.models.len(), 2);
        assert!(report.final_fold_error.is_none());
        assert!(!report.cancelled);
    }

    /// Daily series with a temperature column; `gap` puts a NaN temperature on that row.
    fn covariate_frame(n: usize, gap: usize) -> Arc<TimeSeriesFrame> {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let mut temperature: Vec<f64> = (0..n).map(|i| 12.0 + ((i * 5) % 13) as f64).collect();
        let target = temperature.iter().map(|t| 50.0 - 1.5 * t).collect();
        temperature[gap] = f64::NAN;
        Arc::new(
            TimeSeriesFrame::builder()
                .timestamps((0..n).map(|d| start + Duration::days(d as i64)).collect())
                .target(target)
                .covariate(FeatureSpec::continuous("temperature"), temperature)
                .frequency(Frequency::Fixed(Duration::days(1)))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn failed_final_fold_falls_back_to_latest_viable_fold() {
        // Folds test rows 60..67, 74..81 and 88..95; row 90 breaks only the last
        let frame = covariate_frame(100, 90);
        let models = vec![ModelConfig::tree_ensemble(
            "rf",
            TreeEnsembleParams::new(vec!["temperature".into()]).with_trees(10),
        )];
        let report = orchestrator()
            .run(
                Arc::clone(&frame),
                &models,
                &FoldConfig::fixed(60, 14, 7),
                &EnsembleConfig::default(),
            )
            .unwrap();

        assert_eq!(report.audit.len(), 3);
        assert_eq!(report.final_fold, 1);
        assert_eq!(
            report.final_fold_error,
            Some(EnsembleError::NoViableModels { fold_id: Some(2) })
        );
        assert_eq!(report.forecast.timestamps(), &frame.timestamps()[74..81]);
        assert_eq!(
            report.audit[2].status("rf"),
            Some(&ModelStatus::Failed {
                reason: FailureReason::Predict(PredictError::NonFiniteCovariate { row: 2 })
            })
        );
        let rf = report.summary.model("rf").unwrap();
        assert_eq!((rf.ok_folds, rf.failed_folds), (2, 1));
    }

    #[test]
    fn partial_run_after_cancellation_is_reported() {
        let frame = frame(150);
        let folds = generate_folds(&frame, &FoldConfig::fixed(60, 14, 7)).unwrap();
        assert!(folds.len() > 2);
        let scoreboard = Arc::new(Scoreboard::new());

        // Two folds ran, the rest never started
        let mut outcome = RollingOriginEvaluator::new(
            folds[..2].to_vec(),
            models(),
            EvaluatorSettings::default(),
        )
        .run(Arc::clone(&frame), &scoreboard)
        .unwrap();
        for fold in &folds[2..] {
            let mut audit = FoldAudit::new(fold);
            for model in models() {
                audit.push(model.id, ModelStatus::Skipped);
            }
            outcome.audit.push(audit);
        }
        outcome.cancelled = true;

        let report = orchestrator()
            .finish(scoreboard, outcome, &models(), &EnsembleConfig::default())
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.final_fold, 1);
        assert_eq!(report.audit.len(), folds.len());
        assert!(report.audit[2..].iter().all(FoldAudit::is_skipped));
        assert_eq!(report.scoreboard.fold_ids(), vec![0, 1]);
        assert_eq!(report.forecast.timestamps(), &frame.timestamps()[74..81]);
    }

    #[test]
    fn missing_covariate_fails_before_any_fold() {
        let models = vec![ModelConfig::tree_ensemble(
            "rf",
            TreeEnsembleParams::new(vec!["temperature".into()]),
        )];
        let err = orchestrator()
            .run(
                frame(100),
                &models,
                &FoldConfig::fixed(60, 7, 7),
                &EnsembleConfig::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::Schema(SchemaError::MissingColumns {
                model_id: "rf".into(),
                missing: vec!["temperature".into()],
            })
        );
    }

    #[test]
    fn every_model_failing_is_an_error() {
        let models = vec![ModelConfig::decomposition("monthly", DecompositionParams::new(30))];
        let err = orchestrator()
            .run(
                frame(100),
                &models,
                &FoldConfig::fixed(40, 10, 7),
                &EnsembleConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoSuccessfulFolds { .. }));
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let orchestrator = orchestrator();
        orchestrator.cancellation_token().cancel();
        let err = orchestrator
            .run(
                frame(100),
                &models(),
                &FoldConfig::fixed(60, 7, 7),
                &EnsembleConfig::default(),
            )
            .unwrap_err();
        assert_eq!(err, OrchestratorError::Cancelled);
    }

    #[test]
    fn forecast_ahead_extends_past_the_frame() {
        let frame = frame(120);
        let orchestrator = orchestrator();
        let report = orchestrator
            .run(
                Arc::clone(&frame),
                &models(),
                &FoldConfig::fixed(60, 14, 7),
                &EnsembleConfig::default(),
            )
            .unwrap();
        let future = CovariateBlock::timestamps_only(frame.future_timestamps(5).unwrap());
        let forecast = orchestrator.forecast_ahead(&frame, &future, &report).unwrap();
        assert_eq!(forecast.horizon(), 5);
        assert!(forecast.timestamps()[0] > frame.last_timestamp().unwrap());

        let empty = CovariateBlock::timestamps_only(Vec::new());
        assert!(orchestrator.forecast_ahead(&frame, &empty, &report).is_err());
    }
}
