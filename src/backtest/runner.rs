//! Fit and predict one model on one fold, isolated from every other task.

use super::cancel::CancellationToken;
use super::fold::Fold;
use crate::core::{ForecastResult, TimeSeriesFrame};
use crate::error::{FailureReason, PredictError};
use crate::models::ModelConfig;
use crate::utils::metrics::{evaluate_forecast, AccuracyMetrics};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Successful forecast for one (fold, model) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldForecast {
    pub forecast: ForecastResult,
    pub metrics: AccuracyMetrics,
}

/// Build a fresh adapter, fit it on the fold's training rows and forecast the test rows.
///
/// The adapter and its fitted state are dropped before returning. The test
/// target is only read after prediction, for scoring.
pub fn run_fold_model(
    frame: &TimeSeriesFrame,
    fold: &Fold,
    config: &ModelConfig,
    zero_threshold: f64,
) -> Result<FoldForecast, FailureReason> {
    fit_and_score(frame, fold, config, zero_threshold, CancellationToken::new())
}

fn fit_and_score(
    frame: &TimeSeriesFrame,
    fold: &Fold,
    config: &ModelConfig,
    zero_threshold: f64,
    abort: CancellationToken,
) -> Result<FoldForecast, FailureReason> {
    let train = frame.slice(fold.train.clone())?;
    let test = frame.covariate_block(fold.test.clone())?;

    let adapter = config.build_abortable(abort);
    let fitted = adapter.fit(&train)?;
    let forecast = fitted.predict(fold.horizon(), &test)?;
    drop(fitted);

    if forecast.horizon() != fold.horizon() {
        return Err(PredictError::WrongLength {
            expected: fold.horizon(),
            got: forecast.horizon(),
        }
        .into());
    }
    if let Some(step) = forecast.point().iter().position(|v| !v.is_finite()) {
        return Err(PredictError::NonFiniteForecast { step }.into());
    }

    let actual = &frame.target()[fold.test.clone()];
    let metrics = evaluate_forecast(actual, &forecast, zero_threshold).ok_or(
        PredictError::WrongLength {
            expected: actual.len(),
            got: forecast.horizon(),
        },
    )?;

    Ok(FoldForecast { forecast, metrics })
}

/// [`run_fold_model`] with panic capture and an optional wall-clock limit.
///
/// With a limit the work runs on a helper thread. On timeout `abort` is
/// raised so abortable fits stop early, and the helper's result is discarded.
pub(crate) fn run_guarded(
    frame: Arc<TimeSeriesFrame>,
    fold: Fold,
    config: ModelConfig,
    zero_threshold: f64,
    timeout: Option<Duration>,
    abort: CancellationToken,
) -> Result<FoldForecast, FailureReason> {
    let Some(limit) = timeout else {
        return catch_panic(|| fit_and_score(&frame, &fold, &config, zero_threshold, abort));
    };

    let (tx, rx) = mpsc::channel();
    let name = format!("fit-{}-fold{}", config.id, fold.id);
    let helper_abort = abort.clone();
    let spawned = thread::Builder::new().name(name).spawn(move || {
        let result =
            catch_panic(|| fit_and_score(&frame, &fold, &config, zero_threshold, helper_abort));
        // The receiver is gone after a timeout
        let _ = tx.send(result);
    });
    if let Err(err) = spawned {
        return Err(FailureReason::WorkerUnavailable(err.to_string()));
    }

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            abort.cancel();
            Err(FailureReason::Timeout {
                limit_ms: limit.as_millis() as u64,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(FailureReason::Panicked(
            "worker exited without a result".into(),
        )),
    }
}

/// Turn a panic inside `f` into [`FailureReason::Panicked`].
pub(crate) fn catch_panic<T, F>(f: F) -> Result<T, FailureReason>
where
    F: FnOnce() -> Result<T, FailureReason>,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(FailureReason::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::fold::{generate_folds, FoldConfig};
    use crate::core::{FeatureSpec, Frequency};
    use crate::error::FitError;
    use crate::models::{AutoregressiveParams, DecompositionParams, TreeEnsembleParams};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn frame(n: usize) -> TimeSeriesFrame {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let timestamps = (0..n).map(|d| start + ChronoDuration::days(d as i64)).collect();
        let values = (0..n)
            .map(|i| 20.0 + 4.0 * ((i % 7) as f64) + 0.3 * ((i * 11) % 5) as f64)
            .collect();
        TimeSeriesFrame::univariate(timestamps, values, Frequency::Fixed(ChronoDuration::days(1)))
            .unwrap()
    }

    #[test]
    fn scores_the_test_window() {
        let frame = frame(60);
        let folds = generate_folds(&frame, &FoldConfig::fixed(42, 7, 7)).unwrap();
        let config = ModelConfig::decomposition("dec", DecompositionParams::new(7));

        let result = run_fold_model(&frame, &folds[0], &config, 1e-8).unwrap();
        assert_eq!(result.forecast.timestamps(), &frame.timestamps()[42..49]);
        assert!(result.metrics.mae >= 0.0);
        assert!(result.metrics.coverage.is_some());
    }

    #[test]
    fn fit_errors_become_failure_reasons() {
        let frame = frame(30);
        let folds = generate_folds(&frame, &FoldConfig::fixed(10, 5, 5)).unwrap();
        let config = ModelConfig::decomposition("dec", DecompositionParams::new(7));

        let err = run_fold_model(&frame, &folds[0], &config, 1e-8).unwrap_err();
        assert_eq!(
            err,
            FailureReason::Fit(FitError::InsufficientHistory { needed: 14, got: 10 })
        );
    }

    #[test]
    fn horizon_beyond_model_maximum_fails_prediction() {
        let frame = frame(60);
        let folds = generate_folds(&frame, &FoldConfig::fixed(40, 10, 10)).unwrap();
        let config =
            ModelConfig::autoregressive("ar", AutoregressiveParams::new(1, 0)).with_max_horizon(5);

        let err = run_fold_model(&frame, &folds[0], &config, 1e-8).unwrap_err();
        assert!(matches!(
            err,
            FailureReason::Predict(PredictError::HorizonTooLarge { requested: 10, max: 5 })
        ));
    }

    #[test]
    fn guarded_run_matches_direct_run() {
        let frame = Arc::new(frame(60));
        let folds = generate_folds(&frame, &FoldConfig::fixed(42, 7, 7)).unwrap();
        let config = ModelConfig::decomposition("dec", DecompositionParams::new(7));

        let direct = run_fold_model(&frame, &folds[1], &config, 1e-8).unwrap();
        let guarded = run_guarded(
            Arc::clone(&frame),
            folds[1].clone(),
            config,
            1e-8,
            Some(Duration::from_secs(30)),
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(direct, guarded);
    }

    #[test]
    fn timeout_raises_abort_for_the_helper() {
        let n = 400;
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let temperature: Vec<f64> = (0..n).map(|i| ((i * 17) % 31) as f64).collect();
        let frame = Arc::new(
            TimeSeriesFrame::builder()
                .timestamps((0..n).map(|d| start + ChronoDuration::days(d as i64)).collect())
                .target(temperature.iter().map(|t| 10.0 + 0.5 * t).collect())
                .covariate(FeatureSpec::continuous("temperature"), temperature)
                .frequency(Frequency::Fixed(ChronoDuration::days(1)))
                .build()
                .unwrap(),
        );
        let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
        let heavy = ModelConfig::tree_ensemble(
            "slow_rf",
            TreeEnsembleParams::new(vec!["temperature".into()])
                .with_trees(5_000)
                .with_max_depth(20)
                .with_min_samples_leaf(1),
        );
        let abort = CancellationToken::new();

        let err = run_guarded(
            frame,
            folds[0].clone(),
            heavy,
            1e-8,
            Some(Duration::from_millis(1)),
            abort.clone(),
        )
        .unwrap_err();
        assert_eq!(err, FailureReason::Timeout { limit_ms: 1 });
        assert!(abort.is_cancelled());
    }

    #[test]
    fn panics_are_captured() {
        let result: Result<FoldForecast, _> = catch_panic(|| panic!("boom"));
        assert_eq!(result.unwrap_err(), FailureReason::Panicked("boom".into()));
    }
}
