//! Integration tests for rolling-origin evaluation.
//!
//! A 400-day synthetic PM2.5 series with a temperature covariate is run through
//! fold generation, the evaluator and the scoreboard.

use airq_forecast::backtest::{
    generate_folds, run_fold_model, EvaluatorSettings, FoldConfig, ModelStatus,
    RollingOriginEvaluator,
};
use airq_forecast::core::{FeatureSpec, Frequency, TimeSeriesFrame};
use airq_forecast::ensemble::{EnsembleCombiner, EnsembleConfig};
use airq_forecast::error::{EnsembleError, FailureReason, FitError};
use airq_forecast::models::{
    AutoregressiveParams, DecompositionParams, ModelConfig, TreeEnsembleParams,
};
use airq_forecast::scoreboard::Scoreboard;
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Daily PM2.5 driven by temperature plus a weekly cycle and noise.
fn air_quality_frame(n: usize, temperature_gap: Option<usize>) -> TimeSeriesFrame {
    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    let weekly = [4.0, 5.0, 3.0, 1.0, -2.0, -5.0, -6.0];
    let mut rng = StdRng::seed_from_u64(2024);

    let timestamps = (0..n).map(|d| start + Duration::days(d as i64)).collect();
    let mut temperature = Vec::with_capacity(n);
    let mut pm25 = Vec::with_capacity(n);
    for i in 0..n {
        let temp = 15.0
            + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 365.0).sin()
            + rng.gen_range(-1.0..1.0);
        temperature.push(temp);
        pm25.push(20.0 + 0.8 * temp + weekly[i % 7] + rng.gen_range(-1.5..1.5));
    }
    if let Some(row) = temperature_gap {
        temperature[row] = f64::NAN;
    }

    TimeSeriesFrame::builder()
        .timestamps(timestamps)
        .target(pm25)
        .covariate(FeatureSpec::continuous("temperature"), temperature)
        .frequency(Frequency::Fixed(Duration::days(1)))
        .build()
        .unwrap()
}

fn models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::autoregressive("ar", AutoregressiveParams::new(7, 0)),
        ModelConfig::decomposition("weekly", DecompositionParams::new(7)),
        ModelConfig::tree_ensemble(
            "rf",
            TreeEnsembleParams::new(vec!["temperature".into()]).with_trees(20),
        )
        .with_seed(11),
    ]
}

fn settings(workers: usize) -> EvaluatorSettings {
    EvaluatorSettings {
        max_workers: Some(workers),
        ..Default::default()
    }
}

#[test]
fn four_hundred_days_give_four_weekly_folds() {
    let frame = air_quality_frame(400, None);
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();

    assert_eq!(folds.len(), 4);
    for fold in &folds {
        assert_eq!(fold.test.len(), 7);
        assert_eq!(fold.test_bounds.end - fold.test_bounds.start, Duration::days(6));
        assert!(fold.train_bounds.end < fold.test_bounds.start);
        assert_eq!(fold.train.end, fold.test.start);
    }
    for pair in folds.windows(2) {
        assert_eq!(
            pair[1].train_bounds.start - pair[0].train_bounds.start,
            Duration::days(30)
        );
    }
}

#[test]
fn scoreboard_sees_folds_in_time_order() {
    let frame = Arc::new(air_quality_frame(400, None));
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
    let board = Scoreboard::new();

    let outcome = RollingOriginEvaluator::new(folds, models(), settings(4))
        .run(frame, &board)
        .unwrap();

    assert_eq!(board.fold_ids(), vec![0, 1, 2, 3]);
    assert_eq!(outcome.processed_folds, vec![0, 1, 2, 3]);
    assert_eq!(board.records().len(), 12);
    assert!(board.records().iter().all(|r| r.is_ok()));
    let commit_order: Vec<usize> = board.records().iter().map(|r| r.fold_id).collect();
    assert!(commit_order.windows(2).all(|w| w[0] <= w[1]));
    for audit in &outcome.audit {
        assert_eq!(audit.entries.len(), 3);
        assert_eq!(audit.successful(), 3);
    }
}

#[test]
fn fold_results_do_not_depend_on_processing_order() {
    let frame = air_quality_frame(400, None);
    let folds = generate_folds(&frame, &FoldConfig::expanding(200, 40, 7)).unwrap();
    let threshold = 1e-8;

    for model in models() {
        let forward: Vec<_> = folds
            .iter()
            .map(|fold| run_fold_model(&frame, fold, &model, threshold).unwrap())
            .collect();
        let mut backward: Vec<_> = folds
            .iter()
            .rev()
            .map(|fold| run_fold_model(&frame, fold, &model, threshold).unwrap())
            .collect();
        backward.reverse();
        assert_eq!(forward, backward, "model {}", model.id);
    }
}

#[test]
fn repeated_fit_with_same_seed_is_identical() {
    let frame = air_quality_frame(400, None);
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
    let rf = models().pop().unwrap();

    let first = run_fold_model(&frame, &folds[2], &rf, 1e-8).unwrap();
    let second = run_fold_model(&frame, &folds[2], &rf, 1e-8).unwrap();
    assert_eq!(first.forecast, second.forecast);

    let reseeded = rf.clone().with_seed(12);
    let third = run_fold_model(&frame, &folds[2], &reseeded, 1e-8).unwrap();
    assert_ne!(first.forecast.point(), third.forecast.point());
}

#[test]
fn worker_count_does_not_change_results() {
    let frame = Arc::new(air_quality_frame(400, None));
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();

    let sorted_records = |workers: usize| {
        let board = Scoreboard::new();
        RollingOriginEvaluator::new(folds.clone(), models(), settings(workers))
            .run(Arc::clone(&frame), &board)
            .unwrap();
        let mut records = board.records();
        records.sort_by(|a, b| (a.fold_id, &a.model_id).cmp(&(b.fold_id, &b.model_id)));
        records
    };
    assert_eq!(sorted_records(1), sorted_records(8));
}

#[test]
fn fold_where_every_model_fails_has_no_viable_ensemble() {
    let exog_models = vec![
        ModelConfig::autoregressive(
            "arx",
            AutoregressiveParams::new(2, 0).with_exogenous(vec!["temperature".into()]),
        ),
        ModelConfig::tree_ensemble(
            "rf",
            TreeEnsembleParams::new(vec!["temperature".into()]).with_trees(10),
        ),
    ];
    // Row 10 only falls in the first fold's training window
    let frame = Arc::new(air_quality_frame(400, Some(10)));
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
    let board = Scoreboard::new();

    let outcome = RollingOriginEvaluator::new(folds, exog_models, settings(2))
        .run(frame, &board)
        .unwrap();

    assert_eq!(board.fold_ids(), vec![0, 1, 2, 3]);
    assert_eq!(board.successful_entries(0), 0);
    assert_eq!(board.successful_entries(1), 2);
    assert_eq!(
        outcome.audit[0].status("rf"),
        Some(&ModelStatus::Failed {
            reason: FailureReason::Fit(FitError::NonFiniteInput { index: 10 })
        })
    );

    let combiner = EnsembleCombiner::new(EnsembleConfig::default());
    assert_eq!(
        combiner.combine_fold(&board, 0).unwrap_err(),
        EnsembleError::NoViableModels { fold_id: Some(0) }
    );
    assert!(combiner.combine_fold(&board, 1).is_ok());
}

#[test]
fn timeouts_are_fold_local_failures() {
    let frame = Arc::new(air_quality_frame(400, None));
    let folds = generate_folds(&frame, &FoldConfig::fixed(300, 30, 7)).unwrap();
    let heavy = vec![ModelConfig::tree_ensemble(
        "slow_rf",
        TreeEnsembleParams::new(vec!["temperature".into()])
            .with_trees(5_000)
            .with_max_depth(20)
            .with_min_samples_leaf(1),
    )];
    let settings = EvaluatorSettings {
        max_workers: Some(2),
        timeout: Some(std::time::Duration::from_millis(1)),
        ..Default::default()
    };
    let board = Scoreboard::new();

    let outcome = RollingOriginEvaluator::new(folds, heavy, settings)
        .run(frame, &board)
        .unwrap();

    assert_eq!(outcome.processed_folds.len(), 4);
    for audit in &outcome.audit {
        assert_eq!(
            audit.status("slow_rf"),
            Some(&ModelStatus::Failed {
                reason: FailureReason::Timeout { limit_ms: 1 }
            })
        );
    }
    assert!(!board.has_success());
}
