//! Property-based tests for fold generation and ensemble weighting.
//!
//! These tests verify invariants that should hold for all valid configurations.

use airq_forecast::backtest::{fold_ranges, generate_folds, FoldConfig, WindowMode};
use airq_forecast::core::{ForecastResult, Frequency, TimeSeriesFrame};
use airq_forecast::ensemble::{EnsembleCombiner, EnsembleConfig, EnsembleWeights};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

fn make_frame(n: usize) -> TimeSeriesFrame {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let timestamps = (0..n).map(|i| base + Duration::hours(i as i64)).collect();
    TimeSeriesFrame::univariate(timestamps, vec![1.0; n], Frequency::Fixed(Duration::hours(1)))
        .unwrap()
}

/// Valid fold configurations over either window mode.
fn fold_config_strategy() -> impl Strategy<Value = FoldConfig> {
    (any::<bool>(), 1usize..80, 1usize..30, 1usize..20).prop_map(
        |(expanding, window, step, horizon)| {
            if expanding {
                FoldConfig::expanding(window, step, horizon)
            } else {
                FoldConfig::fixed(window, step, horizon)
            }
        },
    )
}

fn model_ids(k: usize) -> Vec<String> {
    (0..k).map(|i| format!("model_{i}")).collect()
}

// =============================================================================
// Property: folds never leak test rows into training
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn train_always_precedes_test(config in fold_config_strategy(), n in 1usize..400) {
        let ranges = fold_ranges(n, &config);
        for (train, test) in &ranges {
            prop_assert!(train.end <= test.start);
            prop_assert_eq!(test.len(), config.horizon);
            prop_assert!(test.end <= n);
            match config.window_mode {
                WindowMode::Fixed => prop_assert_eq!(train.len(), config.window_length),
                WindowMode::Expanding => prop_assert_eq!(train.start, 0),
            }
        }
    }

    #[test]
    fn fold_origins_advance_by_step(config in fold_config_strategy(), n in 1usize..400) {
        let ranges = fold_ranges(n, &config);
        for pair in ranges.windows(2) {
            prop_assert_eq!(pair[1].1.start - pair[0].1.start, config.step);
        }
        // The next origin would not fit
        if let Some((_, last)) = ranges.last() {
            prop_assert!(last.start + config.step + config.horizon > n);
        }
    }

    #[test]
    fn fold_bounds_are_strictly_ordered(config in fold_config_strategy(), n in 1usize..200) {
        let frame = make_frame(n);
        match generate_folds(&frame, &config) {
            Ok(folds) => {
                for (i, fold) in folds.iter().enumerate() {
                    prop_assert_eq!(fold.id, i);
                    prop_assert!(fold.train_bounds.end < fold.test_bounds.start);
                }
                for pair in folds.windows(2) {
                    prop_assert!(pair[0].test_bounds.start < pair[1].test_bounds.start);
                }
            }
            Err(_) => prop_assert!(n < config.window_length + config.horizon),
        }
    }
}

// =============================================================================
// Property: weight sets
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn uniform_weights_are_one_over_k(k in 1usize..25) {
        let weights = EnsembleWeights::uniform(&model_ids(k));
        prop_assert_eq!(weights.len(), k);
        for (_, w) in weights.iter() {
            prop_assert!((w - 1.0 / k as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn inverse_error_weights_decrease_with_error(
        errors in prop::collection::vec(0.0..50.0_f64, 2..10),
        epsilon in 1e-9..1e-3_f64,
    ) {
        let named: Vec<(String, f64)> = model_ids(errors.len()).into_iter().zip(errors).collect();
        let weights = EnsembleWeights::inverse_error(&named, epsilon);
        prop_assert!((weights.total() - 1.0).abs() < 1e-9);

        for (a_id, a_err) in &named {
            for (b_id, b_err) in &named {
                let (wa, wb) = (weights.get(a_id).unwrap(), weights.get(b_id).unwrap());
                if a_err < b_err {
                    prop_assert!(wa > wb);
                }
                prop_assert!(wa >= 0.0);
            }
        }
    }

    #[test]
    fn combined_point_lies_within_member_range(
        members in prop::collection::vec(prop::collection::vec(-100.0..100.0_f64, 5), 1..6),
        raw in prop::collection::vec(0.01..10.0_f64, 6),
    ) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stamps: Vec<_> = (0..5).map(|i| base + Duration::days(i)).collect();
        let ids = model_ids(members.len());
        let forecasts: Vec<(String, ForecastResult)> = ids
            .iter()
            .cloned()
            .zip(members.iter().map(|v| ForecastResult::from_values(stamps.clone(), v.clone())))
            .collect();
        let errors: Vec<(String, f64)> = ids.iter().cloned().zip(raw).collect();
        let weights = EnsembleWeights::inverse_error(&errors, 1e-8);

        let combined = EnsembleCombiner::new(EnsembleConfig::default())
            .combine(&forecasts, &weights)
            .unwrap();
        for step in 0..5 {
            let lo = members.iter().map(|m| m[step]).fold(f64::INFINITY, f64::min);
            let hi = members.iter().map(|m| m[step]).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(combined.point()[step] >= lo - 1e-9);
            prop_assert!(combined.point()[step] <= hi + 1e-9);
        }
    }
}
