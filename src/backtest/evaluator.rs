//! Rolling-origin evaluator: runs every model on every fold and commits the
//! results to the scoreboard in fold order.
//!
//! Each (fold, model) pair is an independent task on a rayon pool. Tasks build
//! a fresh adapter from the model config, so no two fits share an instance.
//! Results come back over a channel to the calling thread, which is the only
//! writer to the scoreboard. A reorder buffer holds completed folds until all
//! earlier folds are committed, so fold ids reach the scoreboard in increasing
//! order regardless of completion order.

use super::audit::{FoldAudit, ModelStatus};
use super::cancel::CancellationToken;
use super::fold::Fold;
use super::runner::{run_guarded, FoldForecast};
use crate::core::TimeSeriesFrame;
use crate::error::{FailureReason, OrchestratorError, Result};
use crate::models::ModelConfig;
use crate::scoreboard::Scoreboard;
use crate::utils::metrics::DEFAULT_ZERO_THRESHOLD;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const FOLD_PENDING: u8 = 0;
const FOLD_RUNNING: u8 = 1;
const FOLD_SKIPPED: u8 = 2;

/// Execution limits for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorSettings {
    /// Worker threads; `None` uses rayon's default.
    pub max_workers: Option<usize>,
    /// Wall-clock limit for one fit+predict call.
    pub timeout: Option<Duration>,
    /// Actuals at or below this magnitude are left out of MAPE.
    pub mape_zero_threshold: f64,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            timeout: None,
            mape_zero_threshold: DEFAULT_ZERO_THRESHOLD,
        }
    }
}

/// What the evaluator did, fold by fold.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    /// One audit per generated fold, in fold order.
    pub audit: Vec<FoldAudit>,
    /// Ids of folds that ran (not skipped), in order.
    pub processed_folds: Vec<usize>,
    /// Whether cancellation caused any fold to be skipped.
    pub cancelled: bool,
}

impl BacktestOutcome {
    pub fn last_processed_fold(&self) -> Option<usize> {
        self.processed_folds.last().copied()
    }
}

enum TaskResult {
    Finished(std::result::Result<FoldForecast, FailureReason>),
    Skipped,
}

struct TaskMessage {
    fold_index: usize,
    model_index: usize,
    result: TaskResult,
}

/// Drives temporal cross-validation over a fixed set of folds and models.
#[derive(Debug, Clone)]
pub struct RollingOriginEvaluator {
    folds: Vec<Fold>,
    models: Vec<ModelConfig>,
    settings: EvaluatorSettings,
    cancel: CancellationToken,
}

impl RollingOriginEvaluator {
    pub fn new(folds: Vec<Fold>, models: Vec<ModelConfig>, settings: EvaluatorSettings) -> Self {
        Self {
            folds,
            models,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn folds(&self) -> &[Fold] {
        &self.folds
    }

    pub fn models(&self) -> &[ModelConfig] {
        &self.models
    }

    /// Run all tasks and commit their results to `scoreboard`.
    ///
    /// Fit and predict failures never end the run; they are recorded against
    /// the model and fold. A fold either runs for all models or, once
    /// cancellation is raised before it started, is skipped for all of them.
    pub fn run(&self, frame: Arc<TimeSeriesFrame>, scoreboard: &Scoreboard) -> Result<BacktestOutcome> {
        let n_folds = self.folds.len();
        let n_models = self.models.len();

        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("airq-worker-{i}"));
        if let Some(workers) = self.settings.max_workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| OrchestratorError::WorkerPool(e.to_string()))?;

        info!(
            folds = n_folds,
            models = n_models,
            workers = pool.current_num_threads(),
            "starting rolling-origin evaluation"
        );

        let fold_states: Arc<Vec<AtomicU8>> =
            Arc::new((0..n_folds).map(|_| AtomicU8::new(FOLD_PENDING)).collect());
        let (tx, rx) = mpsc::channel::<TaskMessage>();

        for (fold_index, fold) in self.folds.iter().enumerate() {
            for (model_index, model) in self.models.iter().enumerate() {
                let tx = tx.clone();
                let frame = Arc::clone(&frame);
                let states = Arc::clone(&fold_states);
                let cancel = self.cancel.clone();
                let fold = fold.clone();
                let model = model.clone();
                let timeout = self.settings.timeout;
                let threshold = self.settings.mape_zero_threshold;

                pool.spawn(move || {
                    let result = if claim_fold(&states[fold_index], &cancel) {
                        TaskResult::Finished(run_guarded(
                            frame,
                            fold,
                            model,
                            threshold,
                            timeout,
                            CancellationToken::new(),
                        ))
                    } else {
                        TaskResult::Skipped
                    };
                    // The evaluator outlives every task; a send error means it bailed out
                    let _ = tx.send(TaskMessage {
                        fold_index,
                        model_index,
                        result,
                    });
                });
            }
        }
        drop(tx);

        let mut buffer: Vec<Vec<Option<TaskResult>>> = (0..n_folds)
            .map(|_| (0..n_models).map(|_| None).collect())
            .collect();
        let mut remaining = vec![n_models; n_folds];
        let mut next_commit = 0;
        let mut outcome = BacktestOutcome {
            audit: Vec::with_capacity(n_folds),
            processed_folds: Vec::new(),
            cancelled: false,
        };

        for message in rx.iter() {
            buffer[message.fold_index][message.model_index] = Some(message.result);
            remaining[message.fold_index] -= 1;

            while next_commit < n_folds && remaining[next_commit] == 0 {
                let results = std::mem::take(&mut buffer[next_commit]);
                self.commit_fold(next_commit, results, &frame, scoreboard, &mut outcome);
                next_commit += 1;
            }
        }

        // Only reached early if a worker died without reporting
        while next_commit < n_folds {
            let results = std::mem::take(&mut buffer[next_commit]);
            self.commit_fold(next_commit, results, &frame, scoreboard, &mut outcome);
            next_commit += 1;
        }

        info!(
            processed = outcome.processed_folds.len(),
            skipped = n_folds - outcome.processed_folds.len(),
            cancelled = outcome.cancelled,
            "rolling-origin evaluation finished"
        );
        Ok(outcome)
    }

    fn commit_fold(
        &self,
        fold_index: usize,
        results: Vec<Option<TaskResult>>,
        frame: &TimeSeriesFrame,
        scoreboard: &Scoreboard,
        outcome: &mut BacktestOutcome,
    ) {
        let fold = &self.folds[fold_index];
        let mut audit = FoldAudit::new(fold);

        let skipped = results.iter().any(|r| matches!(r, Some(TaskResult::Skipped)));
        if skipped {
            for model in &self.models {
                audit.push(model.id.as_str(), ModelStatus::Skipped);
            }
            debug!(fold = fold.id, "fold skipped after cancellation");
            outcome.cancelled = true;
            outcome.audit.push(audit);
            return;
        }

        let actual = frame.target()[fold.test.clone()].to_vec();
        scoreboard.register_fold(fold.id, actual);

        for (model, result) in self.models.iter().zip(results) {
            let result = match result {
                Some(TaskResult::Finished(result)) => result,
                _ => Err(FailureReason::WorkerUnavailable(
                    "task ended without reporting a result".into(),
                )),
            };
            match result {
                Ok(FoldForecast { forecast, metrics }) => {
                    debug!(fold = fold.id, model = %model.id, rmse = metrics.rmse, "model ok");
                    scoreboard.record_success(fold.id, &model.id, forecast, &metrics);
                    audit.push(model.id.as_str(), ModelStatus::Ok);
                }
                Err(reason) => {
                    warn!(fold = fold.id, model = %model.id, %reason, "model failed on fold");
                    scoreboard.record_failure(fold.id, &model.id, reason.clone());
                    audit.push(model.id.as_str(), ModelStatus::Failed { reason });
                }
            }
        }

        debug!(fold = fold.id, ok = audit.successful(), "fold committed");
        outcome.processed_folds.push(fold.id);
        outcome.audit.push(audit);
    }
}

/// Decide once per fold whether it runs. Returns false if the fold is skipped.
fn claim_fold(state: &AtomicU8, cancel: &CancellationToken) -> bool {
    let target = if cancel.is_cancelled() {
        FOLD_SKIPPED
    } else {
        FOLD_RUNNING
    };
    match state.compare_exchange(FOLD_PENDING, target, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => target == FOLD_RUNNING,
        Err(current) => current == FOLD_RUNNING,
    }
}
