//! Per-fold audit log: fold bounds and what happened to each model.

use super::fold::{Fold, TimeRange};
use crate::error::FailureReason;
use std::fmt;

/// Outcome of one model on one fold.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    Ok,
    Failed { reason: FailureReason },
    /// The fold never started because the run was cancelled.
    Skipped,
}

impl ModelStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ModelStatus::Ok)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Ok => f.write_str("ok"),
            ModelStatus::Failed { reason } => write!(f, "failed: {reason}"),
            ModelStatus::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatusEntry {
    pub model_id: String,
    pub status: ModelStatus,
}

/// Audit record of one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldAudit {
    pub fold_id: usize,
    pub train_bounds: TimeRange,
    pub test_bounds: TimeRange,
    pub entries: Vec<ModelStatusEntry>,
}

impl FoldAudit {
    pub(crate) fn new(fold: &Fold) -> Self {
        Self {
            fold_id: fold.id,
            train_bounds: fold.train_bounds,
            test_bounds: fold.test_bounds,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, model_id: impl Into<String>, status: ModelStatus) {
        self.entries.push(ModelStatusEntry {
            model_id: model_id.into(),
            status,
        });
    }

    pub fn status(&self, model_id: &str) -> Option<&ModelStatus> {
        self.entries
            .iter()
            .find(|e| e.model_id == model_id)
            .map(|e| &e.status)
    }

    pub fn successful(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_ok()).count()
    }

    pub fn is_skipped(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|e| matches!(e.status, ModelStatus::Skipped))
    }
}

impl fmt::Display for FoldAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fold {}: train {} | test {}",
            self.fold_id, self.train_bounds, self.test_bounds
        )?;
        for entry in &self.entries {
            writeln!(f, "  {:<16} {}", entry.model_id, entry.status)?;
        }
        Ok(())
    }
}
