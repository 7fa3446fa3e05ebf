//! Immutable ensemble weight sets.

use super::WeightingStrategy;
use std::collections::BTreeMap;

/// Non-negative weights per model id, summing to one.
///
/// Every weighting run builds a new value; there is no way to change a weight
/// set after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleWeights {
    weights: BTreeMap<String, f64>,
    strategy: WeightingStrategy,
}

impl EnsembleWeights {
    /// Equal weight `1/k` for each of `k` models.
    pub fn uniform<S: AsRef<str>>(model_ids: &[S]) -> Self {
        let k = model_ids.len() as f64;
        Self {
            weights: model_ids
                .iter()
                .map(|id| (id.as_ref().to_string(), 1.0 / k))
                .collect(),
            strategy: WeightingStrategy::Uniform,
        }
    }

    /// Weight proportional to `1 / (error + epsilon)`.
    pub fn inverse_error(errors: &[(String, f64)], epsilon: f64) -> Self {
        let raw: Vec<(String, f64)> = errors
            .iter()
            .map(|(id, err)| (id.clone(), 1.0 / (err.max(0.0) + epsilon)))
            .collect();
        Self::normalized(raw, WeightingStrategy::InverseError)
    }

    /// Scale non-negative raw weights to sum to one. All-zero input becomes uniform.
    pub(crate) fn normalized(raw: Vec<(String, f64)>, strategy: WeightingStrategy) -> Self {
        let total: f64 = raw.iter().map(|(_, w)| w.max(0.0)).sum();
        if !(total > 0.0 && total.is_finite()) {
            let ids: Vec<String> = raw.into_iter().map(|(id, _)| id).collect();
            return Self::uniform(&ids);
        }
        Self {
            weights: raw
                .into_iter()
                .map(|(id, w)| (id, w.max(0.0) / total))
                .collect(),
            strategy,
        }
    }

    pub fn get(&self, model_id: &str) -> Option<f64> {
        self.weights.get(model_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(id, w)| (id.as_str(), *w))
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Strategy that actually produced these weights, after any fall-back.
    pub fn strategy(&self) -> WeightingStrategy {
        self.strategy
    }
}
