//! Bagged forest of regression trees.

use super::regression_tree::{RegressionTree, TreeSettings};
use crate::backtest::CancellationToken;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ForestSettings {
    pub n_trees: usize,
    pub bootstrap: bool,
    pub tree: TreeSettings,
}

/// Trees plus the residual scale used for intervals.
#[derive(Debug, Clone)]
pub(crate) struct Forest {
    trees: Vec<RegressionTree>,
    residual_sigma: f64,
    oob_rows: usize,
}

impl Forest {
    /// Fit all trees from one seeded generator, so equal seeds give equal forests.
    ///
    /// Returns `None` if `abort` is raised before the last tree is grown.
    pub(crate) fn fit(
        columns: &[&[f64]],
        y: &[f64],
        settings: &ForestSettings,
        seed: u64,
        abort: &CancellationToken,
    ) -> Option<Self> {
        let n = y.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(settings.n_trees);

        let mut oob_sum = vec![0.0; n];
        let mut oob_count = vec![0usize; n];
        let mut row = vec![0.0; columns.len()];

        for _ in 0..settings.n_trees {
            if abort.is_cancelled() {
                return None;
            }
            let sample: Vec<usize> = if settings.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let tree = RegressionTree::grow(columns, y, &sample, &settings.tree, &mut rng);

            if settings.bootstrap {
                let mut in_bag = vec![false; n];
                for &r in &sample {
                    in_bag[r] = true;
                }
                for obs in (0..n).filter(|&obs| !in_bag[obs]) {
                    fill_row(columns, obs, &mut row);
                    oob_sum[obs] += tree.predict(&row);
                    oob_count[obs] += 1;
                }
            }
            trees.push(tree);
        }

        let mut forest = Self {
            trees,
            residual_sigma: 0.0,
            oob_rows: 0,
        };

        let oob_residuals: Vec<f64> = (0..n)
            .filter(|&obs| oob_count[obs] > 0)
            .map(|obs| y[obs] - oob_sum[obs] / oob_count[obs] as f64)
            .collect();

        let residuals = if oob_residuals.len() >= 2 {
            forest.oob_rows = oob_residuals.len();
            oob_residuals
        } else {
            // In-sample residuals understate the error but keep intervals defined
            (0..n)
                .map(|obs| {
                    fill_row(columns, obs, &mut row);
                    y[obs] - forest.predict(&row)
                })
                .collect()
        };
        forest.residual_sigma =
            (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len().max(1) as f64).sqrt();
        Some(forest)
    }

    /// Mean prediction over all trees.
    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub(crate) fn residual_sigma(&self) -> f64 {
        self.residual_sigma
    }

    /// Rows that contributed out-of-bag residuals (0 when in-sample residuals were used).
    pub(crate) fn oob_rows(&self) -> usize {
        self.oob_rows
    }
}

pub(crate) fn fill_row(columns: &[&[f64]], obs: usize, row: &mut [f64]) {
    for (slot, column) in row.iter_mut().zip(columns) {
        *slot = column[obs];
    }
}
