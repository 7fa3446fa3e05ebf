//! CART regression tree with variance-reduction splits.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Minimum SSE reduction for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeSettings {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Number of candidate features drawn at each split.
    pub features_per_split: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    root: Node,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Grow a tree on the given row indices (duplicates allowed for bootstrap samples).
    pub(crate) fn grow(
        columns: &[&[f64]],
        y: &[f64],
        rows: &[usize],
        settings: &TreeSettings,
        rng: &mut StdRng,
    ) -> Self {
        let mut rows = rows.to_vec();
        let root = grow_node(columns, y, &mut rows, 0, settings, rng);
        Self { root }
    }

    /// Predict one observation; `row[j]` is the value of feature `j`.
    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

fn leaf_value(y: &[f64], rows: &[usize]) -> f64 {
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

fn grow_node(
    columns: &[&[f64]],
    y: &[f64],
    rows: &mut [usize],
    depth: usize,
    settings: &TreeSettings,
    rng: &mut StdRng,
) -> Node {
    let n = rows.len();
    if depth >= settings.max_depth || n < 2 * settings.min_samples_leaf {
        return Node::Leaf(leaf_value(y, rows));
    }

    let split = match best_split(columns, y, rows, settings, rng) {
        Some(split) if split.gain > MIN_GAIN => split,
        _ => return Node::Leaf(leaf_value(y, rows)),
    };

    let column = columns[split.feature];
    rows.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
    let cut = rows.partition_point(|&r| column[r] <= split.threshold);
    let (left_rows, right_rows) = rows.split_at_mut(cut);

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(grow_node(columns, y, left_rows, depth + 1, settings, rng)),
        right: Box::new(grow_node(columns, y, right_rows, depth + 1, settings, rng)),
    }
}

fn best_split(
    columns: &[&[f64]],
    y: &[f64],
    rows: &[usize],
    settings: &TreeSettings,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let parent_score = total * total / n as f64;

    let mut candidates: Vec<usize> = (0..columns.len()).collect();
    let draw = settings.features_per_split.clamp(1, columns.len());
    let (chosen, _) = candidates.partial_shuffle(rng, draw);
    chosen.sort_unstable();

    let mut best: Option<BestSplit> = None;
    let mut order = rows.to_vec();

    for &feature in chosen.iter() {
        let column = columns[feature];
        order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

        let mut left_sum = 0.0;
        for i in 0..n - 1 {
            left_sum += y[order[i]];
            let left_n = i + 1;
            let right_n = n - left_n;
            if left_n < settings.min_samples_leaf || right_n < settings.min_samples_leaf {
                continue;
            }
            let here = column[order[i]];
            let next = column[order[i + 1]];
            // Only cut between distinct values
            if next <= here {
                continue;
            }

            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            let gain = score - parent_score;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: 0.5 * (here + next),
                    gain,
                });
            }
        }
    }
    best
}
