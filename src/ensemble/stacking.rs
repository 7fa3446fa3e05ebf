//! Non-negative least squares for stacked ensemble weights.
//!
//! Lawson–Hanson active set on the normal equations. The design has one column
//! per member model, so the systems stay tiny.

use crate::utils::ols::solve_symmetric;

/// Minimise `||y - X w||²` subject to `w >= 0`, without intercept.
///
/// `columns[j]` holds member `j`'s predictions; all columns have `y.len()` rows.
pub fn nnls(columns: &[Vec<f64>], y: &[f64]) -> Vec<f64> {
    let k = columns.len();
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for i in 0..k {
        xty[i] = dot(&columns[i], y);
        for j in 0..=i {
            let v = dot(&columns[i], &columns[j]);
            xtx[i][j] = v;
            xtx[j][i] = v;
        }
    }

    let scale = xty.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    let tol = 1e-10 * scale;

    let mut w = vec![0.0; k];
    let mut active = vec![false; k];
    // Columns that made the passive system singular are never retried
    let mut blocked = vec![false; k];

    for _ in 0..3 * k.max(1) {
        let gradient: Vec<f64> = (0..k)
            .map(|j| xty[j] - (0..k).map(|i| xtx[j][i] * w[i]).sum::<f64>())
            .collect();
        let candidate = (0..k)
            .filter(|&j| !active[j] && !blocked[j] && gradient[j] > tol)
            .max_by(|&a, &b| gradient[a].total_cmp(&gradient[b]));
        let Some(entering) = candidate else {
            break;
        };
        active[entering] = true;

        loop {
            let passive: Vec<usize> = (0..k).filter(|&j| active[j]).collect();
            let sub_a: Vec<Vec<f64>> = passive
                .iter()
                .map(|&i| passive.iter().map(|&j| xtx[i][j]).collect())
                .collect();
            let sub_b: Vec<f64> = passive.iter().map(|&i| xty[i]).collect();
            let Some(solution) = solve_symmetric(&sub_a, &sub_b) else {
                active[entering] = false;
                blocked[entering] = true;
                break;
            };

            if solution.iter().all(|&s| s > 0.0) {
                for (&j, &s) in passive.iter().zip(&solution) {
                    w[j] = s;
                }
                break;
            }

            // Step towards the unconstrained solution until a weight hits zero
            let alpha = passive
                .iter()
                .zip(&solution)
                .filter(|(_, s)| **s <= 0.0)
                .map(|(&j, &s)| w[j] / (w[j] - s))
                .fold(1.0_f64, f64::min);
            for (&j, &s) in passive.iter().zip(&solution) {
                w[j] += alpha * (s - w[j]);
                if w[j] <= tol {
                    w[j] = 0.0;
                    active[j] = false;
                }
            }
            if active.iter().all(|a| !a) {
                break;
            }
        }
    }
    w
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_mixture() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0, 1.0, 0.0, 1.0, 2.0];
        let y: Vec<f64> = a.iter().zip(&b).map(|(x, z)| 0.7 * x + 0.3 * z).collect();
        let w = nnls(&[a, b], &y);
        assert_relative_eq!(w[0], 0.7, epsilon = 1e-9);
        assert_relative_eq!(w[1], 0.3, epsilon = 1e-9);
    }

    #[test]
    fn clamps_harmful_members_to_zero() {
        let good = vec![1.0, 2.0, 3.0, 4.0];
        let anti = vec![4.0, 3.0, 2.0, 1.0];
        let w = nnls(&[good.clone(), anti], &good);
        assert_relative_eq!(w[0], 1.0, epsilon = 1e-9);
        assert_eq!(w[1], 0.0);
    }

    #[test]
    fn highly_correlated_members_resolve_exactly() {
        let exact = vec![10.0, 12.0, 14.0, 10.0, 12.0, 14.0];
        let offset: Vec<f64> = exact.iter().map(|v| v + 3.0).collect();
        let w = nnls(&[offset, exact.clone()], &exact);
        assert!(w[0] < 1e-9);
        assert_relative_eq!(w[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_column_gets_zero_weight() {
        let w = nnls(&[vec![0.0; 3], vec![1.0, 1.0, 1.0]], &[2.0, 2.0, 2.0]);
        assert_eq!(w[0], 0.0);
        assert_relative_eq!(w[1], 2.0, epsilon = 1e-9);
    }
}
