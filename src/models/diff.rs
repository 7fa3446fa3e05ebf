//! Differencing utilities for the autoregressive adapter.

/// Apply differencing to a time series.
///
/// # Arguments
/// * `series` - The input series
/// * `d` - Differencing order (number of times to difference)
///
/// # Returns
/// The differenced series.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    if d == 0 || series.is_empty() {
        return series.to_vec();
    }

    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Integrate (reverse differencing) a forecast made on the differenced scale.
///
/// # Arguments
/// * `differenced` - Future values on the d-times differenced scale
/// * `original` - The undifferenced history the forecast continues
/// * `d` - Differencing order used
///
/// # Returns
/// The future values on the original scale.
pub fn integrate(differenced: &[f64], original: &[f64], d: usize) -> Vec<f64> {
    if d == 0 || differenced.is_empty() {
        return differenced.to_vec();
    }

    let mut result = differenced.to_vec();
    for level in (0..d).rev() {
        // Last observed value at this differencing level anchors the cumulative sum
        let init_value = *difference(original, level).last().unwrap_or(&0.0);

        let mut cumsum = init_value;
        for value in result.iter_mut() {
            cumsum += *value;
            *value = cumsum;
        }
    }

    result
}

/// Cumulative sums applied `d` times; maps psi-weights of the differenced
/// process onto the integrated one.
pub fn cumulate(weights: &[f64], d: usize) -> Vec<f64> {
    let mut result = weights.to_vec();
    for _ in 0..d {
        let mut acc = 0.0;
        for w in result.iter_mut() {
            acc += *w;
            *w = acc;
        }
    }
    result
}
