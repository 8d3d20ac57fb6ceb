//! Sample Statistics
//!
//! Pure math over probe sample slices. No external dependencies -
//! everything here is plain Rust shared by the rings, the probe pool,
//! and the selectors.

/// Empirical median with the interpolated-midpoint convention:
/// for an even number of samples the median is the mean of the two
/// middle values.
///
/// Returns `None` for an empty slice.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Arithmetic mean over the current samples, `None` when empty.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}
