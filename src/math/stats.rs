//! NaN-aware summary statistics and the sigma-clipping metrics.
//!
//! Excluded stars carry NaN in their distance slot, so every statistic here
//! skips NaN entries rather than propagating them.
//!
//! A metric maps a vector of distances to a vector of scores of the same
//! length (NaN in, NaN out). The clipping loop keeps a star while
//! `|score| < sigma`.

use crate::domain::SigmaMethod;

/// Scoring strategy used by the sigma-clipping loop.
pub type SigmaMetric = fn(&[f64]) -> Vec<f64>;

/// Consistency constant turning a MAD into a Gaussian standard deviation.
const MAD_TO_STD: f64 = 1.482_602_218_505_602;

impl SigmaMethod {
    /// Resolve the configured method to its scoring function.
    pub fn metric(self) -> SigmaMetric {
        match self {
            SigmaMethod::Zscore => zscore,
            SigmaMethod::Mad => mad_score,
        }
    }
}

/// Mean over the non-NaN entries, `None` if there are none.
pub fn nan_mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}

/// Population standard deviation (ddof = 0) over the non-NaN entries.
pub fn nan_std(values: &[f64]) -> Option<f64> {
    let mean = nan_mean(values)?;
    let (ss, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), &v| (s + (v - mean) * (v - mean), n + 1));
    Some((ss / n as f64).sqrt())
}

/// Median over the non-NaN entries.
pub fn nan_median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    median_mut(&mut finite)
}

/// Median absolute deviation from the median, over the non-NaN entries.
pub fn nan_mad(values: &[f64]) -> Option<f64> {
    let median = nan_median(values)?;
    let mut dev: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - median).abs())
        .collect();
    median_mut(&mut dev)
}

fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Standard score `(x - mean) / std`.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let center = nan_mean(values);
    let scale = nan_std(values);
    standardize(values, center, scale)
}

/// Robust score `(x - median) / (1.4826 * MAD)`.
pub fn mad_score(values: &[f64]) -> Vec<f64> {
    let center = nan_median(values);
    let scale = nan_mad(values).map(|m| m * MAD_TO_STD);
    standardize(values, center, scale)
}

// A zero or non-finite spread means there is nothing to reject: every
// non-NaN entry scores 0.
fn standardize(values: &[f64], center: Option<f64>, scale: Option<f64>) -> Vec<f64> {
    match (center, scale) {
        (Some(c), Some(s)) if s.is_finite() && s > 0.0 => {
            values.iter().map(|&v| (v - c) / s).collect()
        }
        _ => values
            .iter()
            .map(|&v| if v.is_nan() { f64::NAN } else { 0.0 })
            .collect(),
    }
}
