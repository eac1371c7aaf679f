//! Statistics over latency samples and day-to-day series.

use serde::{Deserialize, Serialize};

use crate::domain::models::LatencySummary;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Index of the nearest-rank percentile `pct` (0-100) in a sorted slice of
/// length `len`. `len` must be non-zero.
pub fn nearest_rank_index(len: usize, pct: f64) -> usize {
    let rank = ((pct / 100.0) * len as f64).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = rank.max(1.0) as usize;
    rank.min(len) - 1
}

/// Summarize latencies given in integer nanoseconds.
///
/// The input order does not matter: values are sorted before any floating
/// point work, so the result is identical for every permutation.
pub fn summarize_nanos(latencies: &[u64]) -> Option<LatencySummary> {
    if latencies.is_empty() {
        return None;
    }
    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let count = sorted.len();
    let total: u128 = sorted.iter().map(|&n| u128::from(n)).sum();
    let mean = total as f64 / count as f64 / NANOS_PER_MILLI;

    let to_ms = |n: u64| n as f64 / NANOS_PER_MILLI;
    let (p50, p95) = if count < 2 {
        (mean, mean)
    } else {
        (
            to_ms(sorted[nearest_rank_index(count, 50.0)]),
            to_ms(sorted[nearest_rank_index(count, 95.0)]),
        )
    };

    let values: Vec<f64> = sorted.iter().copied().map(to_ms).collect();
    let stddev = sample_stddev(&values, mean);

    Some(LatencySummary {
        count,
        mean,
        p50,
        p95,
        min: to_ms(sorted[0]),
        max: to_ms(sorted[count - 1]),
        stddev,
        cv: coefficient_of_variation(stddev, mean),
    })
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator); 0 with fewer than two values.
pub fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// stddev / mean, 0 when the mean is 0.
pub fn coefficient_of_variation(stddev: f64, mean: f64) -> f64 {
    if mean.abs() < f64::EPSILON {
        0.0
    } else {
        stddev / mean
    }
}

/// Descriptive statistics of a series of percentages or latencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub n: usize,
    pub mean: f64,
    pub stddev: f64,
    /// Coefficient of variation, as a percentage
    pub cv_pct: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

/// Describe a series; `None` for an empty series.
pub fn describe(values: &[f64]) -> Option<SeriesStats> {
    let mean = mean(values)?;
    let stddev = sample_stddev(values, mean);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(SeriesStats {
        n: values.len(),
        mean,
        stddev,
        cv_pct: coefficient_of_variation(stddev, mean) * 100.0,
        min,
        max,
        range: max - min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_indices() {
        assert_eq!(nearest_rank_index(1, 50.0), 0);
        assert_eq!(nearest_rank_index(2, 50.0), 0);
        assert_eq!(nearest_rank_index(2, 95.0), 1);
        assert_eq!(nearest_rank_index(10, 50.0), 4);
        assert_eq!(nearest_rank_index(10, 95.0), 9);
        assert_eq!(nearest_rank_index(100, 95.0), 94);
    }

    #[test]
    fn single_sample_percentiles_equal_mean() {
        let summary = summarize_nanos(&[12_000_000]).unwrap();
        assert_eq!(summary.count, 1);
        assert!((summary.mean - 12.0).abs() < f64::EPSILON);
        assert!((summary.p50 - summary.mean).abs() < f64::EPSILON);
        assert!((summary.p95 - summary.mean).abs() < f64::EPSILON);
        assert!(summary.stddev.abs() < f64::EPSILON);
    }

    #[test]
    fn two_samples_mean_is_fifteen() {
        let summary = summarize_nanos(&[20_000_000, 10_000_000]).unwrap();
        assert!((summary.mean - 15.0).abs() < 1e-9);
        assert!((summary.min - 10.0).abs() < 1e-9);
        assert!((summary.max - 20.0).abs() < 1e-9);
        assert!((summary.p50 - 10.0).abs() < 1e-9);
        assert!((summary.p95 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(summarize_nanos(&[]).is_none());
        assert!(describe(&[]).is_none());
    }

    #[test]
    fn describe_series() {
        let stats = describe(&[80.0, 90.0, 100.0]).unwrap();
        assert_eq!(stats.n, 3);
        assert!((stats.mean - 90.0).abs() < 1e-9);
        assert!((stats.stddev - 10.0).abs() < 1e-9);
        assert!((stats.range - 20.0).abs() < 1e-9);
        assert!((stats.cv_pct - 100.0 / 9.0).abs() < 1e-9);
    }
}
