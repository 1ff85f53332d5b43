//! Disparate impact and chi-square significance.

use tracing::debug;

use crate::stats::chi_square_sf;
use crate::types::{ChiSquareResult, DisparateImpactResult, MetricError, MetricStatus, Result};

/// Disparate-impact ratio of `rate_a` against the reference `rate_b`.
///
/// The ratio is 0 when the reference rate is 0. The rule passes iff
/// `ratio >= min_ratio` (0.8 for the classic four-fifths rule).
pub fn disparate_impact_ratio(rate_a: f64, rate_b: f64, min_ratio: f64) -> DisparateImpactResult {
    let ratio = if rate_b > 0.0 { rate_a / rate_b } else { 0.0 };
    DisparateImpactResult {
        status: MetricStatus::Computed,
        group_rate: rate_a,
        reference_rate: rate_b,
        ratio,
        passes_80_percent_rule: ratio >= min_ratio,
    }
}

/// Chi-square goodness-of-fit of category counts against a uniform split.
///
/// Returns `(statistic, p_value)` with k - 1 degrees of freedom.
pub fn chi_square_independence(observed_counts: &[u64]) -> Result<(f64, f64)> {
    let categories = observed_counts.len();
    if categories < 2 {
        return Err(MetricError::InsufficientSample {
            test: "chi_square",
            required: 2,
            actual: categories,
        });
    }

    let total: u64 = observed_counts.iter().sum();
    if total == 0 {
        return Err(MetricError::Degenerate {
            test: "chi_square",
            reason: "all category counts are zero".to_string(),
        });
    }

    let expected = total as f64 / categories as f64;
    let statistic: f64 = observed_counts
        .iter()
        .map(|&o| (o as f64 - expected).powi(2) / expected)
        .sum();
    let p_value = chi_square_sf(statistic, (categories - 1) as f64);

    Ok((statistic, p_value))
}

/// Tagged chi-square test at the given significance level.
pub fn chi_square_test(observed_counts: &[u64], significance_level: f64) -> ChiSquareResult {
    match chi_square_independence(observed_counts) {
        Ok((statistic, p_value)) => ChiSquareResult {
            status: MetricStatus::Computed,
            categories: observed_counts.len(),
            statistic: Some(statistic),
            p_value: Some(p_value),
            significant: p_value < significance_level,
        },
        Err(e) => {
            debug!(error = %e, "Chi-square test not computed");
            ChiSquareResult {
                status: MetricStatus::InsufficientData,
                categories: observed_counts.len(),
                statistic: None,
                p_value: None,
                significant: false,
            }
        }
    }
}
