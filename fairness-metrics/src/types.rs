//! Tagged result types shared by all metric functions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Whether a metric was actually computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    /// The metric was computed from enough data
    Computed,
    /// Not enough rows, groups or bins for the test
    InsufficientData,
    /// The test was not applicable (e.g. no reference group configured)
    Skipped,
}

impl MetricStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Computed => "computed",
            MetricStatus::InsufficientData => "insufficient_data",
            MetricStatus::Skipped => "skipped",
        }
    }

    /// Whether the metric carries real values.
    pub fn is_computed(&self) -> bool {
        matches!(self, MetricStatus::Computed)
    }
}

/// Result of a demographic-parity or equalized-odds test.
///
/// Both tests share one shape: a rate per observed group and the spread
/// between the highest and lowest rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ParityResult {
    /// Computation status
    pub status: MetricStatus,
    /// Rate per observed group
    pub rates: BTreeMap<String, f64>,
    /// max(rate) - min(rate) over observed groups
    pub max_difference: f64,
    /// Whether max_difference exceeded the fairness threshold
    pub biased: bool,
}

impl ParityResult {
    /// A result for input with fewer than two groups.
    pub fn insufficient(rates: BTreeMap<String, f64>) -> Self {
        Self {
            status: MetricStatus::InsufficientData,
            rates,
            max_difference: 0.0,
            biased: false,
        }
    }
}

/// One confidence bucket of a calibration analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CalibrationBin {
    /// Lower edge of the bucket (inclusive)
    pub lower: f64,
    /// Upper edge of the bucket (exclusive, except for the last bucket)
    pub upper: f64,
    /// Rows that fell into the bucket
    pub count: usize,
    /// Mean stated confidence of those rows
    pub mean_confidence: f64,
    /// Mean observed outcome of those rows
    pub mean_outcome: f64,
}

/// Result of a calibration analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CalibrationResult {
    /// Computation status
    pub status: MetricStatus,
    /// Rows with both confidence and outcome present
    pub sample_size: usize,
    /// Non-empty buckets, lowest confidence first
    pub bins: Vec<CalibrationBin>,
    /// Pearson correlation between bucket means
    pub correlation: Option<f64>,
    /// Two-sided p-value of the correlation
    pub p_value: Option<f64>,
    /// correlation above the minimum and statistically significant
    pub well_calibrated: bool,
}

impl CalibrationResult {
    /// A result for input too small to analyze.
    pub fn insufficient(sample_size: usize, bins: Vec<CalibrationBin>) -> Self {
        Self {
            status: MetricStatus::InsufficientData,
            sample_size,
            bins,
            correlation: None,
            p_value: None,
            well_calibrated: false,
        }
    }
}

/// Result of a disparate-impact (80% rule) comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DisparateImpactResult {
    /// Computation status
    pub status: MetricStatus,
    /// Outcome rate of the audited group
    pub group_rate: f64,
    /// Outcome rate of the reference group
    pub reference_rate: f64,
    /// group_rate / reference_rate (0 when the reference rate is 0)
    pub ratio: f64,
    /// ratio >= the minimum ratio (0.8 by default)
    pub passes_80_percent_rule: bool,
}

impl DisparateImpactResult {
    /// A comparison that could not be made.
    ///
    /// Skipped comparisons pass so they never produce findings.
    pub fn skipped(group_rate: f64, reference_rate: f64) -> Self {
        Self {
            status: MetricStatus::Skipped,
            group_rate,
            reference_rate,
            ratio: 0.0,
            passes_80_percent_rule: true,
        }
    }
}

/// Result of a chi-square goodness-of-fit test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ChiSquareResult {
    /// Computation status
    pub status: MetricStatus,
    /// Number of categories tested
    pub categories: usize,
    /// Chi-square statistic
    pub statistic: Option<f64>,
    /// Upper-tail p-value
    pub p_value: Option<f64>,
    /// p_value below the significance level
    pub significant: bool,
}

/// Error types for metric computations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    /// Not enough observations for the test
    #[error("Insufficient sample for {test}: need at least {required}, got {actual}")]
    InsufficientSample {
        test: &'static str,
        required: usize,
        actual: usize,
    },

    /// Input has no variance or a zero total
    #[error("Degenerate input for {test}: {reason}")]
    Degenerate { test: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, MetricError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&MetricStatus::InsufficientData).unwrap();
        assert_eq!(json, "\"insufficient_data\"");
        assert_eq!(MetricStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_skipped_impact_never_fails() {
        let result = DisparateImpactResult::skipped(0.2, 0.0);
        assert_eq!(result.status, MetricStatus::Skipped);
        assert!(result.passes_80_percent_rule);
    }
}
