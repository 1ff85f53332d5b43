//! Calibration: does stated confidence track observed outcomes?

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats::pearson;
use crate::types::{CalibrationBin, CalibrationResult, MetricStatus};

/// Parameters for [`calibration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Equal-width confidence buckets over [0, 1]
    pub n_bins: usize,
    /// Minimum joint rows (confidence and outcome present)
    pub min_rows: usize,
    /// Minimum non-empty buckets before correlating
    pub min_bins: usize,
    /// Correlation must exceed this to count as calibrated
    pub min_correlation: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            n_bins: 5,
            min_rows: 20,
            min_bins: 3,
            min_correlation: 0.5,
        }
    }
}

/// Bin confidence into equal-width buckets and correlate bucket means.
///
/// Rows whose outcome is `None` are left out of the joint dataset. The
/// correlation p-value must fall below `significance_level`.
pub fn calibration<R, C, O>(
    rows: &[R],
    confidence: C,
    outcome: O,
    params: &CalibrationParams,
    significance_level: f64,
) -> CalibrationResult
where
    C: Fn(&R) -> f64,
    O: Fn(&R) -> Option<f64>,
{
    let joint: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| outcome(r).map(|o| (confidence(r).clamp(0.0, 1.0), o)))
        .filter(|(c, o)| c.is_finite() && o.is_finite())
        .collect();

    if joint.len() < params.min_rows {
        debug!(
            sample_size = joint.len(),
            required = params.min_rows,
            "Calibration skipped: too few rows"
        );
        return CalibrationResult::insufficient(joint.len(), Vec::new());
    }

    let bins = bucketize(&joint, params.n_bins.max(1));

    if bins.len() < params.min_bins {
        return CalibrationResult::insufficient(joint.len(), bins);
    }

    let confidences: Vec<f64> = bins.iter().map(|b| b.mean_confidence).collect();
    let outcomes: Vec<f64> = bins.iter().map(|b| b.mean_outcome).collect();

    match pearson(&confidences, &outcomes) {
        Ok((correlation, p_value)) => CalibrationResult {
            status: MetricStatus::Computed,
            sample_size: joint.len(),
            bins,
            correlation: Some(correlation),
            p_value: Some(p_value),
            well_calibrated: correlation > params.min_correlation
                && p_value < significance_level,
        },
        Err(e) => {
            debug!(error = %e, "Calibration correlation undefined");
            CalibrationResult::insufficient(joint.len(), bins)
        }
    }
}

fn bucketize(joint: &[(f64, f64)], n_bins: usize) -> Vec<CalibrationBin> {
    let width = 1.0 / n_bins as f64;
    let mut sums = vec![(0usize, 0.0f64, 0.0f64); n_bins];

    for &(c, o) in joint {
        // 1.0 belongs to the top bucket
        let idx = ((c * n_bins as f64).floor() as usize).min(n_bins - 1);
        let slot = &mut sums[idx];
        slot.0 += 1;
        slot.1 += c;
        slot.2 += o;
    }

    sums.into_iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(i, (count, conf, out))| CalibrationBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
            mean_confidence: conf / count as f64,
            mean_outcome: out / count as f64,
        })
        .collect()
}
