//! Group-rate metrics: demographic parity and equalized odds.
//!
//! Every rate here uses one denominator convention: records attributable to
//! the group divided by the total records of the population passed in.
//! Callers that want a different population filter the slice first.

use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{MetricStatus, ParityResult};

/// Count rows per group.
pub fn group_counts<R, G>(rows: &[R], group: G) -> BTreeMap<String, usize>
where
    G: Fn(&R) -> &str,
{
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(group(row).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Share of rows per group.
///
/// Rates sum to 1 across the observed groups; empty input yields no groups.
pub fn group_rates<R, G>(rows: &[R], group: G) -> BTreeMap<String, f64>
where
    G: Fn(&R) -> &str,
{
    let total = rows.len();
    if total == 0 {
        return BTreeMap::new();
    }
    group_counts(rows, group)
        .into_iter()
        .map(|(key, count)| (key, count as f64 / total as f64))
        .collect()
}

/// Demographic parity: equal selection rates across groups.
///
/// Fewer than two observed groups is reported as insufficient data with a
/// zero spread, never as bias.
pub fn demographic_parity<R, G>(rows: &[R], group: G, threshold: f64) -> ParityResult
where
    G: Fn(&R) -> &str,
{
    spread(group_rates(rows, group), threshold)
}

/// Equalized odds: equal success rates across groups.
///
/// A group's rate is its successful rows over all of its rows. Groups only
/// exist when they have at least one row, so no zero denominators occur.
pub fn equalized_odds<R, G, S>(rows: &[R], group: G, is_success: S, threshold: f64) -> ParityResult
where
    G: Fn(&R) -> &str,
    S: Fn(&R) -> bool,
{
    let mut tallies: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let entry = tallies.entry(group(row).to_string()).or_insert((0, 0));
        entry.1 += 1;
        if is_success(row) {
            entry.0 += 1;
        }
    }

    let rates = tallies
        .into_iter()
        .map(|(key, (successes, total))| (key, successes as f64 / total as f64))
        .collect();

    spread(rates, threshold)
}

fn spread(rates: BTreeMap<String, f64>, threshold: f64) -> ParityResult {
    if rates.len() < 2 {
        return ParityResult::insufficient(rates);
    }

    let (min, max) = rates
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(r), hi.max(r))
        });
    let max_difference = max - min;

    debug!(groups = rates.len(), max_difference, threshold, "Group spread computed");

    ParityResult {
        status: MetricStatus::Computed,
        rates,
        max_difference,
        biased: max_difference > threshold,
    }
}
