//! Engagement and resource-mix patterns across demographic groups.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use fairness_metrics::stats::{cohens_d, mean, sample_std};
use fairness_metrics::MetricStatus;

use crate::config::FairnessConfig;
use crate::data::RecommendationRow;
use crate::types::{Demographic, DemographicAttribute, ResourceType};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Engagement summary for one group. Rows without an engagement score are
/// not counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EngagementStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub count: usize,
}

/// Effect size between the most and least engaged groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EngagementEffect {
    pub status: MetricStatus,
    pub highest_group: Option<String>,
    pub lowest_group: Option<String>,
    pub cohens_d: Option<f64>,
    /// |d| above the effect size threshold
    pub meaningful: bool,
}

/// Engagement and resource-mix patterns over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DemographicPatterns {
    /// Attribute the per-group patterns are keyed by
    pub attribute: DemographicAttribute,
    pub engagement_by_group: BTreeMap<String, EngagementStats>,
    pub engagement_by_income: BTreeMap<String, EngagementStats>,
    /// Per group, share of its recommendations going to each resource type
    pub resource_preferences: BTreeMap<String, BTreeMap<ResourceType, f64>>,
    pub engagement_effect: EngagementEffect,
}

pub(crate) fn compute(rows: &[RecommendationRow], fairness: &FairnessConfig) -> DemographicPatterns {
    let attribute = fairness.protected_attribute;
    let by_group = engagement_samples(rows, attribute);
    let by_income = engagement_samples(rows, DemographicAttribute::IncomeLevel);

    DemographicPatterns {
        attribute,
        engagement_by_group: summarize(&by_group),
        engagement_by_income: summarize(&by_income),
        resource_preferences: resource_preferences(rows, attribute),
        engagement_effect: engagement_effect(&by_group, fairness.effect_size_threshold),
    }
}

fn engagement_samples(
    rows: &[RecommendationRow],
    attribute: DemographicAttribute,
) -> BTreeMap<String, Vec<f64>> {
    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for row in rows {
        let slot = samples.entry(row.attribute(attribute).to_string()).or_default();
        if let Some(score) = row.engagement_score.filter(|s| s.is_finite()) {
            slot.push(score);
        }
    }
    samples
}

fn summarize(samples: &BTreeMap<String, Vec<f64>>) -> BTreeMap<String, EngagementStats> {
    samples
        .iter()
        .map(|(group, values)| {
            (
                group.clone(),
                EngagementStats {
                    mean: mean(values),
                    std: sample_std(values),
                    count: values.len(),
                },
            )
        })
        .collect()
}

fn resource_preferences(
    rows: &[RecommendationRow],
    attribute: DemographicAttribute,
) -> BTreeMap<String, BTreeMap<ResourceType, f64>> {
    let mut counts: BTreeMap<String, BTreeMap<ResourceType, usize>> = BTreeMap::new();
    for row in rows {
        *counts
            .entry(row.attribute(attribute).to_string())
            .or_default()
            .entry(row.resource_type)
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(group, by_type)| {
            let total: usize = by_type.values().sum();
            let shares = by_type
                .into_iter()
                .map(|(resource_type, n)| (resource_type, n as f64 / total as f64))
                .collect();
            (group, shares)
        })
        .collect()
}

fn engagement_effect(samples: &BTreeMap<String, Vec<f64>>, threshold: f64) -> EngagementEffect {
    let means: Vec<(&String, f64)> = samples
        .iter()
        .filter_map(|(group, values)| mean(values).map(|m| (group, m)))
        .collect();

    let highest = means.iter().max_by(|a, b| a.1.total_cmp(&b.1));
    let lowest = means.iter().min_by(|a, b| a.1.total_cmp(&b.1));

    let (Some(&(high, _)), Some(&(low, _))) = (highest, lowest) else {
        return EngagementEffect::insufficient(None, None);
    };
    if high == low {
        return EngagementEffect::insufficient(Some(high.clone()), None);
    }

    match cohens_d(&samples[high], &samples[low]) {
        Some(d) => EngagementEffect {
            status: MetricStatus::Computed,
            highest_group: Some(high.clone()),
            lowest_group: Some(low.clone()),
            cohens_d: Some(d),
            meaningful: d.abs() > threshold,
        },
        None => EngagementEffect::insufficient(Some(high.clone()), Some(low.clone())),
    }
}

impl EngagementEffect {
    fn insufficient(highest_group: Option<String>, lowest_group: Option<String>) -> Self {
        Self {
            status: MetricStatus::InsufficientData,
            highest_group,
            lowest_group,
            cohens_d: None,
            meaningful: false,
        }
    }
}
