//! Window-wide fairness metrics: representation parity and disparate impact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use fairness_metrics::{disparate_impact_ratio, group_counts, DisparateImpactResult, MetricStatus};

use crate::config::BiasConfig;
use crate::data::RecommendationRow;
use crate::types::{Demographic, DemographicAttribute, ResourceType};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A group's share of recommendations against its share of the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RepresentationParity {
    pub population_rate: f64,
    pub recommendation_rate: f64,
    /// recommendation_rate / population_rate, 0 when the population rate is 0
    pub parity_ratio: f64,
    pub underrepresented: bool,
}

/// Disparate-impact comparison of every group against the reference group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DisparateImpactSummary {
    /// Skipped when no usable reference group exists
    pub status: MetricStatus,
    pub attribute: DemographicAttribute,
    pub resource_type: ResourceType,
    pub reference_group: Option<String>,
    /// Per non-reference group
    pub groups: BTreeMap<String, DisparateImpactResult>,
}

/// Fairness metrics over the whole analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct FairnessMetrics {
    /// Attribute representation parity is computed over
    pub attribute: DemographicAttribute,
    pub representation_parity: BTreeMap<String, RepresentationParity>,
    pub disparate_impact: DisparateImpactSummary,
}

pub(crate) fn compute(
    rows: &[RecommendationRow],
    population: &BTreeMap<String, u64>,
    config: &BiasConfig,
) -> FairnessMetrics {
    let attribute = config.fairness.protected_attribute;
    FairnessMetrics {
        attribute,
        representation_parity: representation_parity(
            rows,
            attribute,
            population,
            config.fairness.representation_min_ratio,
        ),
        disparate_impact: disparate_impact(rows, config),
    }
}

fn representation_parity(
    rows: &[RecommendationRow],
    attribute: DemographicAttribute,
    population: &BTreeMap<String, u64>,
    min_ratio: f64,
) -> BTreeMap<String, RepresentationParity> {
    let population_total: u64 = population.values().sum();
    if population_total == 0 || rows.is_empty() {
        return BTreeMap::new();
    }

    let recommended = group_counts(rows, |r: &RecommendationRow| r.attribute(attribute));
    let total = rows.len() as f64;

    population
        .iter()
        .map(|(group, &count)| {
            let population_rate = count as f64 / population_total as f64;
            let recommendation_rate =
                recommended.get(group).copied().unwrap_or(0) as f64 / total;
            let (parity_ratio, underrepresented) = if population_rate > 0.0 {
                let ratio = recommendation_rate / population_rate;
                (ratio, ratio < min_ratio)
            } else {
                (0.0, false)
            };
            (
                group.clone(),
                RepresentationParity {
                    population_rate,
                    recommendation_rate,
                    parity_ratio,
                    underrepresented,
                },
            )
        })
        .collect()
}

fn disparate_impact(rows: &[RecommendationRow], config: &BiasConfig) -> DisparateImpactSummary {
    let settings = &config.disparate_impact;
    let attribute = settings.attribute;

    // group -> (target resource count, all count)
    let mut tallies: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for row in rows {
        let slot = tallies.entry(row.attribute(attribute)).or_default();
        slot.1 += 1;
        if row.resource_type == settings.resource_type {
            slot.0 += 1;
        }
    }
    let rates: BTreeMap<&str, f64> = tallies
        .into_iter()
        .map(|(group, (hits, total))| (group, hits as f64 / total as f64))
        .collect();

    let reference = settings.reference_group.as_deref();
    let reference_rate = reference.and_then(|r| rates.get(r).copied());

    let usable = match (reference, reference_rate) {
        (None, _) => {
            debug!("Disparate impact skipped: no reference group configured");
            None
        }
        (Some(group), None) => {
            warn!(reference_group = group, "Disparate impact skipped: reference group absent");
            None
        }
        (Some(group), Some(rate)) if rate <= 0.0 => {
            warn!(
                reference_group = group,
                resource_type = settings.resource_type.as_str(),
                "Disparate impact skipped: reference group rate is zero"
            );
            None
        }
        (Some(_), Some(rate)) => Some(rate),
    };

    let groups = rates
        .iter()
        .filter(|(group, _)| Some(**group) != reference)
        .map(|(group, &rate)| {
            let result = match usable {
                Some(reference_rate) => {
                    disparate_impact_ratio(rate, reference_rate, settings.min_ratio)
                }
                None => DisparateImpactResult::skipped(rate, reference_rate.unwrap_or(0.0)),
            };
            (group.to_string(), result)
        })
        .collect();

    DisparateImpactSummary {
        status: if usable.is_some() {
            MetricStatus::Computed
        } else {
            MetricStatus::Skipped
        },
        attribute,
        resource_type: settings.resource_type,
        reference_group: settings.reference_group.clone(),
        groups,
    }
}
