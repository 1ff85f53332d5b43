//! Finding generation from computed metrics.

use std::collections::BTreeMap;

use fairness_metrics::MetricStatus;

use super::fairness::FairnessMetrics;
use super::geographic::AccessDisparities;
use super::recommendation::ResourceTypeBias;
use crate::config::BiasConfig;
use crate::types::{BiasFinding, DemographicAttribute, FindingType, ResourceType, Severity};

/// Findings for a recommendation analysis: parity violations,
/// underrepresentation, disparate impact, then poor calibration.
pub(crate) fn recommendation_findings(
    bias_tests: &BTreeMap<ResourceType, ResourceTypeBias>,
    metrics: &FairnessMetrics,
    config: &BiasConfig,
) -> Vec<BiasFinding> {
    let mut findings = Vec::new();

    for (resource_type, tests) in bias_tests {
        for (attribute, parity) in &tests.demographic_parity {
            if !parity.biased {
                continue;
            }
            let severity = if parity.max_difference > config.fairness.high_severity_difference {
                Severity::High
            } else {
                Severity::Medium
            };
            findings.push(BiasFinding {
                finding_type: FindingType::DemographicParityViolation,
                severity,
                resource_type: Some(*resource_type),
                demographic_attribute: Some(*attribute),
                demographic_group: None,
                magnitude: parity.max_difference,
                description: format!(
                    "Significant disparity in {} recommendations across {} groups",
                    resource_type.as_str(),
                    attribute.as_str()
                ),
                recommended_action: format!(
                    "Review {} recommendation algorithm for {} bias",
                    resource_type.as_str(),
                    attribute.as_str()
                ),
            });
        }
    }

    for (group, parity) in &metrics.representation_parity {
        if parity.underrepresented {
            findings.push(BiasFinding {
                finding_type: FindingType::Underrepresentation,
                severity: Severity::Medium,
                resource_type: None,
                demographic_attribute: Some(metrics.attribute),
                demographic_group: Some(group.clone()),
                magnitude: parity.parity_ratio,
                description: format!("{group} group is underrepresented in recommendations"),
                recommended_action: format!(
                    "Increase outreach and algorithm tuning for {group} demographic"
                ),
            });
        }
    }

    let impact = &metrics.disparate_impact;
    if impact.status == MetricStatus::Computed {
        let resource = impact.resource_type.as_str();
        for (group, result) in &impact.groups {
            if result.status.is_computed() && !result.passes_80_percent_rule {
                findings.push(BiasFinding {
                    finding_type: FindingType::DisparateImpact,
                    severity: Severity::High,
                    resource_type: Some(impact.resource_type),
                    demographic_attribute: Some(impact.attribute),
                    demographic_group: Some(group.clone()),
                    magnitude: result.ratio,
                    description: format!("{resource} recommendations for {group} fail the 80% rule"),
                    recommended_action: format!(
                        "Immediate algorithm audit required for {resource} recommendations to {group} demographic"
                    ),
                });
            }
        }
    }

    for (resource_type, tests) in bias_tests {
        let calibration = &tests.calibration;
        if calibration.status.is_computed() && !calibration.well_calibrated {
            findings.push(BiasFinding {
                finding_type: FindingType::PoorCalibration,
                severity: Severity::Medium,
                resource_type: Some(*resource_type),
                demographic_attribute: None,
                demographic_group: None,
                magnitude: calibration.correlation.unwrap_or(0.0),
                description: format!(
                    "Confidence scores for {} recommendations do not track engagement",
                    resource_type.as_str()
                ),
                recommended_action: format!(
                    "Recalibrate {} confidence scoring against observed engagement",
                    resource_type.as_str()
                ),
            });
        }
    }

    findings
}

/// Findings for a geographic analysis.
pub(crate) fn geographic_findings(disparities: &AccessDisparities) -> Vec<BiasFinding> {
    let gap = &disparities.access_gap;
    if !gap.significant_disparity {
        return Vec::new();
    }

    let lowest = gap.lowest_group.as_deref().unwrap_or("unknown");
    vec![BiasFinding {
        finding_type: FindingType::AccessDisparity,
        severity: Severity::Medium,
        resource_type: None,
        demographic_attribute: Some(DemographicAttribute::RaceEthnicity),
        demographic_group: gap.lowest_group.clone(),
        magnitude: gap.gap,
        description: format!(
            "Mental-health provider access varies by {:.0} points across groups; lowest for {lowest}",
            gap.gap * 100.0
        ),
        recommended_action: format!(
            "Prioritize provider outreach and telehealth options in regions serving {lowest}"
        ),
    }]
}
