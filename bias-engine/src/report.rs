//! Bias report composition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::analysis::{GeographicBiasAnalysis, RecommendationBiasAnalysis};
use crate::types::{AnalysisStatus, AnalysisWindow, BiasFinding, Result, Severity};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Priority of a report action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    Immediate,
    Medium,
    Ongoing,
}

/// A follow-up the report asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ActionItem {
    pub priority: ActionPriority,
    pub action: String,
    pub description: String,
}

/// Tally of findings across both analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct OverallAssessment {
    pub total_issues: usize,
    pub high_severity_count: usize,
    pub risk_level: Severity,
    pub requires_immediate_action: bool,
}

/// What the report covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AnalysisSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_recommendations: usize,
    pub total_locations: usize,
    pub recommendation_status: AnalysisStatus,
    pub geographic_status: AnalysisStatus,
}

/// A complete bias report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BiasReport {
    /// Name-based id derived from the fingerprint
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub analysis_period_days: u32,
    pub analysis_summary: AnalysisSummary,
    pub recommendation_bias: RecommendationBiasAnalysis,
    pub geographic_bias: GeographicBiasAnalysis,
    pub overall_assessment: OverallAssessment,
    /// Ordered by priority
    pub action_items: Vec<ActionItem>,
    /// SHA-256 over the serialized summary and analyses
    pub fingerprint: String,
}

impl BiasReport {
    /// All findings, recommendation analysis first.
    pub fn findings(&self) -> impl Iterator<Item = &BiasFinding> {
        self.recommendation_bias
            .findings()
            .iter()
            .chain(self.geographic_bias.findings())
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report to a file as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!(report_id = %self.report_id, path = %path.display(), "Bias report saved");
        Ok(())
    }
}

/// Composes analyses into a report.
pub struct ReportGenerator;

impl ReportGenerator {
    /// Build a report from analyses that ran over the same window.
    ///
    /// Identical inputs give an identical report apart from `generated_at`.
    pub fn compose(
        window: &AnalysisWindow,
        recommendation_bias: RecommendationBiasAnalysis,
        geographic_bias: GeographicBiasAnalysis,
    ) -> Result<BiasReport> {
        let analysis_summary = AnalysisSummary {
            window_start: window.cutoff(),
            window_end: window.as_of(),
            total_recommendations: recommendation_bias.total_recommendations,
            total_locations: geographic_bias.total_locations,
            recommendation_status: recommendation_bias.status,
            geographic_status: geographic_bias.status,
        };

        let fingerprint =
            Self::fingerprint(&analysis_summary, &recommendation_bias, &geographic_bias)?;

        let findings: Vec<&BiasFinding> = recommendation_bias
            .findings()
            .iter()
            .chain(geographic_bias.findings())
            .collect();
        let overall_assessment = Self::assess(&findings);
        let action_items = Self::action_items(&overall_assessment);

        Ok(BiasReport {
            report_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()),
            generated_at: Utc::now(),
            analysis_period_days: window.days_back(),
            analysis_summary,
            recommendation_bias,
            geographic_bias,
            overall_assessment,
            action_items,
            fingerprint,
        })
    }

    /// Tally findings and derive the risk level.
    pub fn assess(findings: &[&BiasFinding]) -> OverallAssessment {
        let total_issues = findings.len();
        let high_severity_count = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .count();

        let risk_level = if high_severity_count > 0 {
            Severity::High
        } else if total_issues > 2 {
            Severity::Medium
        } else {
            Severity::Low
        };

        OverallAssessment {
            total_issues,
            high_severity_count,
            risk_level,
            requires_immediate_action: high_severity_count > 0,
        }
    }

    /// Action items in priority order. The ongoing item is always present.
    pub fn action_items(assessment: &OverallAssessment) -> Vec<ActionItem> {
        let mut items = Vec::new();

        if assessment.high_severity_count > 0 {
            items.push(ActionItem {
                priority: ActionPriority::Immediate,
                action: "Audit and fix high-severity algorithmic bias issues".to_string(),
                description: "Critical bias issues detected that require immediate algorithm review"
                    .to_string(),
            });
        }

        if assessment.total_issues > 0 {
            items.push(ActionItem {
                priority: ActionPriority::Medium,
                action: "Implement bias monitoring dashboard".to_string(),
                description: "Set up continuous monitoring for bias detection metrics".to_string(),
            });
        }

        items.push(ActionItem {
            priority: ActionPriority::Ongoing,
            action: "Schedule periodic re-analysis".to_string(),
            description: "Re-run bias detection analyses on a regular cadence".to_string(),
        });

        items
    }

    fn fingerprint(
        summary: &AnalysisSummary,
        recommendation_bias: &RecommendationBiasAnalysis,
        geographic_bias: &GeographicBiasAnalysis,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(summary)?);
        hasher.update(serde_json::to_vec(recommendation_bias)?);
        hasher.update(serde_json::to_vec(geographic_bias)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindingType;

    fn finding(severity: Severity) -> BiasFinding {
        BiasFinding {
            finding_type: FindingType::Underrepresentation,
            severity,
            resource_type: None,
            demographic_attribute: None,
            demographic_group: Some("group_a".to_string()),
            magnitude: 0.5,
            description: "test".to_string(),
            recommended_action: "test".to_string(),
        }
    }

    #[test]
    fn test_assessment_levels() {
        let low = finding(Severity::Medium);
        let high = finding(Severity::High);

        let assessment = ReportGenerator::assess(&[]);
        assert_eq!(assessment.risk_level, Severity::Low);
        assert!(!assessment.requires_immediate_action);

        let assessment = ReportGenerator::assess(&[&low, &low]);
        assert_eq!(assessment.risk_level, Severity::Low);

        let assessment = ReportGenerator::assess(&[&low, &low, &low]);
        assert_eq!(assessment.risk_level, Severity::Medium);
        assert_eq!(assessment.total_issues, 3);

        let assessment = ReportGenerator::assess(&[&high]);
        assert_eq!(assessment.risk_level, Severity::High);
        assert!(assessment.requires_immediate_action);
    }

    #[test]
    fn test_action_item_order() {
        let high = finding(Severity::High);
        let items = ReportGenerator::action_items(&ReportGenerator::assess(&[&high]));
        let priorities: Vec<ActionPriority> = items.iter().map(|i| i.priority).collect();
        assert_eq!(
            priorities,
            vec![
                ActionPriority::Immediate,
                ActionPriority::Medium,
                ActionPriority::Ongoing
            ]
        );

        let items = ReportGenerator::action_items(&ReportGenerator::assess(&[]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].priority, ActionPriority::Ongoing);
    }

    #[test]
    fn test_compose_tallies_both_analyses() {
        let window = AnalysisWindow::new(30).unwrap();
        let mut recommendation = RecommendationBiasAnalysis::no_data(30);
        recommendation.recommendations.push(finding(Severity::Medium));
        let mut geographic = GeographicBiasAnalysis::no_data(30);
        geographic.recommendations.push(finding(Severity::High));

        let report = ReportGenerator::compose(&window, recommendation, geographic).unwrap();
        assert_eq!(report.overall_assessment.total_issues, 2);
        assert_eq!(report.overall_assessment.high_severity_count, 1);
        assert_eq!(report.findings().count(), 2);
        assert_eq!(report.analysis_period_days, 30);
        assert_eq!(report.fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let window = AnalysisWindow::new(30).unwrap();
        let a = ReportGenerator::compose(
            &window,
            RecommendationBiasAnalysis::no_data(30),
            GeographicBiasAnalysis::no_data(30),
        )
        .unwrap();
        let b = ReportGenerator::compose(
            &window,
            RecommendationBiasAnalysis::no_data(30),
            GeographicBiasAnalysis::no_data(30),
        )
        .unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.report_id, b.report_id);
        assert_eq!(a, BiasReport { generated_at: a.generated_at, ..b });

        let c = ReportGenerator::compose(
            &window,
            RecommendationBiasAnalysis::no_data(60),
            GeographicBiasAnalysis::no_data(30),
        )
        .unwrap();
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_ne!(a.report_id, c.report_id);

        let later =
            AnalysisWindow::ending_at(30, window.as_of() + chrono::Duration::days(1)).unwrap();
        let d = ReportGenerator::compose(
            &later,
            RecommendationBiasAnalysis::no_data(30),
            GeographicBiasAnalysis::no_data(30),
        )
        .unwrap();
        assert_ne!(a.fingerprint, d.fingerprint);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let window = AnalysisWindow::new(7).unwrap();
        let report = ReportGenerator::compose(
            &window,
            RecommendationBiasAnalysis::no_data(7),
            GeographicBiasAnalysis::no_data(7),
        )
        .unwrap();

        report.write_json(&path).unwrap();
        let saved: BiasReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.report_id, report.report_id);
        assert_eq!(saved.fingerprint, report.fingerprint);
        assert_eq!(saved.overall_assessment.risk_level, Severity::Low);
    }
}
