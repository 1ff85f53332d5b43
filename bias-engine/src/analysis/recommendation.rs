//! Recommendation bias analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fairness_metrics::{
    calibration, chi_square_test, demographic_parity, equalized_odds, group_counts,
    CalibrationResult, ChiSquareResult, ParityResult,
};

use super::fairness::{self, FairnessMetrics};
use super::findings;
use super::patterns::{self, DemographicPatterns};
use crate::config::BiasConfig;
use crate::data::{DataSource, DataSourceError, RecommendationRow};
use crate::types::{
    AnalysisStatus, AnalysisWindow, BiasFinding, Demographic, DemographicAttribute, ResourceType,
    Result,
};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Bias tests for the recommendations of one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ResourceTypeBias {
    pub resource_type: ResourceType,
    /// Recommendations of this type in the window
    pub total_count: usize,
    /// Parity per tested attribute
    pub demographic_parity: BTreeMap<DemographicAttribute, ParityResult>,
    /// Success-rate parity over the protected attribute
    pub equalized_odds: ParityResult,
    /// Confidence against engagement
    pub calibration: CalibrationResult,
    /// Uniformity of the protected attribute's counts
    pub chi_square: ChiSquareResult,
}

/// Result of a recommendation bias analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RecommendationBiasAnalysis {
    pub status: AnalysisStatus,
    pub analysis_period_days: u32,
    pub total_recommendations: usize,
    pub bias_tests: BTreeMap<ResourceType, ResourceTypeBias>,
    pub fairness_metrics: Option<FairnessMetrics>,
    pub demographic_patterns: Option<DemographicPatterns>,
    /// Findings, in detection order
    pub recommendations: Vec<BiasFinding>,
}

impl RecommendationBiasAnalysis {
    /// Result for a window with no recommendations.
    pub fn no_data(analysis_period_days: u32) -> Self {
        Self {
            status: AnalysisStatus::NoData,
            analysis_period_days,
            total_recommendations: 0,
            bias_tests: BTreeMap::new(),
            fairness_metrics: None,
            demographic_patterns: None,
            recommendations: Vec::new(),
        }
    }

    /// Findings raised by this analysis.
    pub fn findings(&self) -> &[BiasFinding] {
        &self.recommendations
    }
}

/// Analyzer for recommendation bias.
pub struct RecommendationAnalyzer {
    source: Arc<dyn DataSource>,
    config: Arc<BiasConfig>,
}

impl RecommendationAnalyzer {
    /// Create an analyzer over a data source.
    pub fn new(source: Arc<dyn DataSource>, config: Arc<BiasConfig>) -> Self {
        Self { source, config }
    }

    /// Load the window's recommendations and analyze them.
    ///
    /// An empty window is a no-data result. Store failures propagate.
    pub async fn analyze(&self, window: &AnalysisWindow) -> Result<RecommendationBiasAnalysis> {
        info!(
            source = %self.source.id(),
            days_back = window.days_back(),
            "Analyzing recommendation bias"
        );

        let rows = match self.source.load_recommendation_dataset(window).await {
            Ok(rows) => rows,
            Err(DataSourceError::DataUnavailable { dataset, cutoff }) => {
                warn!(dataset, %cutoff, "No recommendations in window");
                return Ok(RecommendationBiasAnalysis::no_data(window.days_back()));
            }
            Err(e) => return Err(e.into()),
        };

        let population = self
            .source
            .population_distribution(self.config.fairness.protected_attribute)
            .await?;

        let analysis = self.evaluate(window.days_back(), &rows, &population);

        info!(
            total_recommendations = analysis.total_recommendations,
            findings = analysis.recommendations.len(),
            "Recommendation bias analysis complete"
        );

        Ok(analysis)
    }

    /// Analyze already-loaded rows against a population distribution of the
    /// protected attribute.
    pub fn evaluate(
        &self,
        analysis_period_days: u32,
        rows: &[RecommendationRow],
        population: &BTreeMap<String, u64>,
    ) -> RecommendationBiasAnalysis {
        if rows.is_empty() {
            return RecommendationBiasAnalysis::no_data(analysis_period_days);
        }

        let mut partitions: BTreeMap<ResourceType, Vec<RecommendationRow>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry(row.resource_type)
                .or_default()
                .push(row.clone());
        }

        let bias_tests: BTreeMap<ResourceType, ResourceTypeBias> = partitions
            .into_iter()
            .map(|(resource_type, partition)| {
                (resource_type, self.test_resource_type(resource_type, &partition))
            })
            .collect();

        let fairness_metrics = fairness::compute(rows, population, &self.config);
        let demographic_patterns = patterns::compute(rows, &self.config.fairness);
        let recommendations =
            findings::recommendation_findings(&bias_tests, &fairness_metrics, &self.config);

        RecommendationBiasAnalysis {
            status: AnalysisStatus::Completed,
            analysis_period_days,
            total_recommendations: rows.len(),
            bias_tests,
            fairness_metrics: Some(fairness_metrics),
            demographic_patterns: Some(demographic_patterns),
            recommendations,
        }
    }

    fn test_resource_type(
        &self,
        resource_type: ResourceType,
        rows: &[RecommendationRow],
    ) -> ResourceTypeBias {
        let fairness = &self.config.fairness;
        let protected = fairness.protected_attribute;

        let demographic_parity = fairness
            .parity_attributes
            .iter()
            .map(|&attribute| {
                let result = demographic_parity(
                    rows,
                    |r: &RecommendationRow| r.attribute(attribute),
                    fairness.fairness_threshold,
                );
                (attribute, result)
            })
            .collect();

        let equalized_odds = equalized_odds(
            rows,
            |r: &RecommendationRow| r.attribute(protected),
            |r: &RecommendationRow| fairness.is_success(r.status),
            fairness.fairness_threshold,
        );

        let calibration = calibration(
            rows,
            |r: &RecommendationRow| r.confidence_score,
            |r: &RecommendationRow| r.engagement_score,
            &self.config.calibration,
            fairness.significance_level,
        );

        let counts: Vec<u64> = group_counts(rows, |r: &RecommendationRow| r.attribute(protected))
            .into_values()
            .map(|c| c as u64)
            .collect();
        let chi_square = chi_square_test(&counts, fairness.significance_level);

        debug!(
            resource_type = resource_type.as_str(),
            total = rows.len(),
            calibration = calibration.status.as_str(),
            chi_square = chi_square.status.as_str(),
            "Resource type tested"
        );

        ResourceTypeBias {
            resource_type,
            total_count: rows.len(),
            demographic_parity,
            equalized_odds,
            calibration,
            chi_square,
        }
    }
}
