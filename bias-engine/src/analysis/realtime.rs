//! Real-time bias scoring of a single recommendation.
//!
//! Runs at serving time, so every baseline query shares one timeout budget.
//! A check that cannot be computed is skipped; it never divides by zero.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::BiasConfig;
use crate::data::{DataSource, RecommendationFilter, UserDemographics};
use crate::types::{ResourceType, Result, Severity};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Skip reason when the user does not exist.
pub const USER_NOT_FOUND_REASON: &str = "user_not_found";
/// Skip reason when the baseline queries run out of time.
pub const TIMEOUT_REASON: &str = "insufficient data: baseline queries timed out";

/// The recommendation about to be served.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RecommendationCandidate {
    pub resource_type: ResourceType,
    pub confidence_score: f64,
}

/// Kind of real-time bias indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    TherapyUnderrepresentation,
    PoorCalibration,
}

/// One raised indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BiasIndicator {
    /// 0.0 - 1.0
    pub severity: f64,
    /// Baseline rate (overall therapy share, or predicted success)
    pub expected: f64,
    /// Observed rate (cohort therapy share, or actual success)
    pub observed: f64,
    /// Recommendations behind the observed rate
    pub sample_size: u64,
    pub description: String,
}

/// Whether scoring ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ScoringStatus {
    Scored,
    Skipped,
}

/// Demographics the cohort was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CohortDemographics {
    pub race_ethnicity: String,
    pub age_group: String,
    pub income_level: String,
}

impl From<&UserDemographics> for CohortDemographics {
    fn from(user: &UserDemographics) -> Self {
        Self {
            race_ethnicity: user.race_ethnicity.clone(),
            age_group: user.age_group.clone(),
            income_level: user.income_level.clone(),
        }
    }
}

/// Result of scoring one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RealtimeBiasResult {
    pub status: ScoringStatus,
    pub skip_reason: Option<String>,
    pub user_demographics: Option<CohortDemographics>,
    pub bias_indicators: BTreeMap<IndicatorKind, BiasIndicator>,
    pub bias_detected: bool,
    pub max_severity: f64,
    /// Risk level stamped on the served recommendation
    pub bias_risk_level: Severity,
}

impl RealtimeBiasResult {
    /// A result for a check that did not run.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: ScoringStatus::Skipped,
            skip_reason: Some(reason.into()),
            user_demographics: None,
            bias_indicators: BTreeMap::new(),
            bias_detected: false,
            max_severity: 0.0,
            bias_risk_level: Severity::Low,
        }
    }

    fn scored(
        user: &UserDemographics,
        bias_indicators: BTreeMap<IndicatorKind, BiasIndicator>,
    ) -> Self {
        let max_severity = bias_indicators
            .values()
            .map(|i| i.severity)
            .fold(0.0, f64::max);
        let bias_risk_level = if max_severity > 0.3 {
            Severity::High
        } else if !bias_indicators.is_empty() {
            Severity::Medium
        } else {
            Severity::Low
        };

        Self {
            status: ScoringStatus::Scored,
            skip_reason: None,
            user_demographics: Some(CohortDemographics::from(user)),
            bias_detected: !bias_indicators.is_empty(),
            bias_indicators,
            max_severity,
            bias_risk_level,
        }
    }
}

/// Scores single recommendations against historical baselines.
pub struct RealtimeScorer {
    source: Arc<dyn DataSource>,
    config: Arc<BiasConfig>,
}

impl RealtimeScorer {
    /// Create a scorer over a data source.
    pub fn new(source: Arc<dyn DataSource>, config: Arc<BiasConfig>) -> Self {
        Self { source, config }
    }

    /// Score a candidate for a user within a time budget.
    ///
    /// Expiry yields a skipped result; store failures propagate.
    pub async fn score(
        &self,
        user_ref: &str,
        candidate: &RecommendationCandidate,
        timeout: Duration,
    ) -> Result<RealtimeBiasResult> {
        match tokio::time::timeout(timeout, self.score_unbounded(user_ref, candidate)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    user_ref,
                    timeout_ms = timeout.as_millis() as u64,
                    "Real-time bias check timed out"
                );
                Ok(RealtimeBiasResult::skipped(TIMEOUT_REASON))
            }
        }
    }

    async fn score_unbounded(
        &self,
        user_ref: &str,
        candidate: &RecommendationCandidate,
    ) -> Result<RealtimeBiasResult> {
        let Some(user) = self.source.find_user(user_ref).await? else {
            debug!(user_ref, "Real-time bias check skipped: user not found");
            return Ok(RealtimeBiasResult::skipped(USER_NOT_FOUND_REASON));
        };

        let mut indicators = BTreeMap::new();

        if candidate.resource_type == ResourceType::Therapy {
            if let Some(indicator) = self.therapy_check(&user).await? {
                indicators.insert(IndicatorKind::TherapyUnderrepresentation, indicator);
            }
        }

        if candidate.confidence_score > 0.0 {
            if let Some(indicator) = self.calibration_check(candidate.confidence_score).await? {
                indicators.insert(IndicatorKind::PoorCalibration, indicator);
            }
        }

        let result = RealtimeBiasResult::scored(&user, indicators);
        debug!(
            user_ref,
            bias_detected = result.bias_detected,
            max_severity = result.max_severity,
            "Real-time bias check complete"
        );
        Ok(result)
    }

    fn since(&self) -> Option<chrono::DateTime<Utc>> {
        self.config
            .realtime
            .baseline_days
            .map(|days| Utc::now() - ChronoDuration::days(i64::from(days)))
    }

    /// Cohort vs overall therapy share, both per recommendation.
    async fn therapy_check(&self, user: &UserDemographics) -> Result<Option<BiasIndicator>> {
        let since = self.since();
        let cohort = RecommendationFilter::all()
            .cohort(user.race_ethnicity.as_str(), user.income_level.as_str())
            .since(since);
        let overall = RecommendationFilter::all().since(since);

        let cohort_total = self.source.count_recommendations(&cohort).await?;
        if cohort_total == 0 {
            debug!("Therapy check skipped: cohort has no recommendations");
            return Ok(None);
        }
        let overall_total = self.source.count_recommendations(&overall).await?;
        if overall_total == 0 {
            return Ok(None);
        }

        let cohort_therapy = self
            .source
            .count_recommendations(&cohort.resource_type(ResourceType::Therapy))
            .await?;
        let overall_therapy = self
            .source
            .count_recommendations(&overall.resource_type(ResourceType::Therapy))
            .await?;

        let cohort_rate = cohort_therapy as f64 / cohort_total as f64;
        let overall_rate = overall_therapy as f64 / overall_total as f64;
        if overall_rate <= 0.0 {
            debug!("Therapy check skipped: no therapy baseline");
            return Ok(None);
        }

        let ratio = cohort_rate / overall_rate;
        if ratio >= self.config.realtime.underrepresentation_ratio {
            return Ok(None);
        }

        Ok(Some(BiasIndicator {
            severity: 1.0 - ratio,
            expected: overall_rate,
            observed: cohort_rate,
            sample_size: cohort_total,
            description: format!(
                "Therapy recommendations underrepresented for {} with {} income",
                user.race_ethnicity, user.income_level
            ),
        }))
    }

    /// Predicted confidence vs historical success rate near that confidence.
    async fn calibration_check(&self, confidence: f64) -> Result<Option<BiasIndicator>> {
        let settings = &self.config.realtime;
        let band = RecommendationFilter::all()
            .confidence_between(
                confidence - settings.confidence_band,
                confidence + settings.confidence_band,
            )
            .since(self.since());

        let total = self.source.count_recommendations(&band).await?;
        if total <= settings.min_sample {
            debug!(total, "Calibration check skipped: sample too small");
            return Ok(None);
        }

        let successes = self
            .source
            .count_recommendations(
                &band.statuses(self.config.fairness.success_statuses.iter().copied()),
            )
            .await?;

        let success_rate = successes as f64 / total as f64;
        let error = (confidence - success_rate).abs();
        if error <= settings.calibration_error_threshold {
            return Ok(None);
        }

        Ok(Some(BiasIndicator {
            severity: error,
            expected: confidence,
            observed: success_rate,
            sample_size: total,
            description: "Recommendation confidence score poorly calibrated".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetSnapshot, InMemoryDataSource, RecommendationRecord};
    use crate::types::RecommendationStatus;

    fn user(id: &str, race: &str, income: &str) -> UserDemographics {
        UserDemographics {
            pseudonym_id: id.to_string(),
            age_group: "35-44".to_string(),
            gender_identity: "man".to_string(),
            race_ethnicity: race.to_string(),
            income_level: income.to_string(),
            zip_code_prefix: "606".to_string(),
            coordinates: None,
            has_mental_health_provider: true,
        }
    }

    fn recs(
        user_ref: &str,
        resource_type: ResourceType,
        n: usize,
        confidence: f64,
        status: RecommendationStatus,
    ) -> Vec<RecommendationRecord> {
        (0..n)
            .map(|i| RecommendationRecord {
                recommendation_id: format!("{user_ref}-{}-{i}", resource_type.as_str()),
                user_ref: user_ref.to_string(),
                resource_type,
                confidence_score: confidence,
                engagement_score: None,
                status,
                recommended_at: Utc::now(),
            })
            .collect()
    }

    fn scorer(snapshot: DatasetSnapshot) -> RealtimeScorer {
        RealtimeScorer::new(
            Arc::new(InMemoryDataSource::new(snapshot)),
            Arc::new(BiasConfig::default()),
        )
    }

    fn therapy(confidence: f64) -> RecommendationCandidate {
        RecommendationCandidate {
            resource_type: ResourceType::Therapy,
            confidence_score: confidence,
        }
    }

    const BUDGET: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_unknown_user_is_skipped() {
        let result = scorer(DatasetSnapshot::default())
            .score("ghost", &therapy(0.5), BUDGET)
            .await
            .unwrap();
        assert_eq!(result.status, ScoringStatus::Skipped);
        assert_eq!(result.skip_reason.as_deref(), Some(USER_NOT_FOUND_REASON));
        assert!(result.bias_indicators.is_empty());
    }

    #[tokio::test]
    async fn test_empty_cohort_skips_therapy_check() {
        // The user's cohort has no recommendations at all
        let mut snapshot = DatasetSnapshot {
            users: vec![user("u1", "group_a", "low"), user("u2", "group_b", "high")],
            ..Default::default()
        };
        snapshot.recommendations = recs("u2", ResourceType::Therapy, 5, 0.5, RecommendationStatus::Viewed);

        let result = scorer(snapshot).score("u1", &therapy(0.0), BUDGET).await.unwrap();
        assert_eq!(result.status, ScoringStatus::Scored);
        assert!(!result.bias_detected);
        assert_eq!(result.max_severity, 0.0);
        assert_eq!(result.bias_risk_level, Severity::Low);
    }

    #[tokio::test]
    async fn test_therapy_underrepresentation() {
        // cohort therapy share 0.2, overall 0.5 -> ratio 0.4
        let mut snapshot = DatasetSnapshot {
            users: vec![user("u1", "group_a", "low"), user("u2", "group_b", "high")],
            ..Default::default()
        };
        snapshot.recommendations.extend(recs("u1", ResourceType::Therapy, 2, 0.5, RecommendationStatus::Viewed));
        snapshot.recommendations.extend(recs("u1", ResourceType::SelfCare, 8, 0.5, RecommendationStatus::Viewed));
        snapshot.recommendations.extend(recs("u2", ResourceType::Therapy, 8, 0.5, RecommendationStatus::Viewed));
        snapshot.recommendations.extend(recs("u2", ResourceType::SelfCare, 2, 0.5, RecommendationStatus::Viewed));

        let result = scorer(snapshot).score("u1", &therapy(0.0), BUDGET).await.unwrap();
        let indicator = &result.bias_indicators[&IndicatorKind::TherapyUnderrepresentation];
        assert!((indicator.observed - 0.2).abs() < 1e-9);
        assert!((indicator.expected - 0.5).abs() < 1e-9);
        assert!((indicator.severity - 0.6).abs() < 1e-9);
        assert!(result.bias_detected);
        assert_eq!(result.bias_risk_level, Severity::High);
        assert_eq!(
            result.user_demographics.unwrap().race_ethnicity,
            "group_a".to_string()
        );
    }

    #[tokio::test]
    async fn test_poor_calibration_indicator() {
        // 20 recommendations at 0.9 confidence, 5 successful
        let mut snapshot = DatasetSnapshot {
            users: vec![user("u1", "group_a", "low")],
            ..Default::default()
        };
        snapshot.recommendations.extend(recs("u1", ResourceType::SelfCare, 5, 0.9, RecommendationStatus::Completed));
        snapshot.recommendations.extend(recs("u1", ResourceType::SelfCare, 15, 0.9, RecommendationStatus::Dismissed));

        let candidate = RecommendationCandidate {
            resource_type: ResourceType::SelfCare,
            confidence_score: 0.9,
        };
        let result = scorer(snapshot).score("u1", &candidate, BUDGET).await.unwrap();
        let indicator = &result.bias_indicators[&IndicatorKind::PoorCalibration];
        assert!((indicator.observed - 0.25).abs() < 1e-9);
        assert!((indicator.severity - 0.65).abs() < 1e-9);
        assert_eq!(indicator.sample_size, 20);
    }

    #[tokio::test]
    async fn test_small_band_sample_is_not_judged() {
        let mut snapshot = DatasetSnapshot {
            users: vec![user("u1", "group_a", "low")],
            ..Default::default()
        };
        snapshot.recommendations = recs("u1", ResourceType::SelfCare, 10, 0.9, RecommendationStatus::Dismissed);

        let candidate = RecommendationCandidate {
            resource_type: ResourceType::SelfCare,
            confidence_score: 0.9,
        };
        let result = scorer(snapshot).score("u1", &candidate, BUDGET).await.unwrap();
        assert!(result.bias_indicators.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_skipped() {
        let snapshot = DatasetSnapshot {
            users: vec![user("u1", "group_a", "low")],
            ..Default::default()
        };
        let source = InMemoryDataSource::new(snapshot).with_latency(Duration::from_millis(200));
        let scorer = RealtimeScorer::new(Arc::new(source), Arc::new(BiasConfig::default()));

        let result = scorer
            .score("u1", &therapy(0.5), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(result.status, ScoringStatus::Skipped);
        assert_eq!(result.skip_reason.as_deref(), Some(TIMEOUT_REASON));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let source = InMemoryDataSource::default().with_available(false);
        let scorer = RealtimeScorer::new(Arc::new(source), Arc::new(BiasConfig::default()));

        let result = scorer.score("u1", &therapy(0.5), BUDGET).await;
        assert!(matches!(result, Err(crate::types::BiasError::UpstreamQuery(_))));
    }
}
