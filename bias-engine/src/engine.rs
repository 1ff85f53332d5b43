//! BiasDetectionEngine - entry point for all bias analyses.
//!
//! Wires the analyzers, the real-time scorer and the report generator to
//! one data source and one validated configuration.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::analysis::{
    GeographicAnalyzer, GeographicBiasAnalysis, RealtimeBiasResult, RealtimeScorer,
    RecommendationAnalyzer, RecommendationBiasAnalysis, RecommendationCandidate,
};
use crate::config::BiasConfig;
use crate::data::DataSource;
use crate::report::{BiasReport, ReportGenerator};
use crate::types::{AnalysisWindow, BiasError, Result};

/// The bias detection engine.
///
/// Holds no mutable state; every call reads fresh data from the source.
pub struct BiasDetectionEngine {
    config: Arc<BiasConfig>,
    source: Arc<dyn DataSource>,
    recommendations: RecommendationAnalyzer,
    geographic: GeographicAnalyzer,
    realtime: RealtimeScorer,
}

impl BiasDetectionEngine {
    /// Create an engine with default configuration.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self::assemble(source, Arc::new(BiasConfig::default()))
    }

    /// Create with custom configuration, rejecting out-of-range values.
    pub fn with_config(source: Arc<dyn DataSource>, config: BiasConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(source, Arc::new(config)))
    }

    /// Create a builder.
    pub fn builder(source: Arc<dyn DataSource>) -> BiasEngineBuilder {
        BiasEngineBuilder::new(source)
    }

    fn assemble(source: Arc<dyn DataSource>, config: Arc<BiasConfig>) -> Self {
        Self {
            recommendations: RecommendationAnalyzer::new(source.clone(), config.clone()),
            geographic: GeographicAnalyzer::new(source.clone(), config.clone()),
            realtime: RealtimeScorer::new(source.clone(), config.clone()),
            config,
            source,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    /// A window ending now, within the configured bounds.
    pub fn window(&self, days_back: u32) -> Result<AnalysisWindow> {
        let bounds = &self.config.window;
        AnalysisWindow::bounded(days_back, bounds.min_days_back, bounds.max_days_back, Utc::now())
    }

    /// The configured default window, ending now.
    pub fn default_window(&self) -> Result<AnalysisWindow> {
        self.window(self.config.window.default_days_back)
    }

    fn check_window(&self, window: &AnalysisWindow) -> Result<()> {
        let bounds = &self.config.window;
        let days = window.days_back();
        if days < bounds.min_days_back || days > bounds.max_days_back {
            return Err(BiasError::InvalidConfiguration(format!(
                "days_back must be within [{}, {}], got {days}",
                bounds.min_days_back, bounds.max_days_back
            )));
        }
        Ok(())
    }

    /// Analyze recommendation bias over a window.
    pub async fn analyze_recommendation_bias(
        &self,
        window: &AnalysisWindow,
    ) -> Result<RecommendationBiasAnalysis> {
        self.check_window(window)?;
        self.recommendations.analyze(window).await
    }

    /// Analyze geographic bias over a window.
    pub async fn analyze_geographic_bias(
        &self,
        window: &AnalysisWindow,
    ) -> Result<GeographicBiasAnalysis> {
        self.check_window(window)?;
        self.geographic.analyze(window).await
    }

    /// Score one candidate recommendation within the configured timeout.
    pub async fn detect_algorithmic_bias_realtime(
        &self,
        user_ref: &str,
        candidate: &RecommendationCandidate,
    ) -> Result<RealtimeBiasResult> {
        self.detect_algorithmic_bias_realtime_within(user_ref, candidate, self.config.realtime.timeout())
            .await
    }

    /// Score one candidate recommendation within a caller-supplied timeout.
    pub async fn detect_algorithmic_bias_realtime_within(
        &self,
        user_ref: &str,
        candidate: &RecommendationCandidate,
        timeout: Duration,
    ) -> Result<RealtimeBiasResult> {
        self.realtime.score(user_ref, candidate, timeout).await
    }

    /// Generate a report over the default window.
    pub async fn generate_bias_report(&self) -> Result<BiasReport> {
        let window = self.default_window()?;
        self.generate_bias_report_for(&window).await
    }

    /// Generate a report with both analyses over one window.
    pub async fn generate_bias_report_for(&self, window: &AnalysisWindow) -> Result<BiasReport> {
        info!(
            source = %self.source.id(),
            days_back = window.days_back(),
            "Generating bias detection report"
        );

        let recommendation_bias = self.analyze_recommendation_bias(window).await?;
        let geographic_bias = self.analyze_geographic_bias(window).await?;
        let report = ReportGenerator::compose(window, recommendation_bias, geographic_bias)?;

        info!(
            report_id = %report.report_id,
            total_issues = report.overall_assessment.total_issues,
            risk_level = report.overall_assessment.risk_level.as_str(),
            "Bias detection report generated"
        );

        Ok(report)
    }
}

/// Builder for BiasDetectionEngine.
pub struct BiasEngineBuilder {
    source: Arc<dyn DataSource>,
    config: BiasConfig,
}

impl BiasEngineBuilder {
    /// Create a builder with default configuration.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            config: BiasConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BiasConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default window length.
    pub fn default_days_back(mut self, days: u32) -> Self {
        self.config.window.default_days_back = days;
        self
    }

    /// Set the disparate-impact reference group.
    pub fn reference_group(mut self, group: impl Into<String>) -> Self {
        self.config.disparate_impact.reference_group = Some(group.into());
        self
    }

    /// Set the parity threshold.
    pub fn fairness_threshold(mut self, threshold: f64) -> Self {
        self.config.fairness.fairness_threshold = threshold;
        self
    }

    /// Set the real-time timeout.
    pub fn realtime_timeout(mut self, timeout: Duration) -> Self {
        self.config.realtime.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<BiasDetectionEngine> {
        BiasDetectionEngine::with_config(self.source, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ScoringStatus;
    use crate::data::{
        DatasetSnapshot, InMemoryDataSource, MoodEntry, RecommendationRecord, UserDemographics,
    };
    use crate::types::{
        AnalysisStatus, FindingType, RecommendationStatus, ResourceType, Severity,
    };
    use chrono::Duration as ChronoDuration;
    use fairness_metrics::MetricStatus;

    fn user(id: &str, race: &str, zip: &str, provider: bool) -> UserDemographics {
        UserDemographics {
            pseudonym_id: id.to_string(),
            age_group: "25-34".to_string(),
            gender_identity: "woman".to_string(),
            race_ethnicity: race.to_string(),
            income_level: "middle".to_string(),
            zip_code_prefix: zip.to_string(),
            coordinates: None,
            has_mental_health_provider: provider,
        }
    }

    fn recs(user_ref: &str, resource_type: ResourceType, n: usize) -> Vec<RecommendationRecord> {
        (0..n)
            .map(|i| RecommendationRecord {
                recommendation_id: format!("{user_ref}-{}-{i}", resource_type.as_str()),
                user_ref: user_ref.to_string(),
                resource_type,
                confidence_score: 0.6,
                engagement_score: Some(0.5),
                status: RecommendationStatus::Viewed,
                recommended_at: Utc::now() - ChronoDuration::days(1),
            })
            .collect()
    }

    fn mood(user_ref: &str, score: f64) -> MoodEntry {
        MoodEntry {
            user_ref: user_ref.to_string(),
            mood_score: score,
            recorded_at: Utc::now() - ChronoDuration::days(2),
        }
    }

    /// group_a therapy share 0.21, group_b 0.30
    fn seventy_percent_snapshot() -> DatasetSnapshot {
        let mut recommendations = recs("ua", ResourceType::Therapy, 21);
        recommendations.extend(recs("ua", ResourceType::SelfCare, 79));
        recommendations.extend(recs("ub", ResourceType::Therapy, 30));
        recommendations.extend(recs("ub", ResourceType::SelfCare, 70));

        DatasetSnapshot {
            users: vec![
                user("ua", "group_a", "941", false),
                user("ub", "group_b", "100", true),
            ],
            recommendations,
            mood_entries: vec![mood("ua", 4.0), mood("ub", 7.0)],
        }
    }

    #[tokio::test]
    async fn test_empty_window_is_no_data() {
        let engine = BiasDetectionEngine::new(Arc::new(InMemoryDataSource::default()));
        let window = engine.window(30).unwrap();

        let analysis = engine.analyze_recommendation_bias(&window).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::NoData);
        assert_eq!(analysis.total_recommendations, 0);
        assert!(analysis.bias_tests.is_empty());

        let geographic = engine.analyze_geographic_bias(&window).await.unwrap();
        assert_eq!(geographic.status, AnalysisStatus::NoData);

        let report = engine.generate_bias_report_for(&window).await.unwrap();
        assert_eq!(report.overall_assessment.total_issues, 0);
        assert_eq!(report.overall_assessment.risk_level, Severity::Low);
        assert_eq!(report.action_items.len(), 1);
    }

    #[tokio::test]
    async fn test_disparate_impact_end_to_end() {
        let engine = BiasDetectionEngine::builder(Arc::new(InMemoryDataSource::new(
            seventy_percent_snapshot(),
        )))
        .reference_group("group_b")
        .build()
        .unwrap();
        let window = engine.window(30).unwrap();

        let analysis = engine.analyze_recommendation_bias(&window).await.unwrap();
        let impact = &analysis.fairness_metrics.as_ref().unwrap().disparate_impact;
        assert_eq!(impact.status, MetricStatus::Computed);
        let a = &impact.groups["group_a"];
        assert!((a.ratio - 0.7).abs() < 1e-9);
        assert!(!a.passes_80_percent_rule);

        let finding = analysis
            .findings()
            .iter()
            .find(|f| f.finding_type == FindingType::DisparateImpact)
            .unwrap();
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.demographic_group.as_deref(), Some("group_a"));
    }

    #[tokio::test]
    async fn test_unset_reference_group_raises_no_impact_finding() {
        let engine =
            BiasDetectionEngine::new(Arc::new(InMemoryDataSource::new(seventy_percent_snapshot())));
        let window = engine.window(30).unwrap();

        let analysis = engine.analyze_recommendation_bias(&window).await.unwrap();
        let impact = &analysis.fairness_metrics.as_ref().unwrap().disparate_impact;
        assert_eq!(impact.status, MetricStatus::Skipped);
        assert!(!analysis
            .findings()
            .iter()
            .any(|f| f.finding_type == FindingType::DisparateImpact));
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent() {
        let engine =
            BiasDetectionEngine::new(Arc::new(InMemoryDataSource::new(seventy_percent_snapshot())));
        let window = engine.window(30).unwrap();

        let first = engine.analyze_recommendation_bias(&window).await.unwrap();
        let second = engine.analyze_recommendation_bias(&window).await.unwrap();
        assert_eq!(first, second);

        let a = engine.generate_bias_report_for(&window).await.unwrap();
        let b = engine.generate_bias_report_for(&window).await.unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.report_id, b.report_id);
        assert_eq!(a, BiasReport { generated_at: a.generated_at, ..b });
    }

    #[tokio::test]
    async fn test_report_covers_both_analyses() {
        let engine = BiasDetectionEngine::builder(Arc::new(InMemoryDataSource::new(
            seventy_percent_snapshot(),
        )))
        .reference_group("group_b")
        .default_days_back(30)
        .build()
        .unwrap();

        let report = engine.generate_bias_report().await.unwrap();
        assert_eq!(report.analysis_period_days, 30);
        assert_eq!(report.recommendation_bias.analysis_period_days, 30);
        assert_eq!(report.geographic_bias.analysis_period_days, 30);
        assert_eq!(report.analysis_summary.total_recommendations, 200);
        assert_eq!(report.analysis_summary.total_locations, 2);

        // access 0.0 vs 1.0 across groups
        assert!(report
            .findings()
            .any(|f| f.finding_type == FindingType::AccessDisparity));
        assert_eq!(report.overall_assessment.risk_level, Severity::High);
        assert!(report.overall_assessment.requires_immediate_action);
        assert_eq!(report.overall_assessment.total_issues, report.findings().count());
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_before_query() {
        let source = Arc::new(InMemoryDataSource::new(seventy_percent_snapshot()));
        let engine = BiasDetectionEngine::new(source.clone());

        assert!(matches!(engine.window(0), Err(BiasError::InvalidConfiguration(_))));
        assert!(matches!(engine.window(366), Err(BiasError::InvalidConfiguration(_))));

        let mut config = BiasConfig::default();
        config.window.max_days_back = 30;
        config.window.default_days_back = 30;
        let narrow = BiasDetectionEngine::with_config(source.clone(), config).unwrap();
        let wide = AnalysisWindow::new(90).unwrap();
        let result = narrow.analyze_recommendation_bias(&wide).await;
        assert!(matches!(result, Err(BiasError::InvalidConfiguration(_))));
        assert_eq!(source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = BiasConfig::default();
        config.fairness.fairness_threshold = -0.1;
        let result =
            BiasDetectionEngine::with_config(Arc::new(InMemoryDataSource::default()), config);
        assert!(matches!(result, Err(BiasError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let source = Arc::new(InMemoryDataSource::new(seventy_percent_snapshot()));
        let engine = BiasDetectionEngine::new(source.clone());
        let window = engine.window(30).unwrap();
        source.set_available(false);

        let result = engine.analyze_recommendation_bias(&window).await;
        assert!(matches!(result, Err(BiasError::UpstreamQuery(_))));
        let result = engine.generate_bias_report_for(&window).await;
        assert!(matches!(result, Err(BiasError::UpstreamQuery(_))));
    }

    #[tokio::test]
    async fn test_realtime_timeout_is_skipped() {
        let source = InMemoryDataSource::new(seventy_percent_snapshot())
            .with_latency(Duration::from_millis(100));
        let engine = BiasDetectionEngine::builder(Arc::new(source))
            .realtime_timeout(Duration::from_millis(10))
            .build()
            .unwrap();

        let candidate = RecommendationCandidate {
            resource_type: ResourceType::Therapy,
            confidence_score: 0.6,
        };
        let result = engine
            .detect_algorithmic_bias_realtime("ua", &candidate)
            .await
            .unwrap();
        assert_eq!(result.status, ScoringStatus::Skipped);
    }

    #[tokio::test]
    async fn test_realtime_cohort_near_baseline_is_not_flagged() {
        let engine =
            BiasDetectionEngine::new(Arc::new(InMemoryDataSource::new(seventy_percent_snapshot())));
        let candidate = RecommendationCandidate {
            resource_type: ResourceType::Therapy,
            confidence_score: 0.0,
        };

        // cohort 0.21 vs overall 0.255
        let result = engine
            .detect_algorithmic_bias_realtime_within("ua", &candidate, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.status, ScoringStatus::Scored);
        assert!(!result.bias_detected);

        // group_b is over-served, never flagged
        let result = engine
            .detect_algorithmic_bias_realtime_within("ub", &candidate, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!result.bias_detected);
    }
}
