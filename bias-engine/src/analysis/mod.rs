//! Bias analyses.
//!
//! - **Recommendation**: per-resource-type parity, odds, calibration and
//!   chi-square tests plus window-wide fairness metrics
//! - **Geographic**: mood and provider-access disparities by region
//! - **Realtime**: one candidate recommendation against cohort baselines

mod fairness;
mod findings;
mod geographic;
mod patterns;
mod realtime;
mod recommendation;

pub use fairness::{DisparateImpactSummary, FairnessMetrics, RepresentationParity};
pub use geographic::{
    AccessDisparities, AccessGap, GeographicAnalyzer, GeographicBiasAnalysis, GeographicPatterns,
    MoodRange, RegionSummary,
};
pub use patterns::{DemographicPatterns, EngagementEffect, EngagementStats};
pub use realtime::{
    BiasIndicator, CohortDemographics, IndicatorKind, RealtimeBiasResult, RealtimeScorer,
    RecommendationCandidate, ScoringStatus, TIMEOUT_REASON, USER_NOT_FOUND_REASON,
};
pub use recommendation::{RecommendationAnalyzer, RecommendationBiasAnalysis, ResourceTypeBias};
