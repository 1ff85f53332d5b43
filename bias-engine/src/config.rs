//! Configuration for the bias engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use fairness_metrics::CalibrationParams;

use crate::types::{
    BiasError, DemographicAttribute, RecommendationStatus, ResourceType, Result, MAX_DAYS_BACK,
    MIN_DAYS_BACK,
};

/// Configuration for a bias detection engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Fairness thresholds and tested attributes
    pub fairness: FairnessConfig,
    /// Analysis window defaults and bounds
    pub window: WindowConfig,
    /// Calibration test parameters
    pub calibration: CalibrationParams,
    /// Disparate-impact comparison
    pub disparate_impact: DisparateImpactConfig,
    /// Geographic analysis thresholds
    pub geographic: GeographicConfig,
    /// Real-time scorer settings
    pub realtime: RealtimeConfig,
}

impl BiasConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Builder: set the disparate-impact reference group.
    pub fn with_reference_group(mut self, group: impl Into<String>) -> Self {
        self.disparate_impact.reference_group = Some(group.into());
        self
    }

    /// Reject thresholds and bounds outside their allowed ranges.
    pub fn validate(&self) -> Result<()> {
        let f = &self.fairness;
        unit_interval("fairness_threshold", f.fairness_threshold)?;
        open_unit_interval("significance_level", f.significance_level)?;
        positive("effect_size_threshold", f.effect_size_threshold)?;
        unit_interval("high_severity_difference", f.high_severity_difference)?;
        positive("representation_min_ratio", f.representation_min_ratio)?;
        if f.parity_attributes.is_empty() {
            return Err(invalid("parity_attributes must not be empty"));
        }
        if f.success_statuses.is_empty() {
            return Err(invalid("success_statuses must not be empty"));
        }

        let w = &self.window;
        if w.min_days_back < MIN_DAYS_BACK || w.max_days_back > MAX_DAYS_BACK {
            return Err(invalid(format!(
                "window bounds must sit within [{MIN_DAYS_BACK}, {MAX_DAYS_BACK}]"
            )));
        }
        if w.min_days_back > w.max_days_back
            || w.default_days_back < w.min_days_back
            || w.default_days_back > w.max_days_back
        {
            return Err(invalid(format!(
                "default_days_back {} outside [{}, {}]",
                w.default_days_back, w.min_days_back, w.max_days_back
            )));
        }

        let c = &self.calibration;
        if c.n_bins < 2 {
            return Err(invalid("calibration n_bins must be at least 2"));
        }
        if c.min_bins < 3 || c.min_bins > c.n_bins {
            return Err(invalid("calibration min_bins must be within [3, n_bins]"));
        }

        positive("disparate_impact min_ratio", self.disparate_impact.min_ratio)?;
        if let Some(group) = &self.disparate_impact.reference_group {
            if group.trim().is_empty() {
                return Err(invalid("reference_group must not be blank"));
            }
        }

        let g = &self.geographic;
        unit_interval("low_access_threshold", g.low_access_threshold)?;
        unit_interval("access_gap_threshold", g.access_gap_threshold)?;
        if !(1.0..=10.0).contains(&g.low_mood_threshold) {
            return Err(invalid("low_mood_threshold must be on the 1-10 mood scale"));
        }

        let r = &self.realtime;
        if r.timeout_ms == 0 {
            return Err(invalid("realtime timeout_ms must be positive"));
        }
        unit_interval("confidence_band", r.confidence_band)?;
        unit_interval("calibration_error_threshold", r.calibration_error_threshold)?;
        positive("underrepresentation_ratio", r.underrepresentation_ratio)?;
        if let Some(days) = r.baseline_days {
            if !(MIN_DAYS_BACK..=MAX_DAYS_BACK).contains(&days) {
                return Err(invalid("realtime baseline_days must be within [1, 365]"));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> BiasError {
    BiasError::InvalidConfiguration(message.into())
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}

fn open_unit_interval(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within (0, 1), got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

/// Fairness thresholds and the attributes they apply to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    /// Max allowed spread between group rates
    pub fairness_threshold: f64,
    /// Alpha for significance tests
    pub significance_level: f64,
    /// Minimum |Cohen's d| considered a meaningful engagement gap
    pub effect_size_threshold: f64,
    /// Parity spread above which a violation is high severity
    pub high_severity_difference: f64,
    /// Recommendation/population share ratio below which a group is underrepresented
    pub representation_min_ratio: f64,
    /// Attributes tested independently for demographic parity
    pub parity_attributes: Vec<DemographicAttribute>,
    /// Attribute used for equalized odds, chi-square, representation and patterns
    pub protected_attribute: DemographicAttribute,
    /// Statuses that count as a successful outcome
    pub success_statuses: Vec<RecommendationStatus>,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            fairness_threshold: 0.1,
            significance_level: 0.05,
            effect_size_threshold: 0.2,
            high_severity_difference: 0.3,
            representation_min_ratio: 0.8,
            parity_attributes: vec![
                DemographicAttribute::RaceEthnicity,
                DemographicAttribute::IncomeLevel,
                DemographicAttribute::GenderIdentity,
            ],
            protected_attribute: DemographicAttribute::RaceEthnicity,
            success_statuses: vec![RecommendationStatus::Engaged, RecommendationStatus::Completed],
        }
    }
}

impl FairnessConfig {
    /// Whether a status counts as success.
    pub fn is_success(&self, status: RecommendationStatus) -> bool {
        self.success_statuses.contains(&status)
    }
}

/// Analysis window defaults and bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window used when a caller does not pick one
    pub default_days_back: u32,
    /// Shortest accepted window
    pub min_days_back: u32,
    /// Longest accepted window
    pub max_days_back: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_days_back: 90,
            min_days_back: MIN_DAYS_BACK,
            max_days_back: MAX_DAYS_BACK,
        }
    }
}

/// Disparate-impact comparison settings.
///
/// No reference group is set by default. Without one the comparison is
/// skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisparateImpactConfig {
    /// Group every other group is compared against
    pub reference_group: Option<String>,
    /// Attribute whose values form the compared groups
    pub attribute: DemographicAttribute,
    /// Resource type whose recommendation rate is compared
    pub resource_type: ResourceType,
    /// Minimum passing ratio
    pub min_ratio: f64,
}

impl Default for DisparateImpactConfig {
    fn default() -> Self {
        Self {
            reference_group: None,
            attribute: DemographicAttribute::RaceEthnicity,
            resource_type: ResourceType::Therapy,
            min_ratio: 0.8,
        }
    }
}

/// Geographic analysis thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicConfig {
    /// Regions with mean mood below this are low-mood areas (1-10 scale)
    pub low_mood_threshold: f64,
    /// Regions with access rate below this are low-access areas
    pub low_access_threshold: f64,
    /// Access gap across groups above this is significant
    pub access_gap_threshold: f64,
}

impl Default for GeographicConfig {
    fn default() -> Self {
        Self {
            low_mood_threshold: 5.0,
            low_access_threshold: 0.5,
            access_gap_threshold: 0.2,
        }
    }
}

/// Real-time scorer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Budget for the baseline queries (ms)
    pub timeout_ms: u64,
    /// Half-width of the confidence band for calibration lookups
    pub confidence_band: f64,
    /// Band sample must exceed this before calibration is judged
    pub min_sample: u64,
    /// Absolute calibration error that raises an indicator
    pub calibration_error_threshold: f64,
    /// Cohort/overall therapy ratio below which an indicator is raised
    pub underrepresentation_ratio: f64,
    /// Restrict baselines to this many days of history (all history if unset)
    pub baseline_days: Option<u32>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            confidence_band: 0.1,
            min_sample: 10,
            calibration_error_threshold: 0.2,
            underrepresentation_ratio: 0.8,
            baseline_days: None,
        }
    }
}

impl RealtimeConfig {
    /// Timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
