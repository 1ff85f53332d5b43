//! Core types for the bias engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Smallest accepted analysis window, in days.
pub const MIN_DAYS_BACK: u32 = 1;
/// Largest accepted analysis window, in days.
pub const MAX_DAYS_BACK: u32 = 365;

/// Kind of resource a recommendation points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Therapy,
    Medication,
    SupportGroup,
    SelfCare,
    Educational,
}

impl ResourceType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Therapy => "therapy",
            ResourceType::Medication => "medication",
            ResourceType::SupportGroup => "support_group",
            ResourceType::SelfCare => "self_care",
            ResourceType::Educational => "educational",
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = BiasError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "therapy" => Ok(ResourceType::Therapy),
            "medication" => Ok(ResourceType::Medication),
            "support_group" => Ok(ResourceType::SupportGroup),
            "self_care" => Ok(ResourceType::SelfCare),
            "educational" => Ok(ResourceType::Educational),
            other => Err(BiasError::InvalidConfiguration(format!(
                "unknown resource type: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a recommendation, updated once by user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Delivered,
    Viewed,
    Clicked,
    Engaged,
    Completed,
    Dismissed,
}

/// A demographic or socioeconomic attribute that rows can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum DemographicAttribute {
    AgeGroup,
    GenderIdentity,
    RaceEthnicity,
    IncomeLevel,
    Region,
}

impl DemographicAttribute {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DemographicAttribute::AgeGroup => "age_group",
            DemographicAttribute::GenderIdentity => "gender_identity",
            DemographicAttribute::RaceEthnicity => "race_ethnicity",
            DemographicAttribute::IncomeLevel => "income_level",
            DemographicAttribute::Region => "region",
        }
    }
}

/// Anything carrying demographic attribute values.
pub trait Demographic {
    /// Value of the given attribute for this record.
    fn attribute(&self, attribute: DemographicAttribute) -> &str;
}

/// Severity of a finding, also used as a report risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Kind of bias finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    DemographicParityViolation,
    Underrepresentation,
    DisparateImpact,
    PoorCalibration,
    AccessDisparity,
}

/// An actionable bias finding. Produced fresh per analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct BiasFinding {
    /// What was found
    pub finding_type: FindingType,
    /// How urgent it is
    pub severity: Severity,
    /// Resource type the finding applies to, if any
    pub resource_type: Option<ResourceType>,
    /// Attribute that was tested
    pub demographic_attribute: Option<DemographicAttribute>,
    /// Group affected, if the finding is about one group
    pub demographic_group: Option<String>,
    /// Size of the disparity (difference, ratio or gap)
    pub magnitude: f64,
    /// Human-readable description
    pub description: String,
    /// Suggested remediation
    pub recommended_action: String,
}

/// Whether an analysis had data to work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    NoData,
}

/// Lookback period defining which records an analysis includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    days_back: u32,
    as_of: DateTime<Utc>,
}

impl AnalysisWindow {
    /// A window ending now.
    pub fn new(days_back: u32) -> Result<Self> {
        Self::ending_at(days_back, Utc::now())
    }

    /// A window ending at a fixed instant.
    pub fn ending_at(days_back: u32, as_of: DateTime<Utc>) -> Result<Self> {
        Self::bounded(days_back, MIN_DAYS_BACK, MAX_DAYS_BACK, as_of)
    }

    /// A window with caller-supplied bounds, which must sit inside 1..=365.
    pub fn bounded(days_back: u32, min: u32, max: u32, as_of: DateTime<Utc>) -> Result<Self> {
        let min = min.max(MIN_DAYS_BACK);
        let max = max.min(MAX_DAYS_BACK);
        if days_back < min || days_back > max {
            return Err(BiasError::InvalidConfiguration(format!(
                "days_back must be within [{min}, {max}], got {days_back}"
            )));
        }
        Ok(Self { days_back, as_of })
    }

    /// Lookback length in days.
    pub fn days_back(&self) -> u32 {
        self.days_back
    }

    /// End of the window.
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// Start of the window.
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.as_of - Duration::days(i64::from(self.days_back))
    }

    /// Whether an instant falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.cutoff() && at <= self.as_of
    }
}

/// Error types for the bias engine.
#[derive(Debug, thiserror::Error)]
pub enum BiasError {
    /// The window produced no rows
    ///
    /// Only returned to callers that query a [`DataSource`](crate::DataSource)
    /// directly. The engine's analyses report an empty window as a no-data
    /// result instead.
    #[error("No {dataset} data available for the requested window")]
    DataUnavailable { dataset: &'static str },

    /// Threshold or window outside the allowed range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The backing store failed or is unreachable
    #[error("Upstream query failed: {0}")]
    UpstreamQuery(String),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Result serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BiasError>;
