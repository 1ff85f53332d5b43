//! Read-only data access for bias analyses.
//!
//! The engine never owns a store connection. It is handed a [`DataSource`]
//! capability that joins recommendation events, user demographics and
//! social-determinant attributes into flat analysis rows:
//! - Recommendation dataset: one row per recommendation in the window
//! - Geographic dataset: one row per user with mood entries in the window
//! - Count queries for real-time cohort baselines

pub mod memory;

pub use memory::{DatasetSnapshot, InMemoryDataSource, MoodEntry, RecommendationRecord};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::types::{
    AnalysisWindow, BiasError, Demographic, DemographicAttribute, RecommendationStatus,
    ResourceType,
};

/// Error types for data source operations.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    /// The join produced zero rows for the window
    #[error("No {dataset} rows since {cutoff}")]
    DataUnavailable {
        dataset: &'static str,
        cutoff: DateTime<Utc>,
    },

    /// The store is unreachable or the query failed
    #[error("Store error: {0}")]
    Upstream(String),
}

impl From<DataSourceError> for BiasError {
    fn from(err: DataSourceError) -> Self {
        match err {
            DataSourceError::DataUnavailable { dataset, .. } => BiasError::DataUnavailable { dataset },
            DataSourceError::Upstream(message) => BiasError::UpstreamQuery(message),
        }
    }
}

/// Read-only capability over the recommendation, user and mood stores.
///
/// Implementations may share a connection pool with unrelated requests;
/// the engine issues its queries sequentially within one analysis.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Identifier for logging.
    fn id(&self) -> &str;

    /// Recommendations in the window joined with their user's demographics.
    ///
    /// Fails with [`DataSourceError::DataUnavailable`] when the join is empty.
    async fn load_recommendation_dataset(
        &self,
        window: &AnalysisWindow,
    ) -> Result<Vec<RecommendationRow>, DataSourceError>;

    /// Per-user mood aggregates in the window joined with location and access.
    ///
    /// Fails with [`DataSourceError::DataUnavailable`] when the join is empty.
    async fn load_geographic_dataset(
        &self,
        window: &AnalysisWindow,
    ) -> Result<Vec<GeographicRow>, DataSourceError>;

    /// User counts per value of an attribute over the whole user population.
    async fn population_distribution(
        &self,
        attribute: DemographicAttribute,
    ) -> Result<BTreeMap<String, u64>, DataSourceError>;

    /// Look up one user's demographics.
    async fn find_user(&self, user_ref: &str) -> Result<Option<UserDemographics>, DataSourceError>;

    /// Count recommendations matching a filter.
    async fn count_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<u64, DataSourceError>;
}

/// Geographic coordinates of a user's coarse location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Demographic snapshot of one pseudonymous user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDemographics {
    /// Pseudonymous user id
    pub pseudonym_id: String,
    pub age_group: String,
    pub gender_identity: String,
    pub race_ethnicity: String,
    pub income_level: String,
    /// Anonymized region key
    pub zip_code_prefix: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Whether the user reports access to a mental-health provider
    #[serde(default)]
    pub has_mental_health_provider: bool,
}

impl Demographic for UserDemographics {
    fn attribute(&self, attribute: DemographicAttribute) -> &str {
        match attribute {
            DemographicAttribute::AgeGroup => &self.age_group,
            DemographicAttribute::GenderIdentity => &self.gender_identity,
            DemographicAttribute::RaceEthnicity => &self.race_ethnicity,
            DemographicAttribute::IncomeLevel => &self.income_level,
            DemographicAttribute::Region => &self.zip_code_prefix,
        }
    }
}

/// One recommendation joined with the issuing user's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRow {
    pub recommendation_id: String,
    pub user_ref: String,
    pub resource_type: ResourceType,
    pub age_group: String,
    pub gender_identity: String,
    pub race_ethnicity: String,
    pub income_level: String,
    pub zip_code_prefix: String,
    pub confidence_score: f64,
    pub engagement_score: Option<f64>,
    pub status: RecommendationStatus,
    pub recommended_at: DateTime<Utc>,
}

impl Demographic for RecommendationRow {
    fn attribute(&self, attribute: DemographicAttribute) -> &str {
        match attribute {
            DemographicAttribute::AgeGroup => &self.age_group,
            DemographicAttribute::GenderIdentity => &self.gender_identity,
            DemographicAttribute::RaceEthnicity => &self.race_ethnicity,
            DemographicAttribute::IncomeLevel => &self.income_level,
            DemographicAttribute::Region => &self.zip_code_prefix,
        }
    }
}

/// One user's mood aggregate joined with location and access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicRow {
    pub user_ref: String,
    pub zip_code_prefix: String,
    pub race_ethnicity: String,
    pub income_level: String,
    pub coordinates: Option<Coordinates>,
    pub has_mental_health_provider: bool,
    /// Mean mood score (1-10) over the window
    pub avg_mood: f64,
    /// Mood entries over the window
    pub mood_entry_count: u64,
}

/// Predicate for [`DataSource::count_recommendations`].
///
/// Unset fields do not restrict. Demographic fields restrict to
/// recommendations whose user matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationFilter {
    pub race_ethnicity: Option<String>,
    pub income_level: Option<String>,
    pub resource_type: Option<ResourceType>,
    /// Inclusive confidence range
    pub confidence_range: Option<(f64, f64)>,
    pub statuses: Option<Vec<RecommendationStatus>>,
    pub since: Option<DateTime<Utc>>,
}

impl RecommendationFilter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder: restrict to a (race_ethnicity, income_level) cohort.
    pub fn cohort(mut self, race_ethnicity: impl Into<String>, income_level: impl Into<String>) -> Self {
        self.race_ethnicity = Some(race_ethnicity.into());
        self.income_level = Some(income_level.into());
        self
    }

    /// Builder: restrict to one resource type.
    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Builder: restrict to an inclusive confidence range.
    pub fn confidence_between(mut self, low: f64, high: f64) -> Self {
        self.confidence_range = Some((low, high));
        self
    }

    /// Builder: restrict to a set of statuses.
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = RecommendationStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Builder: restrict to recommendations made at or after an instant.
    pub fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Whether the filter needs the user join.
    pub fn needs_demographics(&self) -> bool {
        self.race_ethnicity.is_some() || self.income_level.is_some()
    }
}
