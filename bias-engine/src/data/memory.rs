//! In-memory data source over a dataset snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{DataSource, DataSourceError, GeographicRow, RecommendationFilter, RecommendationRow, UserDemographics};
use crate::types::{AnalysisWindow, Demographic, DemographicAttribute, RecommendationStatus, ResourceType, Result};

/// A recommendation as stored, before the user join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub recommendation_id: String,
    pub user_ref: String,
    pub resource_type: ResourceType,
    pub confidence_score: f64,
    #[serde(default)]
    pub engagement_score: Option<f64>,
    pub status: RecommendationStatus,
    pub recommended_at: DateTime<Utc>,
}

/// A single mood check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub user_ref: String,
    /// Mood on a 1-10 scale
    pub mood_score: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Users, recommendations and mood entries as exported from the stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSnapshot {
    pub users: Vec<UserDemographics>,
    pub recommendations: Vec<RecommendationRecord>,
    pub mood_entries: Vec<MoodEntry>,
}

impl DatasetSnapshot {
    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a snapshot from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn users_by_ref(&self) -> HashMap<&str, &UserDemographics> {
        self.users
            .iter()
            .map(|u| (u.pseudonym_id.as_str(), u))
            .collect()
    }
}

/// Data source backed by an in-process snapshot.
///
/// Supports toggling availability and injecting per-query latency so
/// failure and timeout paths can be exercised without a database.
pub struct InMemoryDataSource {
    id: String,
    snapshot: Arc<RwLock<DatasetSnapshot>>,
    available: AtomicBool,
    latency: Option<Duration>,
    query_count: AtomicU32,
}

impl InMemoryDataSource {
    /// Create a data source over a snapshot.
    pub fn new(snapshot: DatasetSnapshot) -> Self {
        Self {
            id: "in-memory".to_string(),
            snapshot: Arc::new(RwLock::new(snapshot)),
            available: AtomicBool::new(true),
            latency: None,
            query_count: AtomicU32::new(0),
        }
    }

    /// Set the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Delay every query by a fixed duration.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle availability after construction.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of queries issued so far.
    pub fn query_count(&self) -> u32 {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Append a recommendation record.
    pub async fn insert_recommendation(&self, record: RecommendationRecord) {
        self.snapshot.write().await.recommendations.push(record);
    }

    /// Append a user.
    pub async fn insert_user(&self, user: UserDemographics) {
        self.snapshot.write().await.users.push(user);
    }

    /// Append a mood entry.
    pub async fn insert_mood_entry(&self, entry: MoodEntry) {
        self.snapshot.write().await.mood_entries.push(entry);
    }

    async fn begin_query(&self, query: &str) -> std::result::Result<(), DataSourceError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.id, query, "Data source query");

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(DataSourceError::Upstream(format!(
                "data source {} unavailable",
                self.id
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryDataSource {
    fn default() -> Self {
        Self::new(DatasetSnapshot::default())
    }
}

fn matches_filter(
    record: &RecommendationRecord,
    user: Option<&UserDemographics>,
    filter: &RecommendationFilter,
) -> bool {
    if let Some(resource_type) = filter.resource_type {
        if record.resource_type != resource_type {
            return false;
        }
    }
    if let Some((low, high)) = filter.confidence_range {
        if record.confidence_score < low || record.confidence_score > high {
            return false;
        }
    }
    if let Some(statuses) = &filter.statuses {
        if !statuses.contains(&record.status) {
            return false;
        }
    }
    if let Some(since) = filter.since {
        if record.recommended_at < since {
            return false;
        }
    }
    if filter.needs_demographics() {
        let Some(user) = user else {
            return false;
        };
        if let Some(race) = &filter.race_ethnicity {
            if &user.race_ethnicity != race {
                return false;
            }
        }
        if let Some(income) = &filter.income_level {
            if &user.income_level != income {
                return false;
            }
        }
    }
    true
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_recommendation_dataset(
        &self,
        window: &AnalysisWindow,
    ) -> std::result::Result<Vec<RecommendationRow>, DataSourceError> {
        self.begin_query("recommendation_dataset").await?;
        let snapshot = self.snapshot.read().await;
        let users = snapshot.users_by_ref();

        let rows: Vec<RecommendationRow> = snapshot
            .recommendations
            .iter()
            .filter(|r| window.contains(r.recommended_at))
            .filter_map(|r| {
                let user = users.get(r.user_ref.as_str())?;
                Some(RecommendationRow {
                    recommendation_id: r.recommendation_id.clone(),
                    user_ref: r.user_ref.clone(),
                    resource_type: r.resource_type,
                    age_group: user.age_group.clone(),
                    gender_identity: user.gender_identity.clone(),
                    race_ethnicity: user.race_ethnicity.clone(),
                    income_level: user.income_level.clone(),
                    zip_code_prefix: user.zip_code_prefix.clone(),
                    confidence_score: r.confidence_score,
                    engagement_score: r.engagement_score,
                    status: r.status,
                    recommended_at: r.recommended_at,
                })
            })
            .collect();

        if rows.is_empty() {
            return Err(DataSourceError::DataUnavailable {
                dataset: "recommendation",
                cutoff: window.cutoff(),
            });
        }
        Ok(rows)
    }

    async fn load_geographic_dataset(
        &self,
        window: &AnalysisWindow,
    ) -> std::result::Result<Vec<GeographicRow>, DataSourceError> {
        self.begin_query("geographic_dataset").await?;
        let snapshot = self.snapshot.read().await;

        let mut moods: HashMap<&str, (f64, u64)> = HashMap::new();
        for entry in snapshot
            .mood_entries
            .iter()
            .filter(|e| window.contains(e.recorded_at))
        {
            let slot = moods.entry(entry.user_ref.as_str()).or_default();
            slot.0 += entry.mood_score;
            slot.1 += 1;
        }

        let rows: Vec<GeographicRow> = snapshot
            .users
            .iter()
            .filter_map(|u| {
                let &(sum, count) = moods.get(u.pseudonym_id.as_str())?;
                Some(GeographicRow {
                    user_ref: u.pseudonym_id.clone(),
                    zip_code_prefix: u.zip_code_prefix.clone(),
                    race_ethnicity: u.race_ethnicity.clone(),
                    income_level: u.income_level.clone(),
                    coordinates: u.coordinates,
                    has_mental_health_provider: u.has_mental_health_provider,
                    avg_mood: sum / count as f64,
                    mood_entry_count: count,
                })
            })
            .collect();

        if rows.is_empty() {
            return Err(DataSourceError::DataUnavailable {
                dataset: "geographic",
                cutoff: window.cutoff(),
            });
        }
        Ok(rows)
    }

    async fn population_distribution(
        &self,
        attribute: DemographicAttribute,
    ) -> std::result::Result<BTreeMap<String, u64>, DataSourceError> {
        self.begin_query("population_distribution").await?;
        let snapshot = self.snapshot.read().await;

        let mut counts = BTreeMap::new();
        for user in &snapshot.users {
            *counts.entry(user.attribute(attribute).to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_user(
        &self,
        user_ref: &str,
    ) -> std::result::Result<Option<UserDemographics>, DataSourceError> {
        self.begin_query("find_user").await?;
        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .users
            .iter()
            .find(|u| u.pseudonym_id == user_ref)
            .cloned())
    }

    async fn count_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> std::result::Result<u64, DataSourceError> {
        self.begin_query("count_recommendations").await?;
        let snapshot = self.snapshot.read().await;
        let users = snapshot.users_by_ref();

        let count = snapshot
            .recommendations
            .iter()
            .filter(|r| matches_filter(r, users.get(r.user_ref.as_str()).copied(), filter))
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn user(id: &str, race: &str, income: &str, zip: &str, provider: bool) -> UserDemographics {
        UserDemographics {
            pseudonym_id: id.to_string(),
            age_group: "25-34".to_string(),
            gender_identity: "nonbinary".to_string(),
            race_ethnicity: race.to_string(),
            income_level: income.to_string(),
            zip_code_prefix: zip.to_string(),
            coordinates: None,
            has_mental_health_provider: provider,
        }
    }

    fn rec(id: &str, user_ref: &str, resource: ResourceType, days_ago: i64) -> RecommendationRecord {
        RecommendationRecord {
            recommendation_id: id.to_string(),
            user_ref: user_ref.to_string(),
            resource_type: resource,
            confidence_score: 0.6,
            engagement_score: Some(0.5),
            status: RecommendationStatus::Completed,
            recommended_at: Utc::now() - ChronoDuration::days(days_ago),
        }
    }

    fn mood(user_ref: &str, score: f64, days_ago: i64) -> MoodEntry {
        MoodEntry {
            user_ref: user_ref.to_string(),
            mood_score: score,
            recorded_at: Utc::now() - ChronoDuration::days(days_ago),
        }
    }

    fn snapshot() -> DatasetSnapshot {
        DatasetSnapshot {
            users: vec![
                user("u1", "group_a", "low", "941", true),
                user("u2", "group_b", "high", "100", false),
            ],
            recommendations: vec![
                rec("r1", "u1", ResourceType::Therapy, 1),
                rec("r2", "u2", ResourceType::SelfCare, 2),
                rec("r3", "ghost", ResourceType::Therapy, 1),
                rec("r4", "u1", ResourceType::Therapy, 200),
            ],
            mood_entries: vec![
                mood("u1", 4.0, 1),
                mood("u1", 6.0, 3),
                mood("u2", 8.0, 100),
            ],
        }
    }

    #[tokio::test]
    async fn test_recommendation_join_and_window() {
        let source = InMemoryDataSource::new(snapshot());
        let window = AnalysisWindow::new(30).unwrap();

        let rows = source.load_recommendation_dataset(&window).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.recommendation_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(rows[0].race_ethnicity, "group_a");
        assert_eq!(rows[1].income_level, "high");
    }

    #[tokio::test]
    async fn test_empty_join_is_data_unavailable() {
        let source = InMemoryDataSource::default();
        let window = AnalysisWindow::new(30).unwrap();

        let result = source.load_recommendation_dataset(&window).await;
        assert!(matches!(
            result,
            Err(DataSourceError::DataUnavailable { dataset: "recommendation", .. })
        ));
        let result = source.load_geographic_dataset(&window).await;
        assert!(matches!(result, Err(DataSourceError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_data_unavailable_converts_for_direct_callers() {
        async fn load(source: &InMemoryDataSource) -> crate::types::Result<usize> {
            let window = AnalysisWindow::new(30)?;
            Ok(source.load_geographic_dataset(&window).await?.len())
        }

        let result = load(&InMemoryDataSource::default()).await;
        assert!(matches!(
            result,
            Err(crate::types::BiasError::DataUnavailable { dataset: "geographic" })
        ));
    }

    #[tokio::test]
    async fn test_geographic_aggregates_per_user() {
        let source = InMemoryDataSource::new(snapshot());
        let window = AnalysisWindow::new(30).unwrap();

        let rows = source.load_geographic_dataset(&window).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_ref, "u1");
        assert_eq!(rows[0].avg_mood, 5.0);
        assert_eq!(rows[0].mood_entry_count, 2);
        assert!(rows[0].has_mental_health_provider);
    }

    #[tokio::test]
    async fn test_count_with_filters() {
        let source = InMemoryDataSource::new(snapshot());

        assert_eq!(source.count_recommendations(&RecommendationFilter::all()).await.unwrap(), 4);

        let therapy = RecommendationFilter::all().resource_type(ResourceType::Therapy);
        assert_eq!(source.count_recommendations(&therapy).await.unwrap(), 3);

        let cohort = RecommendationFilter::all().cohort("group_a", "low");
        assert_eq!(source.count_recommendations(&cohort).await.unwrap(), 2);

        let recent = cohort.since(Some(Utc::now() - ChronoDuration::days(30)));
        assert_eq!(source.count_recommendations(&recent).await.unwrap(), 1);

        let band = RecommendationFilter::all()
            .confidence_between(0.5, 0.6)
            .statuses([RecommendationStatus::Completed]);
        assert_eq!(source.count_recommendations(&band).await.unwrap(), 4);

        let nobody = RecommendationFilter::all().cohort("group_z", "low");
        assert_eq!(source.count_recommendations(&nobody).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_population_and_lookup() {
        let source = InMemoryDataSource::new(snapshot());

        let dist = source
            .population_distribution(DemographicAttribute::RaceEthnicity)
            .await
            .unwrap();
        assert_eq!(dist.get("group_a"), Some(&1));
        assert_eq!(dist.get("group_b"), Some(&1));

        assert!(source.find_user("u2").await.unwrap().is_some());
        assert!(source.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_source() {
        let source = InMemoryDataSource::new(snapshot()).with_available(false);

        let result = source.find_user("u1").await;
        assert!(matches!(result, Err(DataSourceError::Upstream(_))));
        assert_eq!(source.query_count(), 1);

        source.set_available(true);
        assert!(source.find_user("u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_insert_visible_to_later_queries() {
        let source = InMemoryDataSource::new(snapshot());
        source
            .insert_recommendation(rec("r5", "u2", ResourceType::Therapy, 0))
            .await;

        let therapy = RecommendationFilter::all().resource_type(ResourceType::Therapy);
        assert_eq!(source.count_recommendations(&therapy).await.unwrap(), 4);
    }

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "users": [{
                "pseudonym_id": "u1",
                "age_group": "18-24",
                "gender_identity": "woman",
                "race_ethnicity": "group_a",
                "income_level": "low",
                "zip_code_prefix": "941"
            }],
            "recommendations": [{
                "recommendation_id": "r1",
                "user_ref": "u1",
                "resource_type": "support_group",
                "confidence_score": 0.7,
                "status": "viewed",
                "recommended_at": "2026-01-01T00:00:00Z"
            }]
        }"#;
        let snapshot = DatasetSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.users.len(), 1);
        assert!(!snapshot.users[0].has_mental_health_provider);
        assert_eq!(snapshot.recommendations[0].resource_type, ResourceType::SupportGroup);
        assert!(snapshot.recommendations[0].engagement_score.is_none());
        assert!(snapshot.mood_entries.is_empty());
    }
}
