//! Geographic bias analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fairness_metrics::stats::{mean, sample_std};

use super::findings;
use crate::config::{BiasConfig, GeographicConfig};
use crate::data::{Coordinates, DataSource, DataSourceError, GeographicRow};
use crate::types::{AnalysisStatus, AnalysisWindow, BiasFinding, Result};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Mood and access aggregate for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RegionSummary {
    /// Users with mood entries in the window
    pub user_count: usize,
    /// Mean of the users' average mood
    pub avg_mood: f64,
    pub mood_entry_count: u64,
    /// Share of users with a mental-health provider
    pub access_rate: f64,
    /// Mean location of users with coordinates
    pub centroid: Option<Coordinates>,
}

/// Spread of per-user average mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct MoodRange {
    pub min: f64,
    pub max: f64,
    pub std: Option<f64>,
}

/// Region-level mood and access patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GeographicPatterns {
    pub regions: BTreeMap<String, RegionSummary>,
    /// Regions with mean mood below the low-mood threshold
    pub low_mood_areas: Vec<String>,
    /// Regions with access rate below the low-access threshold
    pub low_access_areas: Vec<String>,
    pub mood_range: MoodRange,
}

/// Spread between the best- and worst-served groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AccessGap {
    pub max_rate: f64,
    pub min_rate: f64,
    pub gap: f64,
    pub highest_group: Option<String>,
    pub lowest_group: Option<String>,
    pub significant_disparity: bool,
}

/// Provider access across race/ethnicity groups and regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AccessDisparities {
    /// Per group, mean of its per-region access rates
    pub access_rates_by_group: BTreeMap<String, f64>,
    /// Per group, access rate in each region it appears in
    pub access_by_group_and_region: BTreeMap<String, BTreeMap<String, f64>>,
    pub access_gap: AccessGap,
}

/// Result of a geographic bias analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GeographicBiasAnalysis {
    pub status: AnalysisStatus,
    pub analysis_period_days: u32,
    /// Users with mood entries in the window
    pub total_locations: usize,
    pub geographic_patterns: Option<GeographicPatterns>,
    pub access_disparities: Option<AccessDisparities>,
    /// Findings
    pub recommendations: Vec<BiasFinding>,
}

impl GeographicBiasAnalysis {
    /// Result for a window with no mood data.
    pub fn no_data(analysis_period_days: u32) -> Self {
        Self {
            status: AnalysisStatus::NoData,
            analysis_period_days,
            total_locations: 0,
            geographic_patterns: None,
            access_disparities: None,
            recommendations: Vec::new(),
        }
    }

    /// Findings raised by this analysis.
    pub fn findings(&self) -> &[BiasFinding] {
        &self.recommendations
    }
}

/// Analyzer for geographic mood and access disparities.
pub struct GeographicAnalyzer {
    source: Arc<dyn DataSource>,
    config: Arc<BiasConfig>,
}

impl GeographicAnalyzer {
    /// Create an analyzer over a data source.
    pub fn new(source: Arc<dyn DataSource>, config: Arc<BiasConfig>) -> Self {
        Self { source, config }
    }

    /// Load the window's per-user mood aggregates and analyze them.
    pub async fn analyze(&self, window: &AnalysisWindow) -> Result<GeographicBiasAnalysis> {
        info!(
            source = %self.source.id(),
            days_back = window.days_back(),
            "Analyzing geographic bias"
        );

        let rows = match self.source.load_geographic_dataset(window).await {
            Ok(rows) => rows,
            Err(DataSourceError::DataUnavailable { dataset, cutoff }) => {
                warn!(dataset, %cutoff, "No geographic data in window");
                return Ok(GeographicBiasAnalysis::no_data(window.days_back()));
            }
            Err(e) => return Err(e.into()),
        };

        let analysis = self.evaluate(window.days_back(), &rows);

        info!(
            total_locations = analysis.total_locations,
            findings = analysis.recommendations.len(),
            "Geographic bias analysis complete"
        );

        Ok(analysis)
    }

    /// Analyze already-loaded rows.
    pub fn evaluate(&self, analysis_period_days: u32, rows: &[GeographicRow]) -> GeographicBiasAnalysis {
        if rows.is_empty() {
            return GeographicBiasAnalysis::no_data(analysis_period_days);
        }

        let settings = &self.config.geographic;
        let patterns = geographic_patterns(rows, settings);
        let disparities = access_disparities(rows, settings);
        let recommendations = findings::geographic_findings(&disparities);

        GeographicBiasAnalysis {
            status: AnalysisStatus::Completed,
            analysis_period_days,
            total_locations: rows.len(),
            geographic_patterns: Some(patterns),
            access_disparities: Some(disparities),
            recommendations,
        }
    }
}

fn access_share(rows: &[&GeographicRow]) -> f64 {
    let with_provider = rows.iter().filter(|r| r.has_mental_health_provider).count();
    with_provider as f64 / rows.len() as f64
}

fn centroid(rows: &[&GeographicRow]) -> Option<Coordinates> {
    let points: Vec<Coordinates> = rows.iter().filter_map(|r| r.coordinates).collect();
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Coordinates {
        latitude: points.iter().map(|p| p.latitude).sum::<f64>() / n,
        longitude: points.iter().map(|p| p.longitude).sum::<f64>() / n,
    })
}

fn geographic_patterns(rows: &[GeographicRow], settings: &GeographicConfig) -> GeographicPatterns {
    let mut by_region: BTreeMap<&str, Vec<&GeographicRow>> = BTreeMap::new();
    for row in rows {
        by_region.entry(&row.zip_code_prefix).or_default().push(row);
    }

    let regions: BTreeMap<String, RegionSummary> = by_region
        .iter()
        .map(|(region, members)| {
            let moods: Vec<f64> = members.iter().map(|r| r.avg_mood).collect();
            let summary = RegionSummary {
                user_count: members.len(),
                avg_mood: mean(&moods).unwrap_or(0.0),
                mood_entry_count: members.iter().map(|r| r.mood_entry_count).sum(),
                access_rate: access_share(members),
                centroid: centroid(members),
            };
            (region.to_string(), summary)
        })
        .collect();

    let low_mood_areas = regions
        .iter()
        .filter(|(_, s)| s.avg_mood < settings.low_mood_threshold)
        .map(|(region, _)| region.clone())
        .collect();
    let low_access_areas = regions
        .iter()
        .filter(|(_, s)| s.access_rate < settings.low_access_threshold)
        .map(|(region, _)| region.clone())
        .collect();

    let moods: Vec<f64> = rows.iter().map(|r| r.avg_mood).collect();
    let mood_range = MoodRange {
        min: moods.iter().copied().fold(f64::INFINITY, f64::min),
        max: moods.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std: sample_std(&moods),
    };

    debug!(regions = regions.len(), "Geographic patterns computed");

    GeographicPatterns {
        regions,
        low_mood_areas,
        low_access_areas,
        mood_range,
    }
}

fn access_disparities(rows: &[GeographicRow], settings: &GeographicConfig) -> AccessDisparities {
    let mut cells: BTreeMap<&str, BTreeMap<&str, Vec<&GeographicRow>>> = BTreeMap::new();
    for row in rows {
        cells
            .entry(&row.race_ethnicity)
            .or_default()
            .entry(&row.zip_code_prefix)
            .or_default()
            .push(row);
    }

    let access_by_group_and_region: BTreeMap<String, BTreeMap<String, f64>> = cells
        .iter()
        .map(|(group, regions)| {
            let rates = regions
                .iter()
                .map(|(region, members)| (region.to_string(), access_share(members)))
                .collect();
            (group.to_string(), rates)
        })
        .collect();

    let access_rates_by_group: BTreeMap<String, f64> = access_by_group_and_region
        .iter()
        .map(|(group, regions)| {
            let rates: Vec<f64> = regions.values().copied().collect();
            (group.clone(), mean(&rates).unwrap_or(0.0))
        })
        .collect();

    let highest = access_rates_by_group
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1));
    let lowest = access_rates_by_group
        .iter()
        .min_by(|a, b| a.1.total_cmp(b.1));

    let access_gap = match (highest, lowest) {
        (Some((high, &max_rate)), Some((low, &min_rate))) => {
            let gap = max_rate - min_rate;
            AccessGap {
                max_rate,
                min_rate,
                gap,
                highest_group: Some(high.clone()),
                lowest_group: Some(low.clone()),
                significant_disparity: gap > settings.access_gap_threshold,
            }
        }
        _ => AccessGap {
            max_rate: 0.0,
            min_rate: 0.0,
            gap: 0.0,
            highest_group: None,
            lowest_group: None,
            significant_disparity: false,
        },
    };

    AccessDisparities {
        access_rates_by_group,
        access_by_group_and_region,
        access_gap,
    }
}
