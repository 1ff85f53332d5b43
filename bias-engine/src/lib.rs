//! Bias Engine - fairness auditing for recommendation outputs
//!
//! Audits a mental-health recommendation system for demographic and
//! geographic disparities:
//!
//! - **Recommendation bias**: parity, equalized odds, calibration and
//!   chi-square tests per resource type, plus representation parity and
//!   disparate impact across the whole window
//! - **Geographic bias**: mood and provider-access disparities by region
//! - **Real-time scoring**: a single recommendation checked against
//!   historical cohort baselines at serving time
//! - **Reports**: both analyses over one window with prioritized actions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  BiasDetectionEngine                     │
//! │                                                          │
//! │  ┌────────────────┐ ┌────────────┐ ┌────────────────┐    │
//! │  │ Recommendation │ │ Geographic │ │ RealtimeScorer │    │
//! │  │    Analyzer    │ │  Analyzer  │ │                │    │
//! │  └───────┬────────┘ └─────┬──────┘ └───────┬────────┘    │
//! │          └────────┬───────┘                │             │
//! │           ┌───────▼────────┐               │             │
//! │           │ReportGenerator │               │             │
//! │           └────────────────┘               │             │
//! │                 ┌──────────────────────────▼──┐          │
//! │                 │   DataSource (read-only)    │          │
//! │                 └─────────────────────────────┘          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod engine;
pub mod report;
pub mod types;

// Re-export main types
pub use analysis::{RealtimeBiasResult, RecommendationCandidate};
pub use config::BiasConfig;
pub use data::{DataSource, DataSourceError, DatasetSnapshot, InMemoryDataSource};
pub use engine::{BiasDetectionEngine, BiasEngineBuilder};
pub use report::{BiasReport, ReportGenerator};
pub use types::*;
