//! Fairness Metrics - stateless statistics for bias auditing
//!
//! Pure functions over slices of analysis rows. Every function takes one or
//! more key extractors (the "grouping column") so callers can audit any
//! categorical attribute without this crate knowing the row type:
//!
//! - **Demographic parity**: share of records per group, max spread
//! - **Equalized odds**: success rate per group, max spread
//! - **Calibration**: binned confidence vs. observed outcome, Pearson test
//! - **Disparate impact**: ratio of a group's rate to a reference rate (80% rule)
//! - **Chi-square**: goodness-of-fit of category counts against uniform
//!
//! Statistical edge cases (single group, small samples, zero denominators)
//! never panic or produce NaN: they are encoded in the result's
//! [`MetricStatus`] tag.
//!
//! # Example
//!
//! ```
//! use fairness_metrics::demographic_parity;
//!
//! let groups = ["a", "a", "b", "b"];
//! let result = demographic_parity(&groups, |g| *g, 0.1);
//! assert_eq!(result.max_difference, 0.0);
//! assert!(!result.biased);
//! ```

pub mod calibration;
pub mod impact;
pub mod parity;
pub mod stats;
pub mod types;

pub use calibration::{calibration, CalibrationParams};
pub use impact::{chi_square_independence, chi_square_test, disparate_impact_ratio};
pub use parity::{demographic_parity, equalized_odds, group_counts, group_rates};
pub use types::*;
