//! Metric derivation layer.
//!
//! Pure functions from [`crate::models::NormalizedTable`]s to display-ready
//! aggregates. Inputs are never mutated and every call recomputes from
//! scratch, so the same input always yields bit-identical output.
//!
//! - [`aggregate`] - monthly (category) sums, coverage, shares
//! - [`cohort`] - volume cohorts and typology buckets
//! - [`correlation`] - Pearson r, OLS trendline, scatter rows
//! - [`summary`] - scalar KPIs (peak, growth, dominance share, ...)
//!
//! Data gaps come back as [`Outcome::Unavailable`]; only structural misuse
//! is a [`crate::error::ContractViolation`].

pub mod aggregate;
pub mod cohort;
pub mod correlation;
mod outcome;
pub mod summary;

pub use aggregate::{
    category_shares, monthly_category_sums, monthly_mean, monthly_series, Coverage, MonthlyAggregate, MonthlySeries, ShareTable,
};
pub use cohort::{classify_by_breadth, classify_by_volume, CohortBand, CohortBucket, CohortDistribution, CohortScheme};
pub use correlation::{
    align_by_month, correlate, correlate_columns, scatter_points, CorrelationResult, Trendline, MIN_ALIGNED_POINTS,
};
pub use outcome::{Outcome, Unavailable};
pub use summary::{
    group_mean_ratio, growth_since_start, latest_matching_share, latest_matching_sum, latest_ratio, peak,
    top_category_latest, value_range, Peak, TopCategory, ValueRange,
};
