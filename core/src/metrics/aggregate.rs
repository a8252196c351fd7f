//! Monthly aggregation and share computation.
//!
//! # Architecture
//!
//! ```text
//! NormalizedTable (long rows)        →  MonthlyAggregate           →  ShareTable
//! ┌──────────────────────────────┐     ┌─────────────────────────┐    ┌──────────────────────┐
//! │ 2024-08 │ DEX     │ 12.5     │     │ 2024-08 │ DEX     20.0  │    │ 2024-08 │ DEX  0.625 │
//! │ 2024-08 │ DEX     │  7.5     │  →  │ 2024-08 │ Lending 12.0  │ →  │ 2024-08 │ Lend 0.375 │
//! │ 2024-08 │ Lending │ 12.0     │     ├─────────────────────────┤    └──────────────────────┘
//! │ N/A     │ DEX     │  3.0     │     │ coverage: 1 of 4 excluded│
//! └──────────────────────────────┘     └─────────────────────────┘
//! ```
//!
//! Rows with a null month, category or value never reach a sum; they are
//! counted in [`Coverage`] instead.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::outcome::Outcome;
use crate::error::ContractResult;
use crate::models::{LongFormRow, MonthKey, NormalizedTable, SeriesRow, MONTH};
use crate::notices::{Notice, NoticeKind};

/// How many rows an aggregation had to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub total_rows: usize,
    pub excluded_rows: usize,
}

impl Coverage {
    /// Fraction of rows excluded, 0 for an empty table.
    pub fn excluded_fraction(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.excluded_rows as f64 / self.total_rows as f64
        }
    }

    /// A `HighMissingness` notice when the excluded fraction exceeds `threshold`.
    pub fn notice(&self, threshold: f64, column: &str) -> Option<Notice> {
        let fraction = self.excluded_fraction();
        (fraction > threshold).then(|| {
            Notice::warning(
                NoticeKind::HighMissingness,
                format!(
                    "{} of {} rows ({:.1}%) were excluded from '{}' for missing values",
                    self.excluded_rows,
                    self.total_rows,
                    fraction * 100.0,
                    column
                ),
            )
        })
    }
}

pub(crate) fn missing_column<T>(name: &str) -> Outcome<T> {
    Outcome::unavailable(
        NoticeKind::MissingRequiredColumn,
        format!("column '{}' is missing", name),
    )
}

// =============================================================================
// Per-category sums
// =============================================================================

/// Sums keyed by (month, category).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyAggregate {
    pub value_column: String,
    pub sums: BTreeMap<MonthKey, BTreeMap<String, f64>>,
    pub coverage: Coverage,
}

impl MonthlyAggregate {
    /// Every category seen in any month.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.sums.values().flat_map(|m| m.keys().map(String::as_str)).collect()
    }

    /// Sum of all categories per month.
    pub fn totals(&self) -> BTreeMap<MonthKey, f64> {
        self.sums
            .iter()
            .map(|(month, cats)| (*month, cats.values().sum()))
            .collect()
    }

    pub fn latest_month(&self) -> Option<MonthKey> {
        self.sums.keys().next_back().copied()
    }

    /// One row per (month, category) that has data.
    pub fn long_form(&self) -> Vec<LongFormRow> {
        self.sums
            .iter()
            .flat_map(|(month, cats)| {
                cats.iter().map(move |(category, value)| LongFormRow {
                    month: *month,
                    category: category.clone(),
                    value: Some(*value),
                })
            })
            .collect()
    }

    /// One row per (month, category) for every category, absent cells as 0.
    pub fn dense_long_form(&self) -> Vec<LongFormRow> {
        let categories = self.categories();
        let mut rows = Vec::with_capacity(self.sums.len() * categories.len());
        for (month, cats) in &self.sums {
            for category in &categories {
                rows.push(LongFormRow {
                    month: *month,
                    category: category.to_string(),
                    value: Some(cats.get(*category).copied().unwrap_or(0.0)),
                });
            }
        }
        rows
    }

    /// Per-category lines as series rows.
    pub fn series_rows(&self) -> Vec<SeriesRow> {
        self.long_form()
            .into_iter()
            .map(|r| SeriesRow {
                month: r.month,
                series: r.category,
                value: r.value,
            })
            .collect()
    }
}

/// Group rows by (month, category) and sum `value`.
///
/// Rows with a null month, category or value are excluded and counted in
/// the result's [`Coverage`].
pub fn monthly_category_sums(
    table: &NormalizedTable,
    category: &str,
    value: &str,
) -> ContractResult<Outcome<MonthlyAggregate>> {
    if table.months().is_none() {
        return Ok(missing_column(MONTH));
    }
    let Some(labels) = table.labels(category)? else {
        return Ok(missing_column(category));
    };
    let Some(values) = table.numbers(value)? else {
        return Ok(missing_column(value));
    };
    let months = table.month_keys();

    let mut sums: BTreeMap<MonthKey, BTreeMap<String, f64>> = BTreeMap::new();
    let mut excluded_rows = 0;
    for ((month, label), amount) in months.iter().zip(labels.iter()).zip(values.iter()) {
        match (month, label, amount) {
            (Some(month), Some(label), Some(amount)) => {
                *sums.entry(*month).or_default().entry(label.clone()).or_insert(0.0) += amount;
            }
            _ => excluded_rows += 1,
        }
    }

    Ok(Outcome::Available(MonthlyAggregate {
        value_column: value.to_string(),
        sums,
        coverage: Coverage {
            total_rows: table.row_count(),
            excluded_rows,
        },
    }))
}

// =============================================================================
// Single series
// =============================================================================

/// A per-month series of one value column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySeries {
    pub name: String,
    pub points: BTreeMap<MonthKey, f64>,
    pub coverage: Coverage,
}

impl MonthlySeries {
    /// Points in month order.
    pub fn values(&self) -> Vec<(MonthKey, f64)> {
        self.points.iter().map(|(m, v)| (*m, *v)).collect()
    }

    pub fn series_rows(&self) -> Vec<SeriesRow> {
        self.points
            .iter()
            .map(|(month, value)| SeriesRow {
                month: *month,
                series: self.name.clone(),
                value: Some(*value),
            })
            .collect()
    }

    /// The same points under another series name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every point multiplied by `factor`.
    pub fn scaled(mut self, factor: f64) -> Self {
        for value in self.points.values_mut() {
            *value *= factor;
        }
        self
    }
}

/// How rows falling in the same month are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthReducer {
    Sum,
    Mean,
}

fn reduce_by_month(
    table: &NormalizedTable,
    value: &str,
    reducer: MonthReducer,
) -> ContractResult<Outcome<MonthlySeries>> {
    if table.months().is_none() {
        return Ok(missing_column(MONTH));
    }
    let Some(values) = table.numbers(value)? else {
        return Ok(missing_column(value));
    };

    let mut buckets: BTreeMap<MonthKey, (f64, usize)> = BTreeMap::new();
    let mut excluded_rows = 0;
    for (month, amount) in table.month_keys().iter().zip(values.iter()) {
        match (month, amount) {
            (Some(month), Some(amount)) => {
                let bucket = buckets.entry(*month).or_insert((0.0, 0));
                bucket.0 += amount;
                bucket.1 += 1;
            }
            _ => excluded_rows += 1,
        }
    }

    let points = buckets
        .into_iter()
        .map(|(month, (total, count))| match reducer {
            MonthReducer::Sum => (month, total),
            MonthReducer::Mean => (month, total / count as f64),
        })
        .collect();

    Ok(Outcome::Available(MonthlySeries {
        name: value.to_string(),
        points,
        coverage: Coverage {
            total_rows: table.row_count(),
            excluded_rows,
        },
    }))
}

/// Sum `value` per month. For additive columns (volumes, counts).
pub fn monthly_series(table: &NormalizedTable, value: &str) -> ContractResult<Outcome<MonthlySeries>> {
    reduce_by_month(table, value, MonthReducer::Sum)
}

/// Mean of `value` per month. For columns that are already averages or ratios.
pub fn monthly_mean(table: &NormalizedTable, value: &str) -> ContractResult<Outcome<MonthlySeries>> {
    reduce_by_month(table, value, MonthReducer::Mean)
}

// =============================================================================
// Shares
// =============================================================================

/// Per-month category shares of the monthly total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTable {
    /// `None` for every category in a month whose total is zero or not finite.
    pub shares: BTreeMap<MonthKey, BTreeMap<String, Option<f64>>>,
    pub zero_total_months: Vec<MonthKey>,
}

impl ShareTable {
    pub fn month(&self, month: MonthKey) -> Option<&BTreeMap<String, Option<f64>>> {
        self.shares.get(&month)
    }

    pub fn long_form(&self) -> Vec<LongFormRow> {
        self.shares
            .iter()
            .flat_map(|(month, cats)| {
                cats.iter().map(move |(category, share)| LongFormRow {
                    month: *month,
                    category: category.clone(),
                    value: *share,
                })
            })
            .collect()
    }

    /// One `ZeroTotalMonth` notice per affected month.
    pub fn notices(&self) -> Vec<Notice> {
        self.zero_total_months
            .iter()
            .map(|month| {
                Notice::warning(
                    NoticeKind::ZeroTotalMonth,
                    format!("Total for {} is zero; shares are unavailable for that month", month),
                )
            })
            .collect()
    }
}

/// Each category's share of its month's total.
///
/// Categories seen in other months but absent in this one contribute 0.
pub fn category_shares(aggregate: &MonthlyAggregate) -> ShareTable {
    let categories = aggregate.categories();
    let mut shares = BTreeMap::new();
    let mut zero_total_months = Vec::new();

    for (month, cats) in &aggregate.sums {
        let total: f64 = cats.values().sum();
        let usable = total != 0.0 && total.is_finite();
        if !usable {
            zero_total_months.push(*month);
        }
        let row: BTreeMap<String, Option<f64>> = categories
            .iter()
            .map(|category| {
                let share = usable.then(|| cats.get(*category).copied().unwrap_or(0.0) / total);
                (category.to_string(), share)
            })
            .collect();
        shares.insert(*month, row);
    }

    ShareTable {
        shares,
        zero_total_months,
    }
}
