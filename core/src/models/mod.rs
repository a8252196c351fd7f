//! Domain models shared by the ingestion and derivation layers.
//!
//! - [`NormalizedTable`] - typed, column-oriented table produced by the parser
//! - [`Column`] / [`ColumnKind`] - semantic column types
//! - [`MonthKey`] - calendar month bucket
//! - [`SourceInfo`] - what the parser detected about a source
//! - [`LongFormRow`], [`SeriesRow`], [`ScatterPoint`] - rows handed to the rendering layer

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

use crate::error::ContractViolation;

/// Canonical name of the time column.
pub const MONTH: &str = "MONTH";

/// Column-name suffix marking values already expressed in billions.
pub const BILLIONS_SUFFIX: &str = "_BILLIONS";

// =============================================================================
// Month buckets
// =============================================================================

/// A calendar month, the time bucket of every aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Bucket a timestamp into its calendar month.
    pub fn from_datetime(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// Columns
// =============================================================================

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Parsed `MONTH` values.
    Timestamp,
    /// `_BILLIONS`-suffixed values, already scaled.
    ScaledNumeric,
    /// Raw numeric values (USD, counts, indices).
    Numeric,
    /// Category labels (CATEGORY, COHORT, PLATFORM, ...).
    Category,
    /// Free text.
    Text,
}

/// A typed column. Every variant holds one optional value per row.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Timestamp(Vec<Option<NaiveDateTime>>),
    ScaledNumeric(Vec<Option<f64>>),
    Numeric(Vec<Option<f64>>),
    Category(Vec<Option<String>>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// An all-null column of the given kind.
    pub fn placeholder(kind: ColumnKind, len: usize) -> Self {
        match kind {
            ColumnKind::Timestamp => Column::Timestamp(vec![None; len]),
            ColumnKind::ScaledNumeric => Column::ScaledNumeric(vec![None; len]),
            ColumnKind::Numeric => Column::Numeric(vec![None; len]),
            ColumnKind::Category => Column::Category(vec![None; len]),
            ColumnKind::Text => Column::Text(vec![None; len]),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Timestamp(_) => ColumnKind::Timestamp,
            Column::ScaledNumeric(_) => ColumnKind::ScaledNumeric,
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Category(_) => ColumnKind::Category,
            Column::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Timestamp(v) => v.len(),
            Column::ScaledNumeric(v) | Column::Numeric(v) => v.len(),
            Column::Category(v) | Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Timestamp(v) => v.get(row).map_or(true, Option::is_none),
            Column::ScaledNumeric(v) | Column::Numeric(v) => v.get(row).map_or(true, Option::is_none),
            Column::Category(v) | Column::Text(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// Timestamps, if this is a timestamp column.
    pub fn as_timestamps(&self) -> Option<&[Option<NaiveDateTime>]> {
        match self {
            Column::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    /// Values as numbers.
    ///
    /// Numeric columns are borrowed. Label columns are coerced, with
    /// unparseable values becoming null. Timestamps cannot be read as numbers.
    pub fn numbers(&self, name: &str) -> Result<Cow<'_, [Option<f64>]>, ContractViolation> {
        match self {
            Column::ScaledNumeric(v) | Column::Numeric(v) => Ok(Cow::Borrowed(v)),
            Column::Category(v) | Column::Text(v) => Ok(Cow::Owned(
                v.iter()
                    .map(|s| s.as_deref().and_then(crate::parser::parse_number))
                    .collect(),
            )),
            Column::Timestamp(_) => Err(ContractViolation::ColumnType {
                column: name.to_string(),
                expected: "numbers",
                actual: ColumnKind::Timestamp,
            }),
        }
    }

    /// Values as labels. Numbers are rendered with their shortest representation.
    pub fn labels(&self, name: &str) -> Result<Cow<'_, [Option<String>]>, ContractViolation> {
        match self {
            Column::Category(v) | Column::Text(v) => Ok(Cow::Borrowed(v)),
            Column::ScaledNumeric(v) | Column::Numeric(v) => {
                Ok(Cow::Owned(v.iter().map(|n| n.map(|n| n.to_string())).collect()))
            }
            Column::Timestamp(_) => Err(ContractViolation::ColumnType {
                column: name.to_string(),
                expected: "labels",
                actual: ColumnKind::Timestamp,
            }),
        }
    }

    /// Reorder rows by `order` (a permutation of row indices).
    pub(crate) fn permuted(&self, order: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            Column::Timestamp(v) => Column::Timestamp(pick(v, order)),
            Column::ScaledNumeric(v) => Column::ScaledNumeric(pick(v, order)),
            Column::Numeric(v) => Column::Numeric(pick(v, order)),
            Column::Category(v) => Column::Category(pick(v, order)),
            Column::Text(v) => Column::Text(pick(v, order)),
        }
    }
}

/// A column with its name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColumn {
    pub name: String,
    pub column: Column,
}

// =============================================================================
// Normalized table
// =============================================================================

/// Column-oriented table with known column semantics.
///
/// All columns have the same length and names are unique. Construction
/// through [`NormalizedTable::new`] enforces both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedTable {
    columns: Vec<NamedColumn>,
    row_count: usize,
}

impl NormalizedTable {
    pub fn new(columns: Vec<NamedColumn>) -> Result<Self, ContractViolation> {
        let row_count = columns.first().map_or(0, |c| c.column.len());
        for (i, named) in columns.iter().enumerate() {
            if named.column.len() != row_count {
                return Err(ContractViolation::LengthMismatch {
                    column: named.name.clone(),
                    expected: row_count,
                    actual: named.column.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == named.name) {
                return Err(ContractViolation::DuplicateColumn(named.name.clone()));
            }
        }
        Ok(Self { columns, row_count })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Column names in source order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[NamedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.column)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The parsed `MONTH` column, if present.
    pub fn months(&self) -> Option<&[Option<NaiveDateTime>]> {
        self.column(MONTH).and_then(Column::as_timestamps)
    }

    /// Month bucket of every row (`None` where the month is null or absent).
    pub fn month_keys(&self) -> Vec<Option<MonthKey>> {
        match self.months() {
            Some(ts) => ts.iter().map(|t| t.as_ref().map(MonthKey::from_datetime)).collect(),
            None => vec![None; self.row_count],
        }
    }

    /// Numeric values of a column, or `None` if the column is absent.
    pub fn numbers(&self, name: &str) -> Result<Option<Cow<'_, [Option<f64>]>>, ContractViolation> {
        self.column(name).map(|c| c.numbers(name)).transpose()
    }

    /// Label values of a column, or `None` if the column is absent.
    pub fn labels(&self, name: &str) -> Result<Option<Cow<'_, [Option<String>]>>, ContractViolation> {
        self.column(name).map(|c| c.labels(name)).transpose()
    }

    /// A copy of this table with one more column.
    pub fn with_column(&self, name: impl Into<String>, column: Column) -> Result<Self, ContractViolation> {
        let mut columns = self.columns.clone();
        columns.push(NamedColumn {
            name: name.into(),
            column,
        });
        Self::new(columns)
    }

    /// A copy of this table with columns renamed per `(from, to)` pairs.
    ///
    /// Pairs whose source column is absent are ignored.
    pub fn renamed(&self, renames: &[(&str, &str)]) -> Result<Self, ContractViolation> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let name = renames
                    .iter()
                    .find(|(from, _)| *from == c.name)
                    .map_or_else(|| c.name.clone(), |(_, to)| to.to_string());
                NamedColumn {
                    name,
                    column: c.column.clone(),
                }
            })
            .collect();
        Self::new(columns)
    }

    pub(crate) fn permuted(&self, order: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| NamedColumn {
                    name: c.name.clone(),
                    column: c.column.permuted(order),
                })
                .collect(),
            row_count: self.row_count,
        }
    }

    pub(crate) fn without_column(&self, name: &str) -> Self {
        Self {
            columns: self.columns.iter().filter(|c| c.name != name).cloned().collect(),
            row_count: self.row_count,
        }
    }
}

// =============================================================================
// Source metadata
// =============================================================================

/// What the parser detected about a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub encoding: String,
    pub had_bom: bool,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

// =============================================================================
// Rendering boundary
// =============================================================================

/// One (time, category, value) cell for stacked or area charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongFormRow {
    pub month: MonthKey,
    pub category: String,
    pub value: Option<f64>,
}

/// One (time, series, value) point for line or dual-axis charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    pub month: MonthKey,
    pub series: String,
    pub value: Option<f64>,
}

/// One (x, y, weight) observation for scatter + trendline charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}
