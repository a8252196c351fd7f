//! Cell normalization and column typing.

use once_cell::sync::Lazy;
use regex::Regex;

use super::dates::parse_timestamp;
use crate::models::{Column, BILLIONS_SUFFIX, MONTH};

/// Cell values read as null, matching what spreadsheet and pandas exports emit.
pub const NULL_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

static GROUPED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("regex is valid"));

/// Trimmed cell value, or `None` for null tokens.
pub fn clean_cell(raw: &str) -> Option<&str> {
    let value = raw.trim();
    if NULL_TOKENS.contains(&value) {
        None
    } else {
        Some(value)
    }
}

/// Parse a numeric cell. Accepts `1,234.5` grouping; non-finite values are null.
pub fn parse_number(raw: &str) -> Option<f64> {
    let value = clean_cell(raw)?;
    let parsed = match value.parse::<f64>() {
        Ok(n) => Some(n),
        Err(_) => {
            if GROUPED_NUMBER.is_match(value) {
                value.replace(',', "").parse::<f64>().ok()
            } else {
                None
            }
        }
    };
    parsed.filter(|n| n.is_finite())
}

/// Outcome of typing one raw column.
#[derive(Debug)]
pub(crate) struct TypedColumn {
    pub column: Column,
    /// Non-null cells that failed to parse as the column's type.
    pub unparseable: usize,
}

/// Assign a semantic type to a raw column.
///
/// `MONTH` becomes timestamps and `_BILLIONS` columns become scaled numbers
/// regardless of content. Names listed in `category_columns` become
/// categories. Remaining columns are numeric when every non-null cell parses.
pub(crate) fn type_column(name: &str, raw: &[Option<String>], category_columns: &[String]) -> TypedColumn {
    let cells: Vec<Option<&str>> = raw.iter().map(|c| c.as_deref().and_then(clean_cell)).collect();
    let present = cells.iter().filter(|c| c.is_some()).count();

    if name == MONTH {
        let parsed: Vec<_> = cells.iter().map(|c| c.and_then(parse_timestamp)).collect();
        let unparseable = present - parsed.iter().filter(|t| t.is_some()).count();
        return TypedColumn { column: Column::Timestamp(parsed), unparseable };
    }

    if name.to_ascii_uppercase().ends_with(BILLIONS_SUFFIX) {
        let parsed: Vec<_> = cells.iter().map(|c| c.and_then(parse_number)).collect();
        let unparseable = present - parsed.iter().filter(|n| n.is_some()).count();
        return TypedColumn { column: Column::ScaledNumeric(parsed), unparseable };
    }

    let owned = || cells.iter().map(|c| c.map(str::to_string)).collect::<Vec<_>>();

    if category_columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        return TypedColumn { column: Column::Category(owned()), unparseable: 0 };
    }

    let numbers: Vec<_> = cells.iter().map(|c| c.and_then(parse_number)).collect();
    let numeric_count = numbers.iter().filter(|n| n.is_some()).count();
    if present > 0 && numeric_count == present {
        TypedColumn { column: Column::Numeric(numbers), unparseable: 0 }
    } else {
        TypedColumn { column: Column::Text(owned()), unparseable: 0 }
    }
}
