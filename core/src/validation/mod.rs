//! Column requirements and JSON Schema validation.
//!
//! # Column requirements
//!
//! Each dashboard section declares the columns it needs through
//! [`ColumnRequirements`]. Resolving against a table yields either the table
//! (with all-null placeholders for absent optional columns) or an
//! [`Outcome::Unavailable`] naming the missing required columns.
//!
//! ```rust,ignore
//! use ethflows::validation::ColumnRequirements;
//! use ethflows::models::ColumnKind;
//!
//! let needs = ColumnRequirements::new()
//!     .require_all(&["MONTH", "TOTAL_BRIDGE_VOLUME_BILLIONS"])
//!     .optional("INFLOW_VOLUME_BILLIONS", ColumnKind::ScaledNumeric);
//! let resolved = needs.resolve(&table)?;
//! ```
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory:
//! - `dashboard-config.json` - shape of a [`crate::config::DashboardConfig`] file

use std::borrow::Cow;

use serde_json::Value;

use crate::error::{ConfigError, ConfigResult, ContractResult};
use crate::metrics::Outcome;
use crate::models::{Column, ColumnKind, NormalizedTable};
use crate::notices::{Notice, NoticeKind};

const CONFIG_SCHEMA: &str = include_str!("../../schemas/dashboard-config.json");

// =============================================================================
// Column requirements
// =============================================================================

/// Columns a derivation needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRequirements {
    required: Vec<String>,
    optional: Vec<(String, ColumnKind)>,
}

/// A table that satisfies a [`ColumnRequirements`].
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    /// Borrowed when nothing was added, owned when placeholders were added.
    pub table: Cow<'a, NormalizedTable>,
    /// Optional columns that were absent and filled with nulls.
    pub placeholders: Vec<String>,
    pub notices: Vec<Notice>,
}

impl ColumnRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn require_all(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// An optional column, replaced by an all-null column of `kind` when absent.
    pub fn optional(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.optional.push((name.into(), kind));
        self
    }

    /// Required columns absent from `table`.
    pub fn missing<'r>(&'r self, table: &NormalizedTable) -> Vec<&'r str> {
        self.required
            .iter()
            .filter(|name| !table.has_column(name))
            .map(String::as_str)
            .collect()
    }

    /// Check `table` against the requirements.
    ///
    /// The input table is never modified; placeholders go on a copy.
    pub fn resolve<'a>(&self, table: &'a NormalizedTable) -> ContractResult<Outcome<Resolved<'a>>> {
        let missing = self.missing(table);
        if !missing.is_empty() {
            return Ok(Outcome::unavailable(
                NoticeKind::MissingRequiredColumn,
                format!("missing required columns: {}", missing.join(", ")),
            ));
        }

        let mut resolved = Resolved {
            table: Cow::Borrowed(table),
            placeholders: Vec::new(),
            notices: Vec::new(),
        };
        for (name, kind) in &self.optional {
            if resolved.table.has_column(name) {
                continue;
            }
            let extended = resolved
                .table
                .with_column(name.clone(), Column::placeholder(*kind, table.row_count()))?;
            resolved.table = Cow::Owned(extended);
            resolved.placeholders.push(name.clone());
            resolved.notices.push(Notice::warning(
                NoticeKind::MissingOptionalColumn,
                format!("optional column '{}' is missing; treated as empty", name),
            ));
        }
        Ok(Outcome::Available(resolved))
    }
}

// =============================================================================
// JSON Schema
// =============================================================================

/// Validate a JSON value against a JSON schema (Draft 7).
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error if invalid
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Simpler variant: just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// The embedded dashboard configuration schema.
pub fn config_schema() -> ConfigResult<Value> {
    Ok(serde_json::from_str(CONFIG_SCHEMA)?)
}

/// Validate a raw configuration document against the embedded schema.
pub fn validate_config(data: &Value) -> ConfigResult<()> {
    validate(&config_schema()?, data).map_err(|errors| ConfigError::Schema { errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ingest_bytes, IngestOptions};
    use serde_json::json;

    fn bridges() -> NormalizedTable {
        ingest_bytes(
            b"MONTH,TOTAL_BRIDGE_VOLUME_BILLIONS\n2024-01,1.5\n2024-02,2.5\n",
            &IngestOptions::default(),
        )
        .unwrap()
        .table
    }

    #[test]
    fn test_missing_optional_column_gets_placeholder() {
        let table = bridges();
        let needs = ColumnRequirements::new()
            .require_all(&["MONTH", "TOTAL_BRIDGE_VOLUME_BILLIONS"])
            .optional("BRIDGE_VOLUME", ColumnKind::Numeric);

        let resolved = needs.resolve(&table).unwrap().into_value().unwrap();
        assert_eq!(resolved.placeholders, vec!["BRIDGE_VOLUME".to_string()]);
        assert_eq!(resolved.notices.len(), 1);
        assert_eq!(resolved.notices[0].kind, NoticeKind::MissingOptionalColumn);

        let column = resolved.table.column("BRIDGE_VOLUME").unwrap();
        assert_eq!(column.kind(), ColumnKind::Numeric);
        assert_eq!(column.null_count(), 2);

        assert!(!table.has_column("BRIDGE_VOLUME"));
    }

    #[test]
    fn test_present_optional_borrows_table() {
        let table = bridges();
        let needs = ColumnRequirements::new().optional("TOTAL_BRIDGE_VOLUME_BILLIONS", ColumnKind::ScaledNumeric);
        let resolved = needs.resolve(&table).unwrap().into_value().unwrap();
        assert!(matches!(resolved.table, Cow::Borrowed(_)));
        assert!(resolved.notices.is_empty());
    }

    #[test]
    fn test_missing_required_is_unavailable() {
        let table = bridges();
        let needs = ColumnRequirements::new().require_all(&["MONTH", "INFLOW", "OUTFLOW"]);
        assert_eq!(needs.missing(&table), vec!["INFLOW", "OUTFLOW"]);
        match needs.resolve(&table).unwrap() {
            Outcome::Unavailable(u) => {
                assert_eq!(u.kind, NoticeKind::MissingRequiredColumn);
                assert_eq!(u.reason, "missing required columns: INFLOW, OUTFLOW");
            }
            Outcome::Available(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(is_valid(&schema, &json!({ "name": "x" })));
    }

    #[test]
    fn test_config_schema_accepts_partial_config() {
        let config = json!({
            "data_dir": "data",
            "missingness_threshold": 0.3,
            "patterns": { "dominance": "uniswap|dex" },
            "volume_cohorts": {
                "name": "volume",
                "bands": [{ "name": "Retail", "upper": 10000 }, { "name": "Whale", "upper": null }]
            }
        });
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_config_schema_rejects_malformed_bands() {
        let empty_bands = json!({ "typology": { "name": "typology", "bands": [] } });
        assert!(matches!(validate_config(&empty_bands), Err(ConfigError::Schema { .. })));

        let bad_upper = json!({ "typology": { "name": "t", "bands": [{ "name": "A", "upper": "one" }] } });
        assert!(validate_config(&bad_upper).is_err());

        let unknown_key = json!({ "theme": "dark" });
        assert!(validate_config(&unknown_key).is_err());

        let threshold = json!({ "missingness_threshold": 1.5 });
        assert!(validate_config(&threshold).is_err());
    }
}
