//! Error types for the ethflows ingestion and derivation layers.
//!
//! - [`IngestionError`] - a single table could not be loaded (fatal for that table only)
//! - [`ContractViolation`] - a structurally invalid table or series was passed between components
//! - [`ConfigError`] - dashboard configuration could not be loaded or is inconsistent
//!
//! Data-quality gaps are not errors: derivations report them as
//! [`crate::metrics::Outcome::Unavailable`] values and [`crate::notices::Notice`]s.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::ColumnKind;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while turning a delimited text source into a table.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Failed to read the source file.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes could not be decoded as text.
    #[error("Unrecognized text encoding: {0}")]
    EncodingUnrecognized(String),

    /// No candidate delimiter produced a consistent column count.
    #[error("Could not infer a delimiter from {sampled_rows} sampled rows")]
    DelimiterAmbiguous { sampled_rows: usize },

    /// The source has no header row.
    #[error("No header row found")]
    HeaderMissing,

    /// The CSV reader rejected the content.
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The parsed columns could not form a consistent table.
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

impl IngestionError {
    /// True when the source file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IngestionError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

// =============================================================================
// Contract Violations
// =============================================================================

/// A programming error: a component received a table or series of the wrong shape.
#[derive(Debug, Error, PartialEq)]
pub enum ContractViolation {
    /// Columns of one table disagree on row count.
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Two columns share a name.
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    /// A column was read as a type it cannot represent.
    #[error("Column '{column}' is a {actual:?} column and cannot be read as {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        actual: ColumnKind,
    },

    /// Two series that must be aligned position by position differ in length.
    #[error("Series lengths differ: {left} vs {right}")]
    SeriesLength { left: usize, right: usize },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading or checking a [`crate::config::DashboardConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or does not deserialize.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration does not match the embedded schema.
    #[error("Config does not match schema: {errors:?}")]
    Schema { errors: Vec<String> },

    /// Cohort bands are empty, unordered or unbounded in the middle.
    #[error("Invalid cohort scheme '{scheme}': {message}")]
    InvalidCohortScheme { scheme: String, message: String },

    /// A category pattern is not a valid regular expression.
    #[error("Invalid category pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Result type for operations that may detect a contract violation.
pub type ContractResult<T> = Result<T, ContractViolation>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
