//! # ethflows - Ethereum capital-flows dashboard core
//!
//! Loads pre-exported on-chain metric tables (CSV) and derives the
//! display-ready aggregates behind a capital-flows and user-activity
//! dashboard: monthly category sums, shares, cohort distributions,
//! correlations and per-section KPIs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV File   │────▶│   Parser    │────▶│   Metrics   │────▶│  Dashboard  │
//! │ (, ; \t BOM)│     │ (auto-enc)  │     │   (pure)    │     │   Report    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │                   │
//!                            └──────── Notices ──┴───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ethflows::{render, DashboardConfig, RenderSession};
//!
//! let session = RenderSession::new(DashboardConfig::from_env()?)?;
//! let report = render(&session)?;
//! for section in &report.sections {
//!     println!("{}: available={}", section.title, section.outcome.is_available());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per boundary
//! - [`models`] - Normalized table, columns, render rows
//! - [`parser`] - CSV ingestion with encoding and delimiter detection
//! - [`validation`] - Column requirements and JSON Schema checks
//! - [`metrics`] - Aggregation, shares, cohorts, correlation, KPIs
//! - [`notices`] - Structured degraded-mode notices
//! - [`config`] - Dashboard configuration
//! - [`dashboard`] - Per-section render pass

// Core modules
pub mod error;
pub mod models;
pub mod notices;

// Ingestion
pub mod parser;

// Validation
pub mod validation;

// Derivation
pub mod metrics;

// Configuration
pub mod config;

// Rendering
pub mod dashboard;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ConfigResult,
    ContractResult,
    ContractViolation,
    IngestionError,
    IngestionResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Column,
    ColumnKind,
    LongFormRow,
    MonthKey,
    NamedColumn,
    NormalizedTable,
    ScatterPoint,
    SeriesRow,
    SourceInfo,
    MONTH,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    ingest_bytes,
    ingest_file,
    parse_timestamp,
    IngestOptions,
    Ingested,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate, validate_config, ColumnRequirements, Resolved};

// =============================================================================
// Re-exports - Metrics
// =============================================================================

pub use metrics::{
    category_shares,
    classify_by_breadth,
    classify_by_volume,
    correlate,
    monthly_category_sums,
    monthly_mean,
    monthly_series,
    CohortScheme,
    CorrelationResult,
    MonthlyAggregate,
    Outcome,
    ShareTable,
};

// =============================================================================
// Re-exports - Notices
// =============================================================================

pub use notices::{Notice, NoticeKind, Notices, Severity};

// =============================================================================
// Re-exports - Dashboard
// =============================================================================

pub use config::DashboardConfig;
pub use dashboard::{render, DashboardReport, RenderSession, Section, SectionData, SectionReport};
