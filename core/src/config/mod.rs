//! Dashboard configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Loading goes: read file → JSON Schema check →
//! deserialize → semantic [`DashboardConfig::validate`].
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `ETHFLOWS_CONFIG` | Path of a JSON config file to load |
//! | `ETHFLOWS_DATA_DIR` | Overrides `data_dir` |
//!
//! A `.env` file in the working directory is loaded first.

use std::env;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::metrics::CohortScheme;
use crate::parser::IngestOptions;
use crate::validation::validate_config;

pub const CONFIG_ENV: &str = "ETHFLOWS_CONFIG";
pub const DATA_DIR_ENV: &str = "ETHFLOWS_DATA_DIR";

// =============================================================================
// Category patterns
// =============================================================================

/// Case-insensitive patterns matched against category labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPatterns {
    /// Categories counted towards the dominance share (DEX by default).
    pub dominance: String,
    pub whale: String,
    pub multi_sector: String,
    pub single_sector: String,
}

impl Default for CategoryPatterns {
    fn default() -> Self {
        Self {
            dominance: "dex".into(),
            whale: "whale".into(),
            multi_sector: "multi".into(),
            single_sector: "single".into(),
        }
    }
}

/// [`CategoryPatterns`] compiled to regexes.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub dominance: Regex,
    pub whale: Regex,
    pub multi_sector: Regex,
    pub single_sector: Regex,
}

fn compile_pattern(pattern: &str) -> ConfigResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

impl CategoryPatterns {
    pub fn compile(&self) -> ConfigResult<CompiledPatterns> {
        Ok(CompiledPatterns {
            dominance: compile_pattern(&self.dominance)?,
            whale: compile_pattern(&self.whale)?,
            multi_sector: compile_pattern(&self.multi_sector)?,
            single_sector: compile_pattern(&self.single_sector)?,
        })
    }
}

// =============================================================================
// Dataset files
// =============================================================================

/// File name of each dataset, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetFiles {
    pub volume_category: String,
    pub active_addresses: String,
    pub user_cohort: String,
    pub user_typology: String,
    pub dex_volume: String,
    pub lending_deposits: String,
    pub bridged_volume: String,
    pub eth_price: String,
    pub fees_activity: String,
    pub fees_price: String,
    pub user_activity: String,
}

impl Default for DatasetFiles {
    fn default() -> Self {
        Self {
            volume_category: "volume_category.csv".into(),
            active_addresses: "active_addresses.csv".into(),
            user_cohort: "user_cohort.csv".into(),
            user_typology: "user_typology.csv".into(),
            dex_volume: "dex_volume.csv".into(),
            lending_deposits: "lending_deposits.csv".into(),
            bridged_volume: "bridged_volume.csv".into(),
            eth_price: "eth_price.csv".into(),
            fees_activity: "fees_activity.csv".into(),
            fees_price: "fees_price.csv".into(),
            user_activity: "user_activity.csv".into(),
        }
    }
}

// =============================================================================
// Dashboard configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub data_dir: PathBuf,
    /// Excluded-row fraction above which a `HighMissingness` notice is raised.
    pub missingness_threshold: f64,
    /// Growth fraction above which bridge activity counts as emerging.
    pub emerging_growth_threshold: f64,
    pub patterns: CategoryPatterns,
    pub volume_cohorts: CohortScheme,
    pub typology: CohortScheme,
    pub ingest: IngestOptions,
    pub datasets: DatasetFiles,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            missingness_threshold: 0.2,
            emerging_growth_threshold: 0.5,
            patterns: CategoryPatterns::default(),
            volume_cohorts: CohortScheme::volume_default(),
            typology: CohortScheme::typology_default(),
            ingest: IngestOptions::default(),
            datasets: DatasetFiles::default(),
        }
    }
}

impl DashboardConfig {
    /// Parse and check a JSON configuration document.
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        validate_config(&value)?;
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from the process environment (after reading `.env`).
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` to resolve environment variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("{} not set, using defaults", CONFIG_ENV);
                Self::default()
            }
        };
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Semantic checks the schema cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.missingness_threshold) {
            return Err(ConfigError::Schema {
                errors: vec![format!(
                    "missingness_threshold {} is outside [0, 1]",
                    self.missingness_threshold
                )],
            });
        }
        if !self.emerging_growth_threshold.is_finite() {
            return Err(ConfigError::Schema {
                errors: vec!["emerging_growth_threshold must be finite".into()],
            });
        }
        self.volume_cohorts.validate()?;
        self.typology.validate()?;
        self.patterns.compile()?;
        Ok(())
    }

    /// Full path of a dataset file.
    pub fn dataset_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CohortBand;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = DashboardConfig::from_json("{}").unwrap();
        assert_eq!(config, DashboardConfig::default());
        assert_eq!(config.missingness_threshold, 0.2);
        assert_eq!(config.datasets.fees_price, "fees_price.csv");
    }

    #[test]
    fn test_from_file_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "data_dir": "/srv/flows",
                "emerging_growth_threshold": 1.0,
                "typology": {{ "name": "typology", "bands": [
                    {{ "name": "Focused", "upper": 2 }},
                    {{ "name": "Broad" }}
                ]}}
            }}"#
        )
        .unwrap();

        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/flows"));
        assert_eq!(config.emerging_growth_threshold, 1.0);
        assert_eq!(config.typology.bands[1], CohortBand::new("Broad", None));
        assert_eq!(config.dataset_path("x.csv"), PathBuf::from("/srv/flows/x.csv"));
    }

    #[test]
    fn test_schema_violation_is_reported() {
        let err = DashboardConfig::from_json(r#"{ "ingest": { "sample_rows": 1 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Schema { .. }));
    }

    #[test]
    fn test_unordered_bands_rejected_after_schema() {
        let raw = r#"{ "volume_cohorts": { "name": "volume", "bands": [
            { "name": "Big", "upper": 100 }, { "name": "Small", "upper": 10 }, { "name": "Rest" }
        ]}}"#;
        let err = DashboardConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCohortScheme { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = DashboardConfig::from_json(r#"{ "patterns": { "whale": "(" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "("));
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let patterns = CategoryPatterns::default().compile().unwrap();
        assert!(patterns.dominance.is_match("Uniswap DEX"));
        assert!(patterns.multi_sector.is_match("MULTI-SECTOR"));
        assert!(!patterns.whale.is_match("Shrimp"));
    }

    #[test]
    fn test_lookup_overrides_data_dir() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "data_dir": "from-file" }}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let vars: HashMap<&str, String> = [(CONFIG_ENV, path), (DATA_DIR_ENV, "from-env".to_string())].into();
        let config = DashboardConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("from-env"));

        let defaults = DashboardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(defaults.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_missing_file() {
        let err = DashboardConfig::from_file("/nonexistent/ethflows.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
