//! Dashboard render pass.
//!
//! One synchronous, top-to-bottom pass per [`render`] call. For each section:
//!
//! ```text
//! load dataset(s) → check columns → derive → SectionReport { outcome, notices }
//! ```
//!
//! A section whose dataset is missing, unreadable or incomplete comes back
//! as [`Outcome::Unavailable`] with its notices; the other sections are
//! unaffected. Only a [`ContractViolation`] aborts the whole pass.
//!
//! All state lives in the [`RenderSession`]: configuration, compiled
//! category patterns and any uploaded buffers. Nothing is cached between
//! calls.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::config::{CompiledPatterns, DashboardConfig};
use crate::error::{ConfigResult, ContractResult, ContractViolation};
use crate::metrics::{Coverage, Outcome};
use crate::models::NormalizedTable;
use crate::notices::{Notice, NoticeKind, Notices};
use crate::parser::{ingest_bytes, ingest_file};
use crate::validation::ColumnRequirements;

/// Unwrap an [`Outcome`] inside a section builder, returning early when unavailable.
macro_rules! available {
    ($outcome:expr) => {
        match $outcome {
            $crate::metrics::Outcome::Available(value) => value,
            $crate::metrics::Outcome::Unavailable(reason) => {
                return Ok($crate::metrics::Outcome::Unavailable(reason));
            }
        }
    };
}

mod flows;
mod market;
mod users;

pub use flows::{ActivityByCategory, BridgeStatus, BridgeVolume, CategoryMetric, DexVolume, LendingDeposits, VolumeByCategory};
pub use market::{FeeAdoption, PriceActivity, PriceFee};
pub use users::{CohortMix, TypologyMix, UserClassification, UserMix};

// =============================================================================
// Sections
// =============================================================================

/// Dashboard panels, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    VolumeByCategory,
    ActivityByCategory,
    UserMix,
    DexVolume,
    LendingDeposits,
    BridgeVolume,
    PriceActivity,
    FeeAdoption,
    PriceFee,
    UserClassification,
}

impl Section {
    pub const ALL: [Section; 10] = [
        Section::VolumeByCategory,
        Section::ActivityByCategory,
        Section::UserMix,
        Section::DexVolume,
        Section::LendingDeposits,
        Section::BridgeVolume,
        Section::PriceActivity,
        Section::FeeAdoption,
        Section::PriceFee,
        Section::UserClassification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::VolumeByCategory => "volume_by_category",
            Section::ActivityByCategory => "activity_by_category",
            Section::UserMix => "user_mix",
            Section::DexVolume => "dex_volume",
            Section::LendingDeposits => "lending_deposits",
            Section::BridgeVolume => "bridge_volume",
            Section::PriceActivity => "price_activity",
            Section::FeeAdoption => "fee_adoption",
            Section::PriceFee => "price_fee",
            Section::UserClassification => "user_classification",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::VolumeByCategory => "Monthly On-Chain USD Volume by Category",
            Section::ActivityByCategory => "Monthly Active Addresses and Transactions by Category",
            Section::UserMix => "User Mix: Cohorts and Typology",
            Section::DexVolume => "DEX Volume and Active Swappers",
            Section::LendingDeposits => "Lending Deposits per Platform",
            Section::BridgeVolume => "Total Bridge Volume",
            Section::PriceActivity => "ETH Price Overlay with Total Activity",
            Section::FeeAdoption => "User Adoption During Fee Evolution",
            Section::PriceFee => "Price vs Fee Correlation",
            Section::UserClassification => "User Classification by Volume and Breadth",
        }
    }

    fn build(self, session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<SectionData>> {
        Ok(match self {
            Section::VolumeByCategory => flows::volume_by_category(session, notices)?.map(SectionData::VolumeByCategory),
            Section::ActivityByCategory => {
                flows::activity_by_category(session, notices)?.map(SectionData::ActivityByCategory)
            }
            Section::UserMix => users::user_mix(session, notices)?.map(SectionData::UserMix),
            Section::DexVolume => flows::dex_volume(session, notices)?.map(SectionData::DexVolume),
            Section::LendingDeposits => flows::lending_deposits(session, notices)?.map(SectionData::LendingDeposits),
            Section::BridgeVolume => flows::bridge_volume(session, notices)?.map(SectionData::BridgeVolume),
            Section::PriceActivity => market::price_activity(session, notices)?.map(SectionData::PriceActivity),
            Section::FeeAdoption => market::fee_adoption(session, notices)?.map(SectionData::FeeAdoption),
            Section::PriceFee => market::price_fee(session, notices)?.map(SectionData::PriceFee),
            Section::UserClassification => {
                users::user_classification(session, notices)?.map(SectionData::UserClassification)
            }
        })
    }
}

/// Derived content of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionData {
    VolumeByCategory(VolumeByCategory),
    ActivityByCategory(ActivityByCategory),
    UserMix(UserMix),
    DexVolume(DexVolume),
    LendingDeposits(LendingDeposits),
    BridgeVolume(BridgeVolume),
    PriceActivity(PriceActivity),
    FeeAdoption(FeeAdoption),
    PriceFee(PriceFee),
    UserClassification(UserClassification),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub section: Section,
    pub title: &'static str,
    pub outcome: Outcome<SectionData>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub session_id: Uuid,
    pub sections: Vec<SectionReport>,
}

impl DashboardReport {
    pub fn section(&self, section: Section) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.section == section)
    }

    /// Every notice of every section, in section order.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.sections.iter().flat_map(|s| s.notices.iter())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Inputs of one render call.
#[derive(Debug, Clone)]
pub struct RenderSession {
    pub id: Uuid,
    pub config: DashboardConfig,
    patterns: CompiledPatterns,
    /// Uploaded buffers keyed by dataset file name; they take precedence over `data_dir`.
    uploads: HashMap<String, Vec<u8>>,
}

/// A dataset that passed its column requirements.
struct Prepared {
    table: NormalizedTable,
    placeholders: Vec<String>,
}

impl Prepared {
    fn has(&self, column: &str) -> bool {
        !self.placeholders.iter().any(|p| p == column)
    }
}

impl RenderSession {
    /// A session over a validated configuration.
    pub fn new(config: DashboardConfig) -> ConfigResult<Self> {
        config.validate()?;
        let patterns = config.patterns.compile()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            patterns,
            uploads: HashMap::new(),
        })
    }

    /// Provide the bytes of a dataset file directly.
    pub fn with_upload(mut self, file: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.uploads.insert(file.into(), bytes);
        self
    }

    pub fn patterns(&self) -> &CompiledPatterns {
        &self.patterns
    }

    fn load(&self, file: &str, notices: &mut Notices) -> Outcome<NormalizedTable> {
        let result = match self.uploads.get(file) {
            Some(bytes) => ingest_bytes(bytes, &self.config.ingest),
            None => ingest_file(self.config.dataset_path(file), &self.config.ingest),
        };
        match result {
            Ok(ingested) => {
                debug!(
                    file,
                    delimiter = %ingested.source.delimiter,
                    encoding = %ingested.source.encoding,
                    rows = ingested.source.row_count,
                    "dataset loaded"
                );
                notices.extend(ingested.notices);
                Outcome::Available(ingested.table)
            }
            Err(err) if err.is_not_found() => {
                Outcome::unavailable(NoticeKind::DatasetUnavailable, format!("{}: file not found", file))
            }
            Err(err) => Outcome::unavailable(NoticeKind::DatasetUnavailable, format!("{}: {}", file, err)),
        }
    }

    /// Load `file` and check it against `needs`.
    fn prepare(&self, file: &str, needs: &ColumnRequirements, notices: &mut Notices) -> ContractResult<Outcome<Prepared>> {
        let table = available!(self.load(file, notices));
        let resolved = available!(needs.resolve(&table)?);
        notices.extend(resolved.notices);
        Ok(Outcome::Available(Prepared {
            table: resolved.table.into_owned(),
            placeholders: resolved.placeholders,
        }))
    }

    fn note_coverage(&self, coverage: &Coverage, column: &str, notices: &mut Notices) {
        if let Some(notice) = coverage.notice(self.config.missingness_threshold, column) {
            notices.push(notice);
        }
    }
}

// =============================================================================
// Render
// =============================================================================

/// Run every section once.
///
/// Only a structural defect is an error; data problems end up in the
/// affected section's outcome and notices.
pub fn render(session: &RenderSession) -> Result<DashboardReport, ContractViolation> {
    let span = info_span!("render", session = %session.id);
    let _guard = span.enter();

    let mut sections = Vec::with_capacity(Section::ALL.len());
    for section in Section::ALL {
        let mut notices = Notices::for_section(section.as_str());
        let outcome = section.build(session, &mut notices)?;
        if let Some(notice) = outcome.notice() {
            notices.push(notice);
        }
        info!(
            section = section.as_str(),
            available = outcome.is_available(),
            "section rendered"
        );
        sections.push(SectionReport {
            section,
            title: section.title(),
            outcome,
            notices: notices.into_vec(),
        });
    }

    Ok(DashboardReport {
        session_id: session.id,
        sections,
    })
}

/// A session whose datasets come only from `files` (name, content).
#[cfg(test)]
pub(crate) fn session_with(files: &[(&str, &str)]) -> RenderSession {
    let config = DashboardConfig {
        data_dir: std::path::PathBuf::from("/nonexistent/ethflows-test-data"),
        ..DashboardConfig::default()
    };
    files.iter().fold(RenderSession::new(config).unwrap(), |session, (name, content)| {
        session.with_upload(*name, content.as_bytes().to_vec())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notices::Severity;
    use std::fs;
    use tempfile::TempDir;

    fn session_in(dir: &TempDir) -> RenderSession {
        let config = DashboardConfig {
            data_dir: dir.path().to_path_buf(),
            ..DashboardConfig::default()
        };
        RenderSession::new(config).unwrap()
    }

    #[test]
    fn test_failing_dataset_only_degrades_its_section() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("volume_category.csv"),
            "MONTH;CATEGORY;VOLUME_USD_BILLIONS\n2024-08;DEX;12.5\n2024-08;Lending;7.5\n",
        )
        .unwrap();
        // binary garbage for the DEX dataset
        fs::write(dir.path().join("dex_volume.csv"), [0u8, 159, 146, 150, 0, 0, 1]).unwrap();

        let report = render(&session_in(&dir)).unwrap();
        assert_eq!(report.sections.len(), Section::ALL.len());

        let volume = report.section(Section::VolumeByCategory).unwrap();
        assert!(volume.outcome.is_available());

        let dex = report.section(Section::DexVolume).unwrap();
        match &dex.outcome {
            Outcome::Unavailable(u) => {
                assert_eq!(u.kind, NoticeKind::DatasetUnavailable);
                assert!(u.reason.starts_with("dex_volume.csv"));
            }
            Outcome::Available(_) => panic!("binary dataset must not render"),
        }
        assert!(dex
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::DatasetUnavailable && n.section.as_deref() == Some("dex_volume")));

        // sections without files are unavailable, not errors
        let bridges = report.section(Section::BridgeVolume).unwrap();
        assert!(!bridges.outcome.is_available());
    }

    #[test]
    fn test_uploads_take_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bridged_volume.csv"),
            "MONTH,TOTAL_BRIDGE_VOLUME_BILLIONS\n2024-01,1\n2024-02,1\n",
        )
        .unwrap();
        let session = session_in(&dir).with_upload(
            "bridged_volume.csv",
            b"MONTH,TOTAL_BRIDGE_VOLUME_BILLIONS\n2024-01,1\n2024-02,3\n".to_vec(),
        );

        let report = render(&session).unwrap();
        let Some(SectionData::BridgeVolume(bridge)) = report.section(Section::BridgeVolume).unwrap().outcome.value()
        else {
            panic!("bridge section should render");
        };
        assert_eq!(bridge.growth, Outcome::Available(2.0));
    }

    #[test]
    fn test_render_is_repeatable() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("volume_category.csv"),
            "MONTH,CATEGORY,VOLUME_USD_BILLIONS\n2024-01,DEX,0.1\n2024-01,NFT,0.2\n2024-02,DEX,0.7\n",
        )
        .unwrap();
        let session = session_in(&dir);

        let first = render(&session).unwrap();
        let second = render(&session).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.session_id, session.id);
    }

    #[test]
    fn test_report_serializes_for_the_host() {
        let dir = TempDir::new().unwrap();
        let report = render(&session_in(&dir)).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sections"][0]["section"], "volume_by_category");
        assert_eq!(
            json["sections"][0]["outcome"]["unavailable"]["kind"],
            "dataset_unavailable"
        );
        assert!(report.notices().all(|n| n.severity >= Severity::Info));
    }

    #[test]
    fn test_invalid_config_rejected_by_session() {
        let mut config = DashboardConfig::default();
        config.patterns.dominance = "[".into();
        assert!(RenderSession::new(config).is_err());
    }
}
