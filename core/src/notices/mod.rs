//! Structured, non-fatal notices for the host UI.
//!
//! Every degraded-mode condition (missing optional column, insufficient
//! correlation data, zero-total month, ...) becomes a [`Notice`] carrying a
//! severity, a kind, a displayable message and the affected section. Notices
//! are returned with the data they describe and mirrored into `tracing`.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Level};

/// Severity for inline display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Log level a notice of this severity is traced at.
    pub fn level(self) -> Level {
        match self {
            Severity::Info => Level::DEBUG,
            Severity::Warning => Level::WARN,
            Severity::Error => Level::ERROR,
        }
    }
}

/// What went wrong, independent of wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MissingOptionalColumn,
    MissingRequiredColumn,
    InsufficientCorrelationData,
    /// Too few points for a scalar summary (peak, growth, ratio).
    InsufficientData,
    ZeroTotalMonth,
    HighMissingness,
    UnparseableMonthColumn,
    UnparseableValues,
    DatasetUnavailable,
    FallbackDataset,
}

/// A single notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub severity: Severity,
    pub kind: NoticeKind,
    pub message: String,
    /// Identifier of the dashboard section the notice belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Notice {
    pub fn info(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self { severity: Severity::Info, kind, message: message.into(), section: None }
    }

    pub fn warning(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, kind, message: message.into(), section: None }
    }

    pub fn error(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, kind, message: message.into(), section: None }
    }

    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    fn trace(&self) {
        let section = self.section.as_deref().unwrap_or("-");
        match self.severity.level() {
            Level::ERROR => error!(section, kind = ?self.kind, "{}", self.message),
            Level::WARN => warn!(section, kind = ?self.kind, "{}", self.message),
            _ => debug!(section, kind = ?self.kind, "{}", self.message),
        }
    }
}

/// Collects notices for one section of one render pass.
///
/// Entries without a section are tagged with the collector's section.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    section: Option<String>,
    entries: Vec<Notice>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_section(section: impl Into<String>) -> Self {
        Self { section: Some(section.into()), entries: Vec::new() }
    }

    /// Record a notice
    pub fn push(&mut self, mut notice: Notice) {
        if notice.section.is_none() {
            notice.section = self.section.clone();
        }
        notice.trace();
        self.entries.push(notice);
    }

    pub fn extend(&mut self, notices: impl IntoIterator<Item = Notice>) {
        for notice in notices {
            self.push(notice);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter()
    }

    /// Highest severity recorded so far.
    pub fn worst(&self) -> Option<Severity> {
        self.entries.iter().map(|n| n.severity).max()
    }

    pub fn into_vec(self) -> Vec<Notice> {
        if let Some(section) = &self.section {
            info!(section = section.as_str(), notices = self.entries.len(), "section notices collected");
        }
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_tagging() {
        let mut notices = Notices::for_section("bridge_volume");
        notices.push(Notice::warning(NoticeKind::MissingOptionalColumn, "BRIDGE_VOLUME missing"));
        notices.push(Notice::info(NoticeKind::FallbackDataset, "other").in_section("fee_adoption"));

        let all = notices.into_vec();
        assert_eq!(all[0].section.as_deref(), Some("bridge_volume"));
        assert_eq!(all[1].section.as_deref(), Some("fee_adoption"));
    }

    #[test]
    fn test_worst_severity() {
        let mut notices = Notices::new();
        assert_eq!(notices.worst(), None);
        notices.push(Notice::info(NoticeKind::UnparseableValues, "1 value"));
        notices.push(Notice::warning(NoticeKind::HighMissingness, "40%"));
        assert_eq!(notices.worst(), Some(Severity::Warning));
    }

    #[test]
    fn test_trace_levels_follow_severity() {
        assert_eq!(Severity::Info.level(), Level::DEBUG);
        assert_eq!(Severity::Warning.level(), Level::WARN);
        assert_eq!(Severity::Error.level(), Level::ERROR);

        let mut notices = Notices::for_section("price_fee");
        notices.push(Notice::error(NoticeKind::DatasetUnavailable, "fees_price.csv unreadable"));
        assert_eq!(notices.worst(), Some(Severity::Error));
    }

    #[test]
    fn test_serialization_shape() {
        let notice = Notice::warning(NoticeKind::ZeroTotalMonth, "zero").in_section("user_mix");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["kind"], "zero_total_month");
        assert_eq!(json["section"], "user_mix");
    }
}
