//! Tagged derivation results.

use serde::Serialize;

use crate::notices::{Notice, NoticeKind};

/// Why a derived value could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unavailable {
    pub kind: NoticeKind,
    pub reason: String,
}

/// Result of a derivation: a value, or a displayable reason it is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome<T> {
    Available(T),
    Unavailable(Unavailable),
}

impl<T> Outcome<T> {
    pub fn unavailable(kind: NoticeKind, reason: impl Into<String>) -> Self {
        Outcome::Unavailable(Unavailable {
            kind,
            reason: reason.into(),
        })
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Outcome::Available(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Available(v) => Some(v),
            Outcome::Unavailable(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Available(v) => Some(v),
            Outcome::Unavailable(_) => None,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Available(v) => Outcome::Available(v),
            Outcome::Unavailable(u) => Outcome::Unavailable(u.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Available(v) => Outcome::Available(f(v)),
            Outcome::Unavailable(u) => Outcome::Unavailable(u),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Available(v) => f(v),
            Outcome::Unavailable(u) => Outcome::Unavailable(u),
        }
    }

    /// The reason as a warning notice, if unavailable.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Outcome::Available(_) => None,
            Outcome::Unavailable(u) => Some(Notice::warning(u.kind, u.reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_notice() {
        let ok: Outcome<f64> = Outcome::Available(2.0);
        assert_eq!(ok.clone().map(|v| v * 2.0), Outcome::Available(4.0));
        assert!(ok.notice().is_none());

        let missing: Outcome<f64> = Outcome::unavailable(NoticeKind::ZeroTotalMonth, "zero total");
        assert!(!missing.is_available());
        let notice = missing.notice().unwrap();
        assert_eq!(notice.kind, NoticeKind::ZeroTotalMonth);
        assert_eq!(notice.message, "zero total");
    }

    #[test]
    fn test_serialization_is_tagged() {
        let ok: Outcome<f64> = Outcome::Available(0.5);
        assert_eq!(serde_json::to_value(&ok).unwrap()["available"], 0.5);

        let missing: Outcome<f64> = Outcome::unavailable(NoticeKind::InsufficientCorrelationData, "2 points");
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["unavailable"]["kind"], "insufficient_correlation_data");
        assert_eq!(json["unavailable"]["reason"], "2 points");
    }
}
