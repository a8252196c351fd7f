//! Date parsing for the `MONTH` column.
//!
//! Values are tried against an ordered cascade of formats: RFC 3339 and ISO
//! 8601 first, then common spreadsheet alternates, then month-only forms.
//! A value matching none of them is `None`; callers keep the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

// Month-first before day-first for slash dates, as spreadsheet exports default to it.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
];

/// Month-only forms, parsed by pinning the day to the first.
const MONTH_FORMATS: &[(&str, &str)] = &[
    ("%Y-%m-%d", "{}-01"),
    ("%Y/%m/%d", "{}/01"),
    ("%d %b %Y", "01 {}"),
    ("%d %B %Y", "01 {}"),
];

/// Parse a date or date-time string.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let normalised = match s.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => s.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.naive_utc());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    for (fmt, template) in MONTH_FORMATS {
        let candidate = template.replace("{}", s);
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(parse_timestamp("2024-08-01"), Some(ymd(2024, 8, 1)));
    }

    #[test]
    fn test_rfc3339_with_z() {
        let parsed = parse_timestamp("2024-08-01T12:30:00Z").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
    }

    #[test]
    fn test_rfc3339_offset_converted_to_utc() {
        let parsed = parse_timestamp("2024-08-01T01:00:00+02:00").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 7, 31).unwrap());
    }

    #[test]
    fn test_space_separated_datetime() {
        let parsed = parse_timestamp("2024-08-01 00:00:00.000").unwrap();
        assert_eq!(parsed, ymd(2024, 8, 1));
    }

    #[test]
    fn test_slash_dates_month_first() {
        assert_eq!(parse_timestamp("08/09/2024"), Some(ymd(2024, 8, 9)));
        // only valid day-first
        assert_eq!(parse_timestamp("25/08/2024"), Some(ymd(2024, 8, 25)));
    }

    #[test]
    fn test_month_only_forms() {
        assert_eq!(parse_timestamp("2024-08"), Some(ymd(2024, 8, 1)));
        assert_eq!(parse_timestamp("2024/08"), Some(ymd(2024, 8, 1)));
        assert_eq!(parse_timestamp("Aug 2024"), Some(ymd(2024, 8, 1)));
        assert_eq!(parse_timestamp("August 2024"), Some(ymd(2024, 8, 1)));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("2024-13"), None);
    }
}
