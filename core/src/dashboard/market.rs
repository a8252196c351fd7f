//! Market sections: ETH price, fees and adoption.

use serde::Serialize;

use super::RenderSession;
use crate::error::ContractResult;
use crate::metrics::{
    correlate_columns, growth_since_start, latest_ratio, monthly_mean, monthly_series, scatter_points, value_range,
    CorrelationResult, MonthlySeries, Outcome, ValueRange,
};
use crate::models::{ColumnKind, NormalizedTable, ScatterPoint, SeriesRow, MONTH};
use crate::notices::{Notice, NoticeKind, Notices};
use crate::validation::ColumnRequirements;

const PRICE: &str = "AVG_ETH_PRICE_USD";

/// Column renames applied when fee adoption falls back to the price/fee dataset.
const FEE_FALLBACK_RENAMES: [(&str, &str); 3] = [
    ("AVG_TX_FEE_USD", "AVG_FEE_USD"),
    ("MONTHLY_TRANSACTIONS", "TOTAL_TRANSACTIONS"),
    ("TX_MILLIONS", "TRANSACTIONS_MILLIONS"),
];

fn note_correlation(correlation: &Outcome<CorrelationResult>, notices: &mut Notices) {
    if let Some(notice) = correlation.notice() {
        notices.push(notice);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceActivity {
    /// Price (primary axis) and activity index (secondary axis).
    pub series: Vec<SeriesRow>,
    pub price_range: Outcome<ValueRange>,
    pub correlation: Outcome<CorrelationResult>,
}

pub(super) fn price_activity(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<PriceActivity>> {
    const ACTIVITY: &str = "ACTIVITY_INDEX";

    let needs = ColumnRequirements::new().require_all(&[MONTH, PRICE, ACTIVITY]);
    let data = available!(session.prepare(&session.config.datasets.eth_price, &needs, notices)?);

    let price = available!(monthly_mean(&data.table, PRICE)?);
    let activity = available!(monthly_mean(&data.table, ACTIVITY)?);
    let correlation = correlate_columns(&data.table, PRICE, ACTIVITY)?;
    note_correlation(&correlation, notices);

    let mut series = price.series_rows();
    series.extend(activity.series_rows());
    Ok(Outcome::Available(PriceActivity {
        series,
        price_range: value_range(&price.points),
        correlation,
    }))
}

// =============================================================================
// Fee adoption
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeAdoption {
    /// Dataset file the section was computed from.
    pub source: String,
    /// Unique users (primary axis) and average fee in USD (secondary axis).
    pub series: Vec<SeriesRow>,
    pub user_growth: Outcome<f64>,
    pub fee_change: Outcome<f64>,
}

/// Users per month from `USERS_MILLIONS` (scaled to units) or `UNIQUE_USERS`.
fn user_series(table: &NormalizedTable) -> ContractResult<Outcome<MonthlySeries>> {
    if table.has_column("USERS_MILLIONS") {
        return Ok(monthly_series(table, "USERS_MILLIONS")?.map(|s| s.scaled(1e6).renamed("UNIQUE_USERS")));
    }
    if table.has_column("UNIQUE_USERS") {
        return monthly_series(table, "UNIQUE_USERS");
    }
    Ok(Outcome::unavailable(
        NoticeKind::MissingRequiredColumn,
        "missing required columns: USERS_MILLIONS or UNIQUE_USERS",
    ))
}

pub(super) fn fee_adoption(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<FeeAdoption>> {
    const FEE: &str = "AVG_FEE_USD";

    let datasets = &session.config.datasets;
    let (source, table) = match session.load(&datasets.fees_activity, notices) {
        Outcome::Available(table) if !table.is_empty() => (datasets.fees_activity.clone(), table),
        primary => {
            let reason = match primary {
                Outcome::Unavailable(u) => u.reason,
                Outcome::Available(_) => format!("{} has no rows", datasets.fees_activity),
            };
            notices.push(Notice::info(
                NoticeKind::FallbackDataset,
                format!("{}; falling back to {}", reason, datasets.fees_price),
            ));
            let fallback = available!(session.load(&datasets.fees_price, notices));
            let renames: Vec<(&str, &str)> = FEE_FALLBACK_RENAMES
                .iter()
                .copied()
                .filter(|(_, to)| !fallback.has_column(to))
                .collect();
            (datasets.fees_price.clone(), fallback.renamed(&renames)?)
        }
    };

    let needs = ColumnRequirements::new().require_all(&[MONTH, FEE]);
    let resolved = available!(needs.resolve(&table)?);
    let table = resolved.table;

    let users = available!(user_series(&table)?);
    let fee = available!(monthly_mean(&table, FEE)?);
    session.note_coverage(&users.coverage, &users.name, notices);

    let mut series = users.series_rows();
    series.extend(fee.series_rows());
    Ok(Outcome::Available(FeeAdoption {
        source,
        series,
        user_growth: growth_since_start(&users.points),
        fee_change: growth_since_start(&fee.points),
    }))
}

// =============================================================================
// Price vs fee
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFee {
    /// Price (x) against fee (y), sized by monthly transactions when known.
    pub points: Vec<ScatterPoint>,
    pub correlation: Outcome<CorrelationResult>,
    pub latest_ratio: Outcome<f64>,
}

pub(super) fn price_fee(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<PriceFee>> {
    const FEE: &str = "AVG_TX_FEE_USD";
    const RATIO: &str = "PRICE_TO_FEE_RATIO";
    const WEIGHT: &str = "MONTHLY_TRANSACTIONS";

    let needs = ColumnRequirements::new()
        .require_all(&[MONTH, PRICE, FEE])
        .optional(RATIO, ColumnKind::Numeric)
        .optional(WEIGHT, ColumnKind::Numeric);
    let data = available!(session.prepare(&session.config.datasets.fees_price, &needs, notices)?);

    let points = available!(scatter_points(&data.table, PRICE, FEE, Some(WEIGHT))?);
    let correlation = correlate_columns(&data.table, PRICE, FEE)?;
    note_correlation(&correlation, notices);

    let ratio = if data.has(RATIO) {
        monthly_mean(&data.table, RATIO)?.and_then(|reported| match reported.points.values().next_back() {
            Some(last) => Outcome::Available(*last),
            None => Outcome::unavailable(NoticeKind::InsufficientData, format!("'{}' has no values", RATIO)),
        })
    } else {
        let price = available!(monthly_mean(&data.table, PRICE)?);
        let fee = available!(monthly_mean(&data.table, FEE)?);
        latest_ratio(&price, &fee)
    };

    Ok(Outcome::Available(PriceFee {
        points,
        correlation,
        latest_ratio: ratio,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::session_with;

    const FEES_PRICE: &str = "MONTH,AVG_ETH_PRICE_USD,AVG_TX_FEE_USD,MONTHLY_TRANSACTIONS,USERS_MILLIONS\n\
        2024-01,2000,4,30000000,1.5\n\
        2024-02,3000,6,32000000,2.0\n\
        2024-03,2500,5,31000000,3.0\n";

    #[test]
    fn test_price_activity_correlation() {
        let session = session_with(&[(
            "eth_price.csv",
            "MONTH,AVG_ETH_PRICE_USD,ACTIVITY_INDEX\n2024-01,2000,40\n2024-02,3000,60\n2024-03,4000,80\n",
        )]);
        let mut notices = Notices::new();
        let section = price_activity(&session, &mut notices).unwrap().into_value().unwrap();

        let corr = section.correlation.into_value().unwrap();
        assert!((corr.pearson_r - 1.0).abs() < 1e-12);
        assert_eq!(section.price_range, Outcome::Available(ValueRange { min: 2000.0, max: 4000.0 }));
        assert_eq!(section.series.len(), 6);
        assert!(notices.is_empty());
    }

    #[test]
    fn test_price_range_averages_rows_within_a_month() {
        let session = session_with(&[(
            "eth_price.csv",
            "MONTH,AVG_ETH_PRICE_USD,ACTIVITY_INDEX\n\
             2024-01-01,2000,40\n2024-01-15,2100,50\n2024-02-01,3000,60\n2024-03-01,4000,80\n",
        )]);
        let section = price_activity(&session, &mut Notices::new()).unwrap().into_value().unwrap();

        assert_eq!(section.price_range, Outcome::Available(ValueRange { min: 2050.0, max: 4000.0 }));
        assert!(section
            .series
            .iter()
            .any(|r| r.series == "ACTIVITY_INDEX" && r.value == Some(45.0)));
    }

    #[test]
    fn test_price_fee_ratio_uses_monthly_means() {
        let session = session_with(&[(
            "fees_price.csv",
            "MONTH,AVG_ETH_PRICE_USD,AVG_TX_FEE_USD\n\
             2024-01-01,2000,4\n2024-02-01,3000,6\n2024-03-01,2400,4\n2024-03-15,2600,6\n",
        )]);
        let section = price_fee(&session, &mut Notices::new()).unwrap().into_value().unwrap();
        assert_eq!(section.latest_ratio, Outcome::Available(500.0));
    }

    #[test]
    fn test_price_activity_two_points_still_renders() {
        let session = session_with(&[(
            "eth_price.csv",
            "MONTH,AVG_ETH_PRICE_USD,ACTIVITY_INDEX\n2024-01,2000,40\n2024-02,3000,60\n",
        )]);
        let mut notices = Notices::new();
        let section = price_activity(&session, &mut notices).unwrap().into_value().unwrap();
        assert!(!section.correlation.is_available());
        assert!(notices.iter().any(|n| n.kind == NoticeKind::InsufficientCorrelationData));
    }

    #[test]
    fn test_fee_adoption_falls_back_to_price_dataset() {
        let session = session_with(&[("fees_price.csv", FEES_PRICE)]);
        let mut notices = Notices::for_section("fee_adoption");
        let section = fee_adoption(&session, &mut notices).unwrap().into_value().unwrap();

        assert_eq!(section.source, "fees_price.csv");
        assert_eq!(section.user_growth, Outcome::Available(1.0));
        assert_eq!(section.fee_change, Outcome::Available(0.25));
        assert!(section
            .series
            .iter()
            .any(|r| r.series == "UNIQUE_USERS" && r.value == Some(1_500_000.0)));
        assert!(notices.iter().any(|n| n.kind == NoticeKind::FallbackDataset));
    }

    #[test]
    fn test_fee_adoption_primary_dataset() {
        let session = session_with(&[
            (
                "fees_activity.csv",
                "MONTH,UNIQUE_USERS,AVG_FEE_USD\n2024-01,1000,2\n2024-02,1100,1\n",
            ),
            ("fees_price.csv", FEES_PRICE),
        ]);
        let mut notices = Notices::new();
        let section = fee_adoption(&session, &mut notices).unwrap().into_value().unwrap();
        assert_eq!(section.source, "fees_activity.csv");
        assert_eq!(section.fee_change, Outcome::Available(-0.5));
        assert!(!notices.iter().any(|n| n.kind == NoticeKind::FallbackDataset));
    }

    #[test]
    fn test_fee_adoption_without_users() {
        let session = session_with(&[("fees_activity.csv", "MONTH,AVG_FEE_USD\n2024-01,2\n2024-02,1\n")]);
        match fee_adoption(&session, &mut Notices::new()).unwrap() {
            Outcome::Unavailable(u) => assert!(u.reason.contains("UNIQUE_USERS")),
            Outcome::Available(_) => panic!("users are required"),
        }
    }

    #[test]
    fn test_price_fee_scatter_and_computed_ratio() {
        let session = session_with(&[("fees_price.csv", FEES_PRICE)]);
        let mut notices = Notices::new();
        let section = price_fee(&session, &mut notices).unwrap().into_value().unwrap();

        assert_eq!(section.points.len(), 3);
        assert_eq!(section.points[0].weight, 30_000_000.0);
        assert!((section.correlation.into_value().unwrap().pearson_r - 1.0).abs() < 1e-12);
        assert_eq!(section.latest_ratio, Outcome::Available(500.0));
        // only the ratio column is absent
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_price_fee_reported_ratio() {
        let session = session_with(&[(
            "fees_price.csv",
            "MONTH,AVG_ETH_PRICE_USD,AVG_TX_FEE_USD,PRICE_TO_FEE_RATIO\n\
             2024-01,2000,4,480\n2024-02,3000,6,510\n2024-03,2500,5,505\n",
        )]);
        let section = price_fee(&session, &mut Notices::new()).unwrap().into_value().unwrap();
        assert_eq!(section.latest_ratio, Outcome::Available(505.0));
        assert!(section.points.iter().all(|p| p.weight == 1.0));
    }
}
