//! Capital-flow sections: category volume, activity, DEX, lending, bridges.

use serde::Serialize;

use super::RenderSession;
use crate::error::ContractResult;
use crate::metrics::{
    category_shares, growth_since_start, latest_matching_share, monthly_category_sums, monthly_series, peak,
    top_category_latest, Outcome, Peak, TopCategory,
};
use crate::models::{ColumnKind, LongFormRow, NormalizedTable, SeriesRow, MONTH};
use crate::notices::Notices;
use crate::validation::ColumnRequirements;

const CATEGORY: &str = "CATEGORY";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeByCategory {
    /// Stacked-area rows, USD billions.
    pub rows: Vec<LongFormRow>,
    pub shares: Vec<LongFormRow>,
    pub peak_total: Outcome<Peak>,
    /// Latest-month share of categories matching the dominance pattern.
    pub dominance_share: Outcome<f64>,
}

pub(super) fn volume_by_category(
    session: &RenderSession,
    notices: &mut Notices,
) -> ContractResult<Outcome<VolumeByCategory>> {
    const VOLUME: &str = "VOLUME_USD_BILLIONS";

    let needs = ColumnRequirements::new().require_all(&[MONTH, CATEGORY, VOLUME]);
    let data = available!(session.prepare(&session.config.datasets.volume_category, &needs, notices)?);

    let aggregate = available!(monthly_category_sums(&data.table, CATEGORY, VOLUME)?);
    session.note_coverage(&aggregate.coverage, VOLUME, notices);
    let shares = category_shares(&aggregate);
    notices.extend(shares.notices());

    Ok(Outcome::Available(VolumeByCategory {
        rows: aggregate.long_form(),
        shares: shares.long_form(),
        peak_total: peak(&aggregate.totals()),
        dominance_share: latest_matching_share(&aggregate, &session.patterns().dominance),
    }))
}

// =============================================================================
// Activity
// =============================================================================

/// One activity metric broken down by category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMetric {
    pub column: String,
    /// One line per category.
    pub series: Vec<SeriesRow>,
    pub peak_total: Outcome<Peak>,
    pub dominance_share: Outcome<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityByCategory {
    pub addresses: Outcome<CategoryMetric>,
    pub transactions: Outcome<CategoryMetric>,
}

fn category_metric(
    session: &RenderSession,
    table: &NormalizedTable,
    column: &str,
    notices: &mut Notices,
) -> ContractResult<Outcome<CategoryMetric>> {
    let aggregate = available!(monthly_category_sums(table, CATEGORY, column)?);
    session.note_coverage(&aggregate.coverage, column, notices);
    Ok(Outcome::Available(CategoryMetric {
        column: column.to_string(),
        series: aggregate.series_rows(),
        peak_total: peak(&aggregate.totals()),
        dominance_share: latest_matching_share(&aggregate, &session.patterns().dominance),
    }))
}

pub(super) fn activity_by_category(
    session: &RenderSession,
    notices: &mut Notices,
) -> ContractResult<Outcome<ActivityByCategory>> {
    const ADDRESSES: &str = "ACTIVE_ADDRESSES";
    const TRANSACTIONS: &str = "TRANSACTIONS";

    let needs = ColumnRequirements::new().require_all(&[MONTH, CATEGORY, ADDRESSES, TRANSACTIONS]);
    let data = available!(session.prepare(&session.config.datasets.active_addresses, &needs, notices)?);

    Ok(Outcome::Available(ActivityByCategory {
        addresses: category_metric(session, &data.table, ADDRESSES, notices)?,
        transactions: category_metric(session, &data.table, TRANSACTIONS, notices)?,
    }))
}

// =============================================================================
// DEX
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DexVolume {
    /// Volume (bars) and active swappers (line, secondary axis).
    pub series: Vec<SeriesRow>,
    pub peak_volume: Outcome<Peak>,
    pub volume_growth: Outcome<f64>,
}

pub(super) fn dex_volume(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<DexVolume>> {
    const SWAPPERS: &str = "ACTIVE_SWAPPERS";
    const VOLUME: &str = "TOTAL_VOLUME_BILLIONS";

    let needs = ColumnRequirements::new().require_all(&[MONTH, SWAPPERS, VOLUME]);
    let data = available!(session.prepare(&session.config.datasets.dex_volume, &needs, notices)?);

    let volume = available!(monthly_series(&data.table, VOLUME)?);
    let swappers = available!(monthly_series(&data.table, SWAPPERS)?);
    session.note_coverage(&volume.coverage, VOLUME, notices);

    let mut series = volume.series_rows();
    series.extend(swappers.series_rows());
    Ok(Outcome::Available(DexVolume {
        series,
        peak_volume: peak(&volume.points),
        volume_growth: growth_since_start(&volume.points),
    }))
}

// =============================================================================
// Lending
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingDeposits {
    /// Stacked-area rows per platform, USD billions.
    pub rows: Vec<LongFormRow>,
    pub top_platform: Outcome<TopCategory>,
    pub depositors_growth: Outcome<f64>,
}

pub(super) fn lending_deposits(
    session: &RenderSession,
    notices: &mut Notices,
) -> ContractResult<Outcome<LendingDeposits>> {
    const PLATFORM: &str = "PLATFORM";
    const VOLUME: &str = "VOLUME_BILLIONS";
    const DEPOSITORS: &str = "UNIQUE_DEPOSITORS";

    let needs = ColumnRequirements::new().require_all(&[MONTH, PLATFORM, VOLUME, DEPOSITORS]);
    let data = available!(session.prepare(&session.config.datasets.lending_deposits, &needs, notices)?);

    let aggregate = available!(monthly_category_sums(&data.table, PLATFORM, VOLUME)?);
    session.note_coverage(&aggregate.coverage, VOLUME, notices);
    let depositors = available!(monthly_series(&data.table, DEPOSITORS)?);

    Ok(Outcome::Available(LendingDeposits {
        rows: aggregate.long_form(),
        top_platform: top_category_latest(&aggregate),
        depositors_growth: growth_since_start(&depositors.points),
    }))
}

// =============================================================================
// Bridges
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// Growth since start above the configured threshold.
    EmergingHub,
    StableMixed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeVolume {
    /// Total, plus inflow and outflow when the dataset has them.
    pub series: Vec<SeriesRow>,
    pub growth: Outcome<f64>,
    pub status: BridgeStatus,
}

pub(super) fn bridge_volume(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<BridgeVolume>> {
    const TOTAL: &str = "TOTAL_BRIDGE_VOLUME_BILLIONS";
    const INFLOW: &str = "INFLOW_VOLUME_BILLIONS";
    const OUTFLOW: &str = "OUTFLOW_VOLUME_BILLIONS";

    let needs = ColumnRequirements::new()
        .require_all(&[MONTH, TOTAL])
        .optional(INFLOW, ColumnKind::ScaledNumeric)
        .optional(OUTFLOW, ColumnKind::ScaledNumeric);
    let data = available!(session.prepare(&session.config.datasets.bridged_volume, &needs, notices)?);

    let total = available!(monthly_series(&data.table, TOTAL)?);
    session.note_coverage(&total.coverage, TOTAL, notices);

    let mut series = total.series_rows();
    for column in [INFLOW, OUTFLOW] {
        if !data.has(column) {
            continue;
        }
        if let Some(flow) = monthly_series(&data.table, column)?.into_value() {
            series.extend(flow.series_rows());
        }
    }

    let growth = growth_since_start(&total.points);
    let status = match growth.value() {
        Some(g) if *g > session.config.emerging_growth_threshold => BridgeStatus::EmergingHub,
        _ => BridgeStatus::StableMixed,
    };

    Ok(Outcome::Available(BridgeVolume { series, growth, status }))
}
