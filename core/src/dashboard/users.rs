//! User sections: cohort/typology mix over time and per-user classification.

use serde::Serialize;

use super::RenderSession;
use crate::error::ContractResult;
use crate::metrics::{
    category_shares, classify_by_breadth, classify_by_volume, group_mean_ratio, latest_matching_share,
    latest_matching_sum, monthly_category_sums, CohortDistribution, MonthlyAggregate, Outcome,
};
use crate::models::{ColumnKind, LongFormRow, MONTH};
use crate::notices::{Notice, NoticeKind, Notices};
use crate::validation::ColumnRequirements;

const UNIQUE_USERS: &str = "UNIQUE_USERS";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortMix {
    /// Unique users per cohort, absent cells as 0.
    pub evolution: Vec<LongFormRow>,
    pub shares: Vec<LongFormRow>,
    pub whale_user_share: Outcome<f64>,
    /// Latest-month whale volume per whale user.
    pub whale_avg_volume: Outcome<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypologyMix {
    pub evolution: Vec<LongFormRow>,
    pub shares: Vec<LongFormRow>,
    /// Unique users per activity level, when the dataset has one.
    pub activity_levels: Option<Vec<LongFormRow>>,
    pub multi_sector_share: Outcome<f64>,
    /// Mean transactions per user of multi-sector over single-sector types.
    pub engagement_multiplier: Outcome<f64>,
}

/// Both user-mix dimensions; each degrades on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMix {
    pub cohorts: Outcome<CohortMix>,
    pub typology: Outcome<TypologyMix>,
}

fn users_over_time(aggregate: &MonthlyAggregate, notices: &mut Notices) -> (Vec<LongFormRow>, Vec<LongFormRow>) {
    let shares = category_shares(aggregate);
    notices.extend(shares.notices());
    (aggregate.dense_long_form(), shares.long_form())
}

fn cohort_mix(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<CohortMix>> {
    const COHORT: &str = "COHORT";
    const VOLUME: &str = "TOTAL_VOLUME";

    let needs = ColumnRequirements::new().require_all(&[MONTH, COHORT, UNIQUE_USERS, VOLUME]);
    let data = available!(session.prepare(&session.config.datasets.user_cohort, &needs, notices)?);

    let users = available!(monthly_category_sums(&data.table, COHORT, UNIQUE_USERS)?);
    let volume = available!(monthly_category_sums(&data.table, COHORT, VOLUME)?);
    session.note_coverage(&users.coverage, UNIQUE_USERS, notices);

    let whale = &session.patterns().whale;
    let whale_users = latest_matching_sum(&users, whale);
    let whale_avg_volume = latest_matching_sum(&volume, whale).and_then(|v| {
        whale_users.and_then(|u| {
            if u == 0.0 {
                Outcome::unavailable(NoticeKind::InsufficientData, "no whale users in the latest month")
            } else {
                Outcome::Available(v / u)
            }
        })
    });

    let (evolution, shares) = users_over_time(&users, notices);
    Ok(Outcome::Available(CohortMix {
        evolution,
        shares,
        whale_user_share: latest_matching_share(&users, whale),
        whale_avg_volume,
    }))
}

fn typology_mix(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<TypologyMix>> {
    const USER_TYPE: &str = "USER_TYPE";
    const TX_PER_USER: &str = "AVG_TRANSACTIONS_PER_USER";
    const ACTIVITY_LEVEL: &str = "ACTIVITY_LEVEL";

    let needs = ColumnRequirements::new()
        .require_all(&[MONTH, USER_TYPE, UNIQUE_USERS, TX_PER_USER])
        .optional(ACTIVITY_LEVEL, ColumnKind::Category);
    let data = available!(session.prepare(&session.config.datasets.user_typology, &needs, notices)?);

    let users = available!(monthly_category_sums(&data.table, USER_TYPE, UNIQUE_USERS)?);
    session.note_coverage(&users.coverage, UNIQUE_USERS, notices);

    let activity_levels = if data.has(ACTIVITY_LEVEL) {
        monthly_category_sums(&data.table, ACTIVITY_LEVEL, UNIQUE_USERS)?
            .into_value()
            .map(|levels| levels.dense_long_form())
    } else {
        None
    };

    let patterns = session.patterns();
    let engagement_multiplier = group_mean_ratio(
        &data.table,
        USER_TYPE,
        TX_PER_USER,
        &patterns.multi_sector,
        &patterns.single_sector,
    )?;

    let (evolution, shares) = users_over_time(&users, notices);
    Ok(Outcome::Available(TypologyMix {
        evolution,
        shares,
        activity_levels,
        multi_sector_share: latest_matching_share(&users, &patterns.multi_sector),
        engagement_multiplier,
    }))
}

fn dimension_notice<T>(dimension: &str, outcome: &Outcome<T>) -> Option<Notice> {
    match outcome {
        Outcome::Available(_) => None,
        Outcome::Unavailable(u) => Some(Notice::warning(u.kind, format!("{}: {}", dimension, u.reason))),
    }
}

pub(super) fn user_mix(session: &RenderSession, notices: &mut Notices) -> ContractResult<Outcome<UserMix>> {
    let cohorts = cohort_mix(session, notices)?;
    let typology = typology_mix(session, notices)?;

    if let (Outcome::Unavailable(a), Outcome::Unavailable(b)) = (&cohorts, &typology) {
        return Ok(Outcome::unavailable(
            a.kind,
            format!("cohorts: {}; typology: {}", a.reason, b.reason),
        ));
    }
    notices.extend(
        [dimension_notice("cohorts", &cohorts), dimension_notice("typology", &typology)]
            .into_iter()
            .flatten(),
    );
    Ok(Outcome::Available(UserMix { cohorts, typology }))
}

// =============================================================================
// Classification
// =============================================================================

/// Per-user volume cohorts and sector-breadth typology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserClassification {
    pub volume: CohortDistribution,
    pub typology: CohortDistribution,
}

pub(super) fn user_classification(
    session: &RenderSession,
    notices: &mut Notices,
) -> ContractResult<Outcome<UserClassification>> {
    const USER_ID: &str = "USER_ID";
    const CATEGORY: &str = "CATEGORY";
    const VOLUME: &str = "VOLUME_USD";

    let needs = ColumnRequirements::new().require_all(&[USER_ID, CATEGORY, VOLUME]);
    let data = available!(session.prepare(&session.config.datasets.user_activity, &needs, notices)?);

    let config = &session.config;
    let volume = available!(classify_by_volume(&data.table, USER_ID, VOLUME, &config.volume_cohorts)?);
    let typology = available!(classify_by_breadth(&data.table, USER_ID, CATEGORY, &config.typology)?);

    Ok(Outcome::Available(UserClassification { volume, typology }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::session_with;

    const COHORTS: &str = "MONTH,COHORT,UNIQUE_USERS,TOTAL_VOLUME\n\
        2024-01,Whale,10,5000000\n2024-01,Retail,990,900000\n\
        2024-02,Whale,20,8000000\n2024-02,Retail,980,1000000\n";

    const TYPOLOGY: &str = "MONTH,USER_TYPE,ACTIVITY_LEVEL,UNIQUE_USERS,AVG_TRANSACTIONS_PER_USER\n\
        2024-01,Multi-sector,Power,200,30\n2024-01,Single-sector,Casual,800,5\n\
        2024-02,Multi-sector,Power,300,34\n2024-02,Single-sector,Casual,700,7\n";

    #[test]
    fn test_cohort_kpis() {
        let session = session_with(&[("user_cohort.csv", COHORTS)]);
        let mut notices = Notices::for_section("user_mix");
        let mix = user_mix(&session, &mut notices).unwrap().into_value().unwrap();

        let cohorts = mix.cohorts.into_value().unwrap();
        assert_eq!(cohorts.whale_user_share, Outcome::Available(0.02));
        assert_eq!(cohorts.whale_avg_volume, Outcome::Available(400_000.0));
        assert_eq!(cohorts.evolution.len(), 4);

        // typology file is absent, so that dimension is reported
        assert!(!mix.typology.is_available());
        assert!(notices
            .iter()
            .any(|n| n.kind == NoticeKind::DatasetUnavailable && n.message.starts_with("typology:")));
    }

    #[test]
    fn test_typology_kpis() {
        let session = session_with(&[("user_typology.csv", TYPOLOGY)]);
        let mix = user_mix(&session, &mut Notices::new()).unwrap().into_value().unwrap();

        let typology = mix.typology.into_value().unwrap();
        assert_eq!(typology.multi_sector_share, Outcome::Available(0.3));
        assert_eq!(typology.engagement_multiplier, Outcome::Available(32.0 / 6.0));
        let levels = typology.activity_levels.unwrap();
        assert!(levels.iter().any(|r| r.category == "Power" && r.value == Some(300.0)));
    }

    #[test]
    fn test_typology_without_activity_level() {
        let session = session_with(&[(
            "user_typology.csv",
            "MONTH,USER_TYPE,UNIQUE_USERS,AVG_TRANSACTIONS_PER_USER\n2024-01,Multi,1,2\n2024-01,Single,1,1\n",
        )]);
        let mut notices = Notices::new();
        let mix = user_mix(&session, &mut notices).unwrap().into_value().unwrap();
        assert!(mix.typology.into_value().unwrap().activity_levels.is_none());
        assert!(notices.iter().any(|n| n.kind == NoticeKind::MissingOptionalColumn));
    }

    #[test]
    fn test_both_dimensions_missing() {
        let session = session_with(&[]);
        match user_mix(&session, &mut Notices::new()).unwrap() {
            Outcome::Unavailable(u) => {
                assert!(u.reason.contains("cohorts:"));
                assert!(u.reason.contains("typology:"));
            }
            Outcome::Available(_) => panic!("no user datasets"),
        }
    }

    #[test]
    fn test_user_classification() {
        let session = session_with(&[(
            "user_activity.csv",
            "USER_ID,CATEGORY,VOLUME_USD\n\
             0xa,DEX,500\n0xa,DEX,500\n\
             0xb,DEX,2000000\n0xb,Lending,10\n\
             0xc,NFT,50000\n",
        )]);
        let section = user_classification(&session, &mut Notices::new())
            .unwrap()
            .into_value()
            .unwrap();

        assert_eq!(section.volume.bucket("Small").unwrap().entities, 1);
        assert_eq!(section.volume.bucket("Medium").unwrap().entities, 1);
        assert_eq!(section.volume.bucket("Whale").unwrap().entities, 1);
        assert_eq!(section.typology.bucket("Single-sector").unwrap().entities, 2);
        assert_eq!(section.typology.bucket("Multi-sector").unwrap().entities, 1);
    }
}
