//! Scalar KPIs derived from aggregates and series.
//!
//! Every function returns an [`Outcome`]: an empty series, a zero
//! denominator or an unmatched pattern is reported, never turned into NaN.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use super::aggregate::{missing_column, MonthlyAggregate, MonthlySeries};
use super::outcome::Outcome;
use crate::error::ContractResult;
use crate::models::{MonthKey, NormalizedTable};
use crate::notices::NoticeKind;

fn insufficient<T>(reason: impl Into<String>) -> Outcome<T> {
    Outcome::unavailable(NoticeKind::InsufficientData, reason)
}

fn zero_total<T>(month: MonthKey) -> Outcome<T> {
    Outcome::unavailable(
        NoticeKind::ZeroTotalMonth,
        format!("Total for {} is zero", month),
    )
}

/// Largest monthly value and the month it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub month: MonthKey,
    pub value: f64,
}

/// Highest point of a monthly series; the earliest month wins ties.
pub fn peak(points: &BTreeMap<MonthKey, f64>) -> Outcome<Peak> {
    points
        .iter()
        .fold(None::<Peak>, |best, (month, value)| match best {
            Some(b) if b.value >= *value => Some(b),
            _ => Some(Peak {
                month: *month,
                value: *value,
            }),
        })
        .map_or_else(|| insufficient("no data points"), Outcome::Available)
}

/// `last / first - 1` as a fraction.
pub fn growth_since_start(points: &BTreeMap<MonthKey, f64>) -> Outcome<f64> {
    let (Some((first_month, first)), Some((_, last))) = (points.iter().next(), points.iter().next_back()) else {
        return insufficient("no data points");
    };
    if points.len() < 2 {
        return insufficient("growth needs at least two months");
    }
    if *first == 0.0 {
        return insufficient(format!("first value ({}) is zero", first_month));
    }
    Outcome::Available(last / first - 1.0)
}

/// Share of the latest month's total held by categories matching `pattern`.
pub fn latest_matching_share(aggregate: &MonthlyAggregate, pattern: &Regex) -> Outcome<f64> {
    let Some(month) = aggregate.latest_month() else {
        return insufficient("no data points");
    };
    let Some(cats) = aggregate.sums.get(&month) else {
        return insufficient("no data points");
    };
    if !cats.keys().any(|c| pattern.is_match(c)) {
        return insufficient(format!("no category matches '{}' in {}", pattern.as_str(), month));
    }

    let total: f64 = cats.values().sum();
    if total == 0.0 || !total.is_finite() {
        return zero_total(month);
    }
    let matched: f64 = cats
        .iter()
        .filter(|(c, _)| pattern.is_match(c))
        .map(|(_, v)| v)
        .sum();
    Outcome::Available(matched / total)
}

/// Sum of the latest month's values for categories matching `pattern`.
pub fn latest_matching_sum(aggregate: &MonthlyAggregate, pattern: &Regex) -> Outcome<f64> {
    let Some(month) = aggregate.latest_month() else {
        return insufficient("no data points");
    };
    let matched: Vec<f64> = aggregate
        .sums
        .get(&month)
        .into_iter()
        .flatten()
        .filter(|(c, _)| pattern.is_match(c))
        .map(|(_, v)| *v)
        .collect();
    if matched.is_empty() {
        return insufficient(format!("no category matches '{}' in {}", pattern.as_str(), month));
    }
    Outcome::Available(matched.iter().sum())
}

/// The largest category of the latest month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopCategory {
    pub month: MonthKey,
    pub name: String,
    pub value: f64,
    /// Fraction of the month's total; `None` when the total is zero.
    pub share: Option<f64>,
}

/// Largest category in the latest month; name order breaks ties.
pub fn top_category_latest(aggregate: &MonthlyAggregate) -> Outcome<TopCategory> {
    let Some(month) = aggregate.latest_month() else {
        return insufficient("no data points");
    };
    let Some(cats) = aggregate.sums.get(&month) else {
        return insufficient("no data points");
    };
    let total: f64 = cats.values().sum();
    let top = cats
        .iter()
        .fold(None::<(&String, f64)>, |best, (name, value)| match best {
            Some(b) if b.1 >= *value => Some(b),
            _ => Some((name, *value)),
        });
    match top {
        Some((name, value)) => Outcome::Available(TopCategory {
            month,
            name: name.clone(),
            value,
            share: (total != 0.0 && total.is_finite()).then(|| value / total),
        }),
        None => insufficient(format!("no categories in {}", month)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Smallest and largest value of a series.
pub fn value_range(points: &BTreeMap<MonthKey, f64>) -> Outcome<ValueRange> {
    let mut values = points.values().copied().filter(|v| v.is_finite());
    let Some(first) = values.next() else {
        return insufficient("no data points");
    };
    let range = values.fold(ValueRange { min: first, max: first }, |r, v| ValueRange {
        min: r.min.min(v),
        max: r.max.max(v),
    });
    Outcome::Available(range)
}

/// `numerator / denominator` at the latest month both series cover.
pub fn latest_ratio(numerator: &MonthlySeries, denominator: &MonthlySeries) -> Outcome<f64> {
    let latest = numerator
        .points
        .iter()
        .rev()
        .find_map(|(m, n)| denominator.points.get(m).map(|d| (*m, *n, *d)));
    match latest {
        None => insufficient(format!(
            "'{}' and '{}' share no month",
            numerator.name, denominator.name
        )),
        Some((month, _, d)) if d == 0.0 => insufficient(format!("'{}' is zero in {}", denominator.name, month)),
        Some((_, n, d)) => Outcome::Available(n / d),
    }
}

/// Ratio of group means: mean over groups matching `numerator` of each
/// group's mean `value`, divided by the same for `denominator`.
pub fn group_mean_ratio(
    table: &NormalizedTable,
    group: &str,
    value: &str,
    numerator: &Regex,
    denominator: &Regex,
) -> ContractResult<Outcome<f64>> {
    let Some(groups) = table.labels(group)? else {
        return Ok(missing_column(group));
    };
    let Some(values) = table.numbers(value)? else {
        return Ok(missing_column(value));
    };

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (g, v) in groups.iter().zip(values.iter()) {
        if let (Some(g), Some(v)) = (g, v) {
            let entry = sums.entry(g.as_str()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    let means: Vec<(&str, f64)> = sums.iter().map(|(g, (s, n))| (*g, s / *n as f64)).collect();

    let mean_of = |pattern: &Regex| -> Option<f64> {
        let matched: Vec<f64> = means.iter().filter(|(g, _)| pattern.is_match(g)).map(|(_, m)| *m).collect();
        (!matched.is_empty()).then(|| matched.iter().sum::<f64>() / matched.len() as f64)
    };

    let (Some(num), Some(den)) = (mean_of(numerator), mean_of(denominator)) else {
        return Ok(insufficient(format!(
            "'{}' needs groups matching both '{}' and '{}'",
            group,
            numerator.as_str(),
            denominator.as_str()
        )));
    };
    if den == 0.0 {
        return Ok(insufficient(format!("mean for '{}' is zero", denominator.as_str())));
    }
    Ok(Outcome::Available(num / den))
}
