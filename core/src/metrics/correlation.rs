//! Pearson correlation and OLS trendline over aligned series.

use serde::Serialize;

use super::aggregate::{missing_column, MonthlySeries};
use super::outcome::Outcome;
use crate::error::{ContractResult, ContractViolation};
use crate::models::{NormalizedTable, ScatterPoint};
use crate::notices::NoticeKind;

/// Fewest aligned points a correlation is computed from.
pub const MIN_ALIGNED_POINTS: usize = 3;

/// `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
}

impl Trendline {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResult {
    pub pearson_r: f64,
    pub trendline: Trendline,
    /// Number of aligned points used.
    pub points: usize,
}

fn both_finite(x: &Option<f64>, y: &Option<f64>) -> Option<(f64, f64)> {
    match (x, y) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
        _ => None,
    }
}

/// Correlate two position-aligned series.
///
/// Only positions where both values are present and finite are used.
pub fn correlate(x: &[Option<f64>], y: &[Option<f64>]) -> ContractResult<Outcome<CorrelationResult>> {
    if x.len() != y.len() {
        return Err(ContractViolation::SeriesLength {
            left: x.len(),
            right: y.len(),
        });
    }

    let pairs: Vec<(f64, f64)> = x.iter().zip(y.iter()).filter_map(|(a, b)| both_finite(a, b)).collect();
    let n = pairs.len();
    if n < MIN_ALIGNED_POINTS {
        return Ok(Outcome::unavailable(
            NoticeKind::InsufficientCorrelationData,
            format!(
                "{} aligned points; at least {} are needed for a correlation",
                n, MIN_ALIGNED_POINTS
            ),
        ));
    }

    let count = n as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / count;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / count;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        let which = if sxx == 0.0 { "x" } else { "y" };
        return Ok(Outcome::unavailable(
            NoticeKind::InsufficientCorrelationData,
            format!("constant series ({}); correlation is undefined", which),
        ));
    }

    let pearson_r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let slope = sxy / sxx;
    Ok(Outcome::Available(CorrelationResult {
        pearson_r,
        trendline: Trendline {
            slope,
            intercept: mean_y - slope * mean_x,
        },
        points: n,
    }))
}

/// Correlate two columns of the same table.
pub fn correlate_columns(table: &NormalizedTable, x: &str, y: &str) -> ContractResult<Outcome<CorrelationResult>> {
    let Some(xs) = table.numbers(x)? else {
        return Ok(missing_column(x));
    };
    let Some(ys) = table.numbers(y)? else {
        return Ok(missing_column(y));
    };
    correlate(&xs, &ys)
}

/// Align two monthly series on the union of their months.
///
/// A month present in only one series yields `None` on the other side.
pub fn align_by_month(a: &MonthlySeries, b: &MonthlySeries) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mut months: Vec<_> = a.points.keys().chain(b.points.keys()).copied().collect();
    months.sort();
    months.dedup();
    months
        .iter()
        .map(|m| (a.points.get(m).copied(), b.points.get(m).copied()))
        .unzip()
}

/// Scatter rows for `x` against `y`, sized by `weight` when that column exists.
///
/// Rows missing x or y are dropped; a missing weight counts as 1.
pub fn scatter_points(
    table: &NormalizedTable,
    x: &str,
    y: &str,
    weight: Option<&str>,
) -> ContractResult<Outcome<Vec<ScatterPoint>>> {
    let Some(xs) = table.numbers(x)? else {
        return Ok(missing_column(x));
    };
    let Some(ys) = table.numbers(y)? else {
        return Ok(missing_column(y));
    };
    let weights = match weight {
        Some(name) => table.numbers(name)?,
        None => None,
    };

    let points = xs
        .iter()
        .zip(ys.iter())
        .enumerate()
        .filter_map(|(i, (a, b))| {
            let (x, y) = both_finite(a, b)?;
            let weight = weights
                .as_ref()
                .and_then(|w| w.get(i).copied().flatten())
                .unwrap_or(1.0);
            Some(ScatterPoint { x, y, weight })
        })
        .collect();
    Ok(Outcome::Available(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, MonthKey, NamedColumn};
    use crate::metrics::aggregate::Coverage;
    use std::collections::BTreeMap;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_two_points_insufficient_three_computed() {
        let two = correlate(&some(&[1.0, 2.0]), &some(&[2.0, 4.0])).unwrap();
        match two {
            Outcome::Unavailable(u) => assert_eq!(u.kind, NoticeKind::InsufficientCorrelationData),
            Outcome::Available(_) => panic!("two points must not correlate"),
        }

        let three = correlate(&some(&[1.0, 2.0, 3.0]), &some(&[2.0, 4.0, 6.0]))
            .unwrap()
            .into_value()
            .unwrap();
        assert!((three.pearson_r - 1.0).abs() < 1e-12);
        assert!((three.trendline.slope - 2.0).abs() < 1e-12);
        assert!(three.trendline.intercept.abs() < 1e-12);
        assert_eq!(three.points, 3);
    }

    #[test]
    fn test_nulls_are_skipped_pairwise() {
        let x = vec![Some(1.0), None, Some(2.0), Some(3.0), Some(4.0)];
        let y = vec![Some(8.0), Some(1.0), None, Some(6.0), Some(5.0)];
        let result = correlate(&x, &y).unwrap().into_value().unwrap();
        assert_eq!(result.points, 3);
        assert!(result.pearson_r < 0.0);
        assert!((result.trendline.slope + 1.0).abs() < 1e-12);
        assert!((result.trendline.at(1.0) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_is_unavailable() {
        let outcome = correlate(&some(&[1.0, 2.0, 3.0]), &some(&[5.0, 5.0, 5.0])).unwrap();
        match outcome {
            Outcome::Unavailable(u) => {
                assert_eq!(u.kind, NoticeKind::InsufficientCorrelationData);
                assert!(u.reason.contains("constant series"));
            }
            Outcome::Available(_) => panic!("constant series must not correlate"),
        }
    }

    #[test]
    fn test_length_mismatch_is_a_violation() {
        let err = correlate(&some(&[1.0, 2.0, 3.0]), &some(&[1.0])).unwrap_err();
        assert_eq!(err, ContractViolation::SeriesLength { left: 3, right: 1 });
    }

    #[test]
    fn test_align_by_month_union() {
        let series = |name: &str, points: &[(u32, f64)]| MonthlySeries {
            name: name.into(),
            points: points
                .iter()
                .map(|(m, v)| (MonthKey::new(2024, *m), *v))
                .collect::<BTreeMap<_, _>>(),
            coverage: Coverage::default(),
        };
        let a = series("a", &[(1, 1.0), (2, 2.0)]);
        let b = series("b", &[(2, 20.0), (3, 30.0)]);
        let (xa, xb) = align_by_month(&a, &b);
        assert_eq!(xa, vec![Some(1.0), Some(2.0), None]);
        assert_eq!(xb, vec![None, Some(20.0), Some(30.0)]);
    }

    #[test]
    fn test_scatter_weights() {
        let table = NormalizedTable::new(vec![
            NamedColumn {
                name: "PRICE".into(),
                column: Column::Numeric(some(&[1.0, 2.0, 3.0])),
            },
            NamedColumn {
                name: "FEE".into(),
                column: Column::Numeric(vec![Some(0.1), None, Some(0.3)]),
            },
            NamedColumn {
                name: "TX".into(),
                column: Column::Numeric(vec![None, Some(5.0), Some(7.0)]),
            },
        ])
        .unwrap();

        let points = scatter_points(&table, "PRICE", "FEE", Some("TX")).unwrap().into_value().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].weight, 1.0);
        assert_eq!(points[1].weight, 7.0);

        let unweighted = scatter_points(&table, "PRICE", "FEE", Some("ABSENT"))
            .unwrap()
            .into_value()
            .unwrap();
        assert!(unweighted.iter().all(|p| p.weight == 1.0));

        let correlated = correlate_columns(&table, "PRICE", "FEE").unwrap();
        assert!(!correlated.is_available());
    }
}
