//! Cohort and typology classification of entities.
//!
//! A [`CohortScheme`] is an ordered list of bands with inclusive upper
//! bounds. A value falls into the first band whose bound it does not exceed,
//! so a value exactly on a boundary belongs to the lower-magnitude cohort.
//! Only the last band may be unbounded.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::aggregate::missing_column;
use super::outcome::Outcome;
use crate::error::{ConfigError, ConfigResult, ContractResult};
use crate::models::NormalizedTable;

/// One cohort band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortBand {
    pub name: String,
    /// Inclusive upper bound; `None` means unbounded.
    #[serde(default)]
    pub upper: Option<f64>,
}

impl CohortBand {
    pub fn new(name: impl Into<String>, upper: Option<f64>) -> Self {
        Self {
            name: name.into(),
            upper,
        }
    }
}

/// An ordered set of cohort bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortScheme {
    pub name: String,
    pub bands: Vec<CohortBand>,
}

impl CohortScheme {
    /// Volume cohorts in USD: small, medium, large, whale.
    pub fn volume_default() -> Self {
        Self {
            name: "volume".into(),
            bands: vec![
                CohortBand::new("Small", Some(1_000.0)),
                CohortBand::new("Medium", Some(100_000.0)),
                CohortBand::new("Large", Some(1_000_000.0)),
                CohortBand::new("Whale", None),
            ],
        }
    }

    /// Typology by number of distinct sectors used.
    pub fn typology_default() -> Self {
        Self {
            name: "typology".into(),
            bands: vec![
                CohortBand::new("Single-sector", Some(1.0)),
                CohortBand::new("Multi-sector", None),
            ],
        }
    }

    /// Check the bands are non-empty, uniquely named, strictly increasing
    /// and unbounded only in last position.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| ConfigError::InvalidCohortScheme {
            scheme: self.name.clone(),
            message,
        };

        if self.bands.is_empty() {
            return Err(invalid("no bands defined".into()));
        }

        let mut names = BTreeSet::new();
        let mut previous: Option<f64> = None;
        let last = self.bands.len() - 1;
        for (i, band) in self.bands.iter().enumerate() {
            if band.name.trim().is_empty() {
                return Err(invalid(format!("band {} has an empty name", i)));
            }
            if !names.insert(band.name.as_str()) {
                return Err(invalid(format!("band '{}' is defined twice", band.name)));
            }
            match band.upper {
                None if i != last => {
                    return Err(invalid(format!("band '{}' is unbounded but not last", band.name)));
                }
                None => {}
                Some(upper) if !upper.is_finite() => {
                    return Err(invalid(format!("band '{}' has a non-finite bound", band.name)));
                }
                Some(upper) => {
                    if let Some(prev) = previous {
                        if upper <= prev {
                            return Err(invalid(format!(
                                "band '{}' bound {} does not exceed previous bound {}",
                                band.name, upper, prev
                            )));
                        }
                    }
                    previous = Some(upper);
                }
            }
        }
        Ok(())
    }

    /// Band name for `value`, or `None` if it lies above every bound or is NaN.
    pub fn classify(&self, value: f64) -> Option<&str> {
        if value.is_nan() {
            return None;
        }
        self.bands
            .iter()
            .find(|band| band.upper.map_or(true, |upper| value <= upper))
            .map(|band| band.name.as_str())
    }
}

/// Entities that landed in one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortBucket {
    pub name: String,
    pub entities: usize,
    /// Sum of the classified metric over the bucket's entities.
    pub total_value: f64,
    /// Fraction of classified entities; `None` when nothing was classified.
    pub share: Option<f64>,
}

/// Result of classifying every entity of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortDistribution {
    pub scheme: String,
    /// One bucket per band, in band order.
    pub buckets: Vec<CohortBucket>,
    /// Entities whose metric exceeded every bound.
    pub unclassified: usize,
}

impl CohortDistribution {
    pub fn bucket(&self, name: &str) -> Option<&CohortBucket> {
        self.buckets.iter().find(|b| b.name == name)
    }

    pub fn classified(&self) -> usize {
        self.buckets.iter().map(|b| b.entities).sum()
    }
}

fn distribute<'a>(scheme: &CohortScheme, metrics: impl Iterator<Item = &'a f64>) -> CohortDistribution {
    let mut counts: HashMap<&str, (usize, f64)> = HashMap::new();
    let mut unclassified = 0;
    for &metric in metrics {
        match scheme.classify(metric) {
            Some(name) => {
                let entry = counts.entry(name).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += metric;
            }
            None => unclassified += 1,
        }
    }

    let classified: usize = counts.values().map(|(n, _)| n).sum();
    let buckets = scheme
        .bands
        .iter()
        .map(|band| {
            let (entities, total_value) = counts.get(band.name.as_str()).copied().unwrap_or((0, 0.0));
            CohortBucket {
                name: band.name.clone(),
                entities,
                total_value,
                share: (classified > 0).then(|| entities as f64 / classified as f64),
            }
        })
        .collect();

    CohortDistribution {
        scheme: scheme.name.clone(),
        buckets,
        unclassified,
    }
}

/// Sum `value` per entity and bucket each entity by its total.
///
/// Rows with a null entity or value are skipped.
pub fn classify_by_volume(
    table: &NormalizedTable,
    entity: &str,
    value: &str,
    scheme: &CohortScheme,
) -> ContractResult<Outcome<CohortDistribution>> {
    let Some(entities) = table.labels(entity)? else {
        return Ok(missing_column(entity));
    };
    let Some(values) = table.numbers(value)? else {
        return Ok(missing_column(value));
    };

    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for (id, amount) in entities.iter().zip(values.iter()) {
        if let (Some(id), Some(amount)) = (id, amount) {
            *totals.entry(id.as_str()).or_insert(0.0) += amount;
        }
    }

    Ok(Outcome::Available(distribute(scheme, totals.values())))
}

/// Count distinct categories per entity and bucket each entity by that count.
pub fn classify_by_breadth(
    table: &NormalizedTable,
    entity: &str,
    category: &str,
    scheme: &CohortScheme,
) -> ContractResult<Outcome<CohortDistribution>> {
    let Some(entities) = table.labels(entity)? else {
        return Ok(missing_column(entity));
    };
    let Some(categories) = table.labels(category)? else {
        return Ok(missing_column(category));
    };

    let mut seen: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (id, cat) in entities.iter().zip(categories.iter()) {
        if let (Some(id), Some(cat)) = (id, cat) {
            seen.entry(id.as_str()).or_default().insert(cat.as_str());
        }
    }
    let breadths: Vec<f64> = seen.values().map(|cats| cats.len() as f64).collect();

    Ok(Outcome::Available(distribute(scheme, breadths.iter())))
}
