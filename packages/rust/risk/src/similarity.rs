//! Historical-event matcher.
//!
//! Features are z-score normalized with statistics computed once over the
//! whole dataset when the index is built. Queries are normalized with those
//! same statistics, so distances from different queries stay comparable.

use serde::{Deserialize, Serialize};
use tracing::debug;

use assetguard_shared::{AssetGuardError, HistoricalEventRecord, Result};

/// Mean and sample standard deviation of one feature dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl FeatureStats {
    fn from_column(values: impl Iterator<Item = f64> + Clone) -> Self {
        let n = values.clone().count();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let mean = values.clone().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        Self { mean, std_dev }
    }

    /// Z-score of `value`; a constant dimension normalizes to zero.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.std_dev > 0.0 {
            (value - self.mean) / self.std_dev
        } else {
            0.0
        }
    }
}

/// A historical event matched against a query, with its distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEvent {
    pub event: HistoricalEventRecord,
    pub distance: f64,
}

/// Immutable k-nearest-neighbour index over historical weather events.
#[derive(Debug, Clone)]
pub struct HistoricalIndex {
    records: Vec<HistoricalEventRecord>,
    normalized: Vec<Vec<f64>>,
    stats: Vec<FeatureStats>,
}

impl HistoricalIndex {
    /// Build the index, computing normalization statistics over `records`.
    ///
    /// An empty dataset is accepted here; searching it fails with
    /// [`AssetGuardError::NoHistoricalData`].
    pub fn build(records: Vec<HistoricalEventRecord>) -> Result<Self> {
        let dims = records.first().map(|r| r.features.len()).unwrap_or(0);

        for record in &records {
            if record.features.len() != dims {
                return Err(AssetGuardError::validation(format!(
                    "event {} has {} features, expected {dims}",
                    record.event_id,
                    record.features.len()
                )));
            }
            if record.features.iter().any(|v| !v.is_finite()) {
                return Err(AssetGuardError::validation(format!(
                    "event {} has a non-finite feature",
                    record.event_id
                )));
            }
        }
        if !records.is_empty() && dims == 0 {
            return Err(AssetGuardError::validation("historical events carry no features"));
        }

        let stats: Vec<FeatureStats> = (0..dims)
            .map(|d| FeatureStats::from_column(records.iter().map(move |r| r.features[d])))
            .collect();

        let normalized = records
            .iter()
            .map(|r| normalize_with(&stats, &r.features))
            .collect();

        debug!(events = records.len(), dims, "built historical index");

        Ok(Self {
            records,
            normalized,
            stats,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of feature dimensions (0 for an empty index).
    pub fn dimensions(&self) -> usize {
        self.stats.len()
    }

    /// Per-dimension normalization statistics.
    pub fn stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    pub fn records(&self) -> &[HistoricalEventRecord] {
        &self.records
    }

    /// Normalize a query with the dataset's statistics.
    pub fn normalize(&self, features: &[f64]) -> Vec<f64> {
        normalize_with(&self.stats, features)
    }

    /// Return up to `k` records closest to `query`, ascending by distance.
    ///
    /// Records at equal distance keep their dataset order.
    pub fn find_similar(&self, query: &[f64], k: usize) -> Result<Vec<SimilarEvent>> {
        if self.records.is_empty() {
            return Err(AssetGuardError::NoHistoricalData);
        }
        if k == 0 {
            return Err(AssetGuardError::validation("k must be greater than zero"));
        }
        if query.len() != self.dimensions() {
            return Err(AssetGuardError::validation(format!(
                "query has {} features, expected {}",
                query.len(),
                self.dimensions()
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(AssetGuardError::validation("query has a non-finite feature"));
        }

        let query = self.normalize(query);
        let mut ranked: Vec<(usize, f64)> = self
            .normalized
            .iter()
            .map(|row| euclidean(&query, row))
            .enumerate()
            .collect();

        // `sort_by` is stable: ties keep dataset order.
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(idx, distance)| SimilarEvent {
                event: self.records[idx].clone(),
                distance,
            })
            .collect())
    }
}

fn normalize_with(stats: &[FeatureStats], features: &[f64]) -> Vec<f64> {
    stats
        .iter()
        .zip(features)
        .map(|(s, &v)| s.normalize(v))
        .collect()
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
