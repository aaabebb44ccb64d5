//! Aggregation of historical incidents from the events most similar to a query.
//!
//! Closer events weigh more: each event contributes `1 / (1 + distance)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use assetguard_shared::Severity;

use crate::similarity::SimilarEvent;

/// How many of the most frequently hit assets a profile keeps.
const MOST_AFFECTED_LIMIT: usize = 10;

/// Weight of a historical event at `distance` from the query.
pub fn inverse_distance_weight(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Weighted incident statistics for one asset type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetTypeImpact {
    /// Raw number of incidents.
    pub incident_count: usize,
    /// Sum of event weights over incidents.
    pub weighted_incidents: f64,
    /// Weighted incidents per (weighted) similar event, capped at 1.0.
    pub frequency: f64,
    /// Weighted mean of [`Severity::weight`].
    pub average_severity: f64,
    pub average_cost: f64,
    pub average_downtime_hours: f64,
}

/// An individual asset that was hit in the similar events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedAsset {
    pub asset_id: String,
    pub asset_type: String,
    pub incident_count: usize,
}

/// What happened to assets during the events most similar to a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactProfile {
    pub events_considered: usize,
    /// Sum of event weights.
    pub total_weight: f64,
    pub total_incidents: usize,
    pub by_asset_type: BTreeMap<String, AssetTypeImpact>,
    pub by_damage_severity: BTreeMap<Severity, usize>,
    pub total_cost: f64,
    pub total_downtime_hours: f64,
    /// Most frequently hit assets, most incidents first.
    pub most_affected_assets: Vec<AffectedAsset>,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    weight: f64,
    severity: f64,
    cost: f64,
    downtime: f64,
}

impl ImpactProfile {
    /// Aggregate the incidents attached to `similar` events.
    pub fn from_similar(similar: &[SimilarEvent]) -> Self {
        let mut profile = Self {
            events_considered: similar.len(),
            ..Self::default()
        };
        let mut per_type: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut per_asset: BTreeMap<String, (String, usize)> = BTreeMap::new();

        for matched in similar {
            let w = inverse_distance_weight(matched.distance);
            profile.total_weight += w;

            for incident in &matched.event.incidents {
                profile.total_incidents += 1;
                profile.total_cost += incident.cost;
                profile.total_downtime_hours += incident.downtime_hours;
                *profile
                    .by_damage_severity
                    .entry(incident.damage_severity)
                    .or_insert(0) += 1;

                let acc = per_type.entry(incident.asset_type.clone()).or_default();
                acc.count += 1;
                acc.weight += w;
                acc.severity += w * incident.damage_severity.weight();
                acc.cost += w * incident.cost;
                acc.downtime += w * incident.downtime_hours;

                per_asset
                    .entry(incident.asset_id.clone())
                    .or_insert_with(|| (incident.asset_type.clone(), 0))
                    .1 += 1;
            }
        }

        for (asset_type, acc) in per_type {
            let frequency = if profile.total_weight > 0.0 {
                (acc.weight / profile.total_weight).min(1.0)
            } else {
                0.0
            };
            profile.by_asset_type.insert(
                asset_type,
                AssetTypeImpact {
                    incident_count: acc.count,
                    weighted_incidents: acc.weight,
                    frequency,
                    average_severity: acc.severity / acc.weight,
                    average_cost: acc.cost / acc.weight,
                    average_downtime_hours: acc.downtime / acc.weight,
                },
            );
        }

        let mut affected: Vec<AffectedAsset> = per_asset
            .into_iter()
            .map(|(asset_id, (asset_type, incident_count))| AffectedAsset {
                asset_id,
                asset_type,
                incident_count,
            })
            .collect();
        affected.sort_by(|a, b| b.incident_count.cmp(&a.incident_count));
        affected.truncate(MOST_AFFECTED_LIMIT);
        profile.most_affected_assets = affected;

        profile
    }

    /// Frequency score for an asset type; zero when the type was never hit.
    pub fn frequency_for(&self, asset_type: &str) -> f64 {
        self.by_asset_type
            .get(asset_type)
            .map(|impact| impact.frequency)
            .unwrap_or(0.0)
    }

    /// Whether any similar event damaged an asset of this type.
    pub fn affects(&self, asset_type: &str) -> bool {
        self.by_asset_type.contains_key(asset_type)
    }
}
