//! Weighted per-asset risk scoring.
//!
//! ```text
//! score = 0.40 * incident_frequency
//!       + 0.30 * (1 - current_condition)
//!       + 0.20 * min(age_years / 30, 1)
//!       + 0.10 * criticality
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use assetguard_shared::{
    AssetGuardError, AssetRiskRecord, ContributingFactors, Result, RiskScore, RiskTier,
};

use crate::impact::ImpactProfile;
use crate::similarity::SimilarEvent;

pub const INCIDENT_FREQUENCY_WEIGHT: f64 = 0.40;
pub const CONDITION_WEIGHT: f64 = 0.30;
pub const AGE_WEIGHT: f64 = 0.20;
pub const CRITICALITY_WEIGHT: f64 = 0.10;

/// Age at which the age sub-score saturates.
pub const AGE_HORIZON_YEARS: f64 = 30.0;

/// Unweighted sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
    pub incident_frequency: f64,
    pub current_condition: f64,
    pub age: f64,
    pub criticality: f64,
}

impl SubScores {
    /// Apply the fixed weights.
    pub fn weighted(&self) -> ContributingFactors {
        ContributingFactors {
            incident_frequency: INCIDENT_FREQUENCY_WEIGHT * self.incident_frequency,
            current_condition: CONDITION_WEIGHT * self.current_condition,
            age: AGE_WEIGHT * self.age,
            criticality: CRITICALITY_WEIGHT * self.criticality,
        }
    }

    pub fn score(&self) -> f64 {
        self.weighted().total().clamp(0.0, 1.0)
    }
}

fn required(record: &AssetRiskRecord, field: &str, value: Option<f64>) -> Result<f64> {
    let value = value.ok_or_else(|| invalid(record, format!("missing {field}")))?;
    if !value.is_finite() {
        return Err(invalid(record, format!("{field} is not a finite number")));
    }
    Ok(value)
}

fn unit_interval(record: &AssetRiskRecord, field: &str, value: Option<f64>) -> Result<f64> {
    let value = required(record, field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(record, format!("{field} {value} outside [0, 1]")));
    }
    Ok(value)
}

fn invalid(record: &AssetRiskRecord, reason: String) -> AssetGuardError {
    AssetGuardError::InvalidAssetRecord {
        asset_id: record.asset_id.clone(),
        reason,
    }
}

/// Validate a record and derive its sub-scores against `profile`.
pub fn sub_scores(record: &AssetRiskRecord, profile: &ImpactProfile) -> Result<SubScores> {
    let own_frequency = unit_interval(record, "incident_frequency", record.incident_frequency)?;
    let condition = unit_interval(record, "current_condition", record.current_condition)?;
    let criticality = unit_interval(record, "criticality", record.criticality)?;
    let age_years = required(record, "age_years", record.age_years)?;
    if age_years < 0.0 {
        return Err(invalid(record, format!("age_years {age_years} is negative")));
    }

    Ok(SubScores {
        incident_frequency: profile.frequency_for(&record.asset_type).max(own_frequency),
        current_condition: 1.0 - condition,
        age: (age_years / AGE_HORIZON_YEARS).min(1.0),
        criticality,
    })
}

/// Score one asset.
pub fn score_asset(record: &AssetRiskRecord, profile: &ImpactProfile) -> Result<RiskScore> {
    let subs = sub_scores(record, profile)?;
    let score = subs.score();
    Ok(RiskScore {
        asset_id: record.asset_id.clone(),
        asset_type: record.asset_type.clone(),
        score,
        tier: RiskTier::from_score(score),
        contributing_factors: subs.weighted(),
    })
}

/// An asset left out of scoring, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAsset {
    pub asset_id: String,
    pub reason: String,
}

/// Scored assets (highest first) plus the ones that could not be scored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub scores: Vec<RiskScore>,
    #[serde(default)]
    pub rejected: Vec<RejectedAsset>,
}

impl RiskAssessment {
    /// Number of scored assets per tier. Every tier is present.
    pub fn tier_distribution(&self) -> BTreeMap<RiskTier, usize> {
        let mut counts: BTreeMap<RiskTier, usize> =
            RiskTier::ALL.iter().map(|tier| (*tier, 0)).collect();
        for score in &self.scores {
            *counts.entry(score.tier).or_insert(0) += 1;
        }
        counts
    }

    /// Scores at or above `tier`, still highest first.
    pub fn at_or_above(&self, tier: RiskTier) -> Vec<&RiskScore> {
        self.scores.iter().filter(|s| s.tier >= tier).collect()
    }
}

/// Score every candidate against a precomputed impact profile.
///
/// Invalid records are logged and reported in [`RiskAssessment::rejected`];
/// they never get default values.
pub fn score_with_profile(profile: &ImpactProfile, candidates: &[AssetRiskRecord]) -> RiskAssessment {
    let mut assessment = RiskAssessment::default();

    for record in candidates {
        match score_asset(record, profile) {
            Ok(score) => assessment.scores.push(score),
            Err(AssetGuardError::InvalidAssetRecord { asset_id, reason }) => {
                warn!(asset_id = %asset_id, reason = %reason, "excluding asset from risk scoring");
                assessment.rejected.push(RejectedAsset { asset_id, reason });
            }
            Err(other) => {
                warn!(asset_id = %record.asset_id, error = %other, "excluding asset from risk scoring");
                assessment.rejected.push(RejectedAsset {
                    asset_id: record.asset_id.clone(),
                    reason: other.to_string(),
                });
            }
        }
    }

    // Stable: equal scores keep candidate order.
    assessment
        .scores
        .sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!(
        scored = assessment.scores.len(),
        rejected = assessment.rejected.len(),
        "scored candidate assets"
    );
    assessment
}

/// Aggregate `similar` and score every candidate.
pub fn score_assets(similar: &[SimilarEvent], candidates: &[AssetRiskRecord]) -> RiskAssessment {
    score_with_profile(&ImpactProfile::from_similar(similar), candidates)
}

/// Register entries whose asset type was damaged in the similar events.
pub fn select_candidates(profile: &ImpactProfile, register: &[AssetRiskRecord]) -> Vec<AssetRiskRecord> {
    register
        .iter()
        .filter(|asset| profile.affects(&asset.asset_type))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetguard_shared::{HistoricalEventRecord, Incident, Severity};

    fn asset(id: &str, freq: f64, condition: f64, age: f64, criticality: f64) -> AssetRiskRecord {
        AssetRiskRecord {
            asset_id: id.into(),
            name: None,
            asset_type: "PowerLine".into(),
            incident_frequency: Some(freq),
            current_condition: Some(condition),
            age_years: Some(age),
            criticality: Some(criticality),
        }
    }

    fn empty() -> ImpactProfile {
        ImpactProfile::default()
    }

    #[test]
    fn frequency_alone_scores_exactly_its_weight() {
        let score = score_asset(&asset("A", 1.0, 1.0, 0.0, 0.0), &empty()).expect("score");
        assert_eq!(score.score, 0.40);
        assert_eq!(score.tier, RiskTier::Medium);
        assert_eq!(score.contributing_factors.incident_frequency, 0.40);
        assert_eq!(score.contributing_factors.current_condition, 0.0);
    }

    #[test]
    fn worst_case_is_capped_at_one() {
        let score = score_asset(&asset("A", 1.0, 0.0, 45.0, 1.0), &empty()).expect("score");
        assert!(score.score <= 1.0);
        assert!((score.score - 1.0).abs() < 1e-12);
        assert_eq!(score.tier, RiskTier::Critical);
    }

    #[test]
    fn monotonic_in_each_input() {
        let profile = empty();
        let base = score_asset(&asset("A", 0.3, 0.6, 10.0, 0.5), &profile)
            .expect("score")
            .score;
        let raised = [
            asset("A", 0.6, 0.6, 10.0, 0.5),
            asset("A", 0.3, 0.2, 10.0, 0.5),
            asset("A", 0.3, 0.6, 20.0, 0.5),
            asset("A", 0.3, 0.6, 10.0, 0.9),
        ];
        for record in &raised {
            let s = score_asset(record, &profile).expect("score").score;
            assert!(s > base, "{s} should exceed {base} for {record:?}");
        }
    }

    #[test]
    fn age_saturates_at_horizon() {
        let profile = empty();
        let at_horizon = score_asset(&asset("A", 0.0, 1.0, 30.0, 0.0), &profile).expect("score");
        let beyond = score_asset(&asset("A", 0.0, 1.0, 60.0, 0.0), &profile).expect("score");
        assert_eq!(at_horizon.score, beyond.score);
        assert!((at_horizon.score - 0.20).abs() < 1e-12);
    }

    #[test]
    fn type_frequency_can_outweigh_own_history() {
        let similar = vec![SimilarEvent {
            event: HistoricalEventRecord {
                event_id: 1,
                date: None,
                event_type: "Strong Winds".into(),
                severity: Some(Severity::High),
                features: vec![0.0],
                incidents: vec![Incident {
                    asset_id: "PL-9".into(),
                    asset_type: "PowerLine".into(),
                    damage_severity: Severity::High,
                    cost: 100.0,
                    downtime_hours: 2.0,
                }],
            },
            distance: 0.0,
        }];
        let assessment = score_assets(&similar, &[asset("A", 0.1, 1.0, 0.0, 0.0)]);
        assert!((assessment.scores[0].score - 0.40).abs() < 1e-12);
    }

    #[test]
    fn invalid_records_are_excluded_not_defaulted() {
        let mut missing = asset("MISSING", 0.5, 0.5, 5.0, 0.5);
        missing.current_condition = None;
        let out_of_range = asset("RANGE", 1.5, 0.5, 5.0, 0.5);
        let negative_age = asset("AGE", 0.5, 0.5, -1.0, 0.5);
        let good = asset("GOOD", 0.5, 0.5, 5.0, 0.5);

        let assessment = score_with_profile(&empty(), &[missing, out_of_range, negative_age, good]);
        assert_eq!(assessment.scores.len(), 1);
        assert_eq!(assessment.scores[0].asset_id, "GOOD");
        let rejected: Vec<&str> = assessment.rejected.iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(rejected, vec!["MISSING", "RANGE", "AGE"]);
        assert!(assessment.rejected[0].reason.contains("current_condition"));
    }

    #[test]
    fn sorted_descending_with_stable_ties() {
        let assessment = score_with_profile(
            &empty(),
            &[
                asset("LOW", 0.0, 1.0, 0.0, 0.1),
                asset("TIE-1", 0.5, 0.5, 15.0, 0.5),
                asset("TOP", 1.0, 0.0, 30.0, 1.0),
                asset("TIE-2", 0.5, 0.5, 15.0, 0.5),
            ],
        );
        let ids: Vec<&str> = assessment.scores.iter().map(|s| s.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["TOP", "TIE-1", "TIE-2", "LOW"]);
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let candidates = vec![asset("A", 0.2, 0.4, 12.0, 0.8), asset("B", 0.9, 0.1, 40.0, 0.3)];
        let first = score_with_profile(&empty(), &candidates);
        let second = score_with_profile(&empty(), &candidates);
        assert_eq!(first, second);
    }

    #[test]
    fn tier_distribution_and_threshold_filter() {
        let assessment = score_with_profile(
            &empty(),
            &[
                asset("CRIT", 1.0, 0.0, 30.0, 1.0),
                asset("MED", 1.0, 1.0, 0.0, 0.0),
                asset("LOW", 0.0, 1.0, 0.0, 0.0),
            ],
        );
        let dist = assessment.tier_distribution();
        assert_eq!(dist[&RiskTier::Critical], 1);
        assert_eq!(dist[&RiskTier::High], 0);
        assert_eq!(dist[&RiskTier::Medium], 1);
        assert_eq!(dist[&RiskTier::Low], 1);

        let urgent = assessment.at_or_above(RiskTier::High);
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].asset_id, "CRIT");
    }

    #[test]
    fn candidates_follow_affected_types() {
        let mut profile = empty();
        profile
            .by_asset_type
            .insert("PowerLine".into(), Default::default());
        let mut transformer = asset("TR-1", 0.1, 0.9, 1.0, 0.2);
        transformer.asset_type = "Transformer".into();
        let picked = select_candidates(&profile, &[asset("PL-1", 0.1, 0.9, 1.0, 0.2), transformer]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].asset_id, "PL-1");
    }
}
