//! Historical similarity search and asset risk scoring.
//!
//! Pipeline: [`HistoricalIndex::find_similar`] picks the past weather events
//! closest to a trigger, [`ImpactProfile`] aggregates what those events did to
//! each asset type, and [`score_with_profile`] turns that plus the asset
//! register into ranked [`RiskScore`](assetguard_shared::RiskScore)s.
//!
//! Everything here is synchronous and allocation-only; no I/O happens after
//! [`load_reference_data`].

pub mod dataset;
pub mod impact;
pub mod scorer;
pub mod similarity;

pub use dataset::{ReferenceData, load_assets, load_events, load_reference_data};
pub use impact::{AffectedAsset, AssetTypeImpact, ImpactProfile, inverse_distance_weight};
pub use scorer::{
    AGE_HORIZON_YEARS, AGE_WEIGHT, CONDITION_WEIGHT, CRITICALITY_WEIGHT,
    INCIDENT_FREQUENCY_WEIGHT, RejectedAsset, RiskAssessment, SubScores, score_asset,
    score_assets, score_with_profile, select_candidates, sub_scores,
};
pub use similarity::{FeatureStats, HistoricalIndex, SimilarEvent};
