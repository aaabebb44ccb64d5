//! Reference data loading: historical events and the asset register.
//!
//! Both files are JSON arrays. They are read once at startup and then shared
//! read-only between runs.

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use assetguard_shared::{
    AssetGuardError, AssetRiskRecord, DatasetConfig, FEATURE_NAMES, HistoricalEventRecord, Result,
};

use crate::similarity::HistoricalIndex;

fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| AssetGuardError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| AssetGuardError::parse(format!("{}: {e}", path.display())))
}

/// Load historical weather events.
///
/// Every record must carry one value per entry of [`FEATURE_NAMES`].
pub fn load_events(path: &Path) -> Result<Vec<HistoricalEventRecord>> {
    let events: Vec<HistoricalEventRecord> = read_json_array(path)?;
    if let Some(bad) = events.iter().find(|e| e.features.len() != FEATURE_NAMES.len()) {
        return Err(AssetGuardError::validation(format!(
            "event {} in {} has {} features, expected {}",
            bad.event_id,
            path.display(),
            bad.features.len(),
            FEATURE_NAMES.len()
        )));
    }
    Ok(events)
}

/// Load the asset register. Records are not validated here; the scorer
/// rejects incomplete ones individually.
pub fn load_assets(path: &Path) -> Result<Vec<AssetRiskRecord>> {
    let assets: Vec<AssetRiskRecord> = read_json_array(path)?;
    let mut seen = HashSet::new();
    for asset in &assets {
        if !seen.insert(asset.asset_id.as_str()) {
            warn!(asset_id = %asset.asset_id, path = %path.display(), "duplicate asset id in register");
        }
    }
    Ok(assets)
}

/// The historical index and asset register, loaded together.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub index: HistoricalIndex,
    pub assets: Vec<AssetRiskRecord>,
}

impl ReferenceData {
    pub fn new(index: HistoricalIndex, assets: Vec<AssetRiskRecord>) -> Self {
        Self { index, assets }
    }
}

/// Load both reference files named by the `[dataset]` config section.
pub fn load_reference_data(config: &DatasetConfig) -> Result<ReferenceData> {
    let events = load_events(Path::new(&config.events_path))?;
    let assets = load_assets(Path::new(&config.assets_path))?;
    let index = HistoricalIndex::build(events)?;

    info!(
        events = index.len(),
        assets = assets.len(),
        "loaded reference data"
    );
    Ok(ReferenceData::new(index, assets))
}
