//! Application configuration for AssetGuard.
//!
//! User config lives at `~/.assetguard/assetguard.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collaborators::Priority;
use crate::error::{AssetGuardError, Result};
use crate::types::RiskTier;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "assetguard.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".assetguard";

// ---------------------------------------------------------------------------
// Config structs (matching assetguard.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which collaborator implementations to wire in.
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// CMMS (work order system) settings.
    #[serde(default)]
    pub cmms: CmmsConfig,

    /// Classifier and detector settings.
    #[serde(default)]
    pub vision: VisionConfig,

    /// Reference data locations.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Proactive pipeline policy.
    #[serde(default)]
    pub proactive: ProactiveConfig,

    /// Reactive pipeline policy.
    #[serde(default)]
    pub reactive: ReactiveConfig,

    /// Run audit log.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Collaborator implementation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorMode {
    /// Offline implementations: filename classifier, canned detector, in-memory CMMS.
    #[default]
    Mock,
    /// HTTP clients against the configured services.
    Live,
}

/// `[collaborators]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default)]
    pub mode: CollaboratorMode,
}

/// `[cmms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmmsConfig {
    /// API root, e.g. `http://localhost:3000/api`.
    #[serde(default = "default_cmms_base_url")]
    pub base_url: String,

    /// Name of the env var holding the CMMS username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Name of the env var holding the CMMS password (never store it here).
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Days until a new work order is due (critical work orders get 3).
    #[serde(default = "default_days_until_due")]
    pub days_until_due: i64,
}

impl Default for CmmsConfig {
    fn default() -> Self {
        Self {
            base_url: default_cmms_base_url(),
            username_env: default_username_env(),
            password_env: default_password_env(),
            timeout_secs: default_timeout_secs(),
            days_until_due: default_days_until_due(),
        }
    }
}

fn default_cmms_base_url() -> String {
    "http://localhost:3000/api".into()
}
fn default_username_env() -> String {
    "CMMS_USERNAME".into()
}
fn default_password_env() -> String {
    "CMMS_PASSWORD".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_days_until_due() -> i64 {
    7
}

/// `[vision]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Classifier predict endpoint (live mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_endpoint: Option<String>,

    /// Name of the env var holding the classifier bearer token.
    #[serde(default = "default_classifier_token_env")]
    pub classifier_token_env: String,

    /// Detection inference API root.
    #[serde(default = "default_detector_url")]
    pub detector_url: String,

    /// Name of the env var holding the detector API key.
    #[serde(default = "default_detector_api_key_env")]
    pub detector_api_key_env: String,

    /// Minimum classifier confidence for a label to count.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Asset category → detection model id. The keys are also the categories
    /// the classifier treats as relevant.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            classifier_endpoint: None,
            classifier_token_env: default_classifier_token_env(),
            detector_url: default_detector_url(),
            detector_api_key_env: default_detector_api_key_env(),
            confidence_threshold: default_confidence_threshold(),
            models: default_models(),
        }
    }
}

impl VisionConfig {
    /// Detection model for an asset category.
    pub fn model_for(&self, asset_type: &str) -> Result<&str> {
        self.models.get(asset_type).map(String::as_str).ok_or_else(|| {
            AssetGuardError::config(format!("no detection model configured for '{asset_type}'"))
        })
    }

    /// Categories the classifier may report.
    pub fn categories(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }
}

fn default_classifier_token_env() -> String {
    "VISION_CLASSIFIER_TOKEN".into()
}
fn default_detector_url() -> String {
    "https://serverless.roboflow.com".into()
}
fn default_detector_api_key_env() -> String {
    "ROBOFLOW_API_KEY".into()
}
fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_models() -> BTreeMap<String, String> {
    [
        ("ElectricityDistribution", "electricity-distribution-faults/1"),
        ("PCB", "pcb-defects/1"),
        ("RailwayTrack", "railway-track-defects/1"),
        ("TrainWagon", "train-wagon-damage/1"),
        ("TrainWheel", "train-wheel-defects/1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `[dataset]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON file with historical weather events and their incidents.
    #[serde(default = "default_events_path")]
    pub events_path: String,

    /// JSON file with the asset register.
    #[serde(default = "default_assets_path")]
    pub assets_path: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            events_path: default_events_path(),
            assets_path: default_assets_path(),
        }
    }
}

fn default_events_path() -> String {
    "data/historical_events.json".into()
}
fn default_assets_path() -> String {
    "data/assets.json".into()
}

/// `[proactive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveConfig {
    /// Number of similar historical events to consider.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,

    /// Assets below this tier get no inspection activity.
    #[serde(default = "default_min_activity_tier")]
    pub min_activity_tier: RiskTier,
}

impl Default for ProactiveConfig {
    fn default() -> Self {
        Self {
            neighbors: default_neighbors(),
            min_activity_tier: default_min_activity_tier(),
        }
    }
}

fn default_neighbors() -> usize {
    5
}
fn default_min_activity_tier() -> RiskTier {
    RiskTier::High
}

/// `[reactive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactiveConfig {
    /// Priority given to defect work orders and their activities.
    #[serde(default = "default_priority")]
    pub priority: Priority,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
        }
    }
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Directory for per-run audit logs. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.assetguard/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AssetGuardError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.assetguard/assetguard.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AssetGuardError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        AssetGuardError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| AssetGuardError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AssetGuardError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AssetGuardError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the environment variable named in the config.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(AssetGuardError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every credential live mode needs is present.
///
/// Mock mode needs none, so it always passes.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    if config.collaborators.mode == CollaboratorMode::Mock {
        return Ok(());
    }

    url::Url::parse(&config.cmms.base_url).map_err(|e| {
        AssetGuardError::config(format!("invalid cmms.base_url '{}': {e}", config.cmms.base_url))
    })?;
    resolve_secret(&config.cmms.username_env)?;
    resolve_secret(&config.cmms.password_env)?;
    resolve_secret(&config.vision.detector_api_key_env)?;

    if config.vision.classifier_endpoint.is_none() {
        return Err(AssetGuardError::config(
            "vision.classifier_endpoint must be set in live mode",
        ));
    }
    resolve_secret(&config.vision.classifier_token_env)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("CMMS_PASSWORD"));
        assert!(toml_str.contains("RailwayTrack"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.proactive.neighbors, 5);
        assert_eq!(parsed.proactive.min_activity_tier, RiskTier::High);
        assert_eq!(parsed.collaborators.mode, CollaboratorMode::Mock);
        assert_eq!(parsed.cmms.days_until_due, 7);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[collaborators]
mode = "live"

[proactive]
min_activity_tier = "CRITICAL"

[vision.models]
PowerLine = "power-line-faults/3"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.collaborators.mode, CollaboratorMode::Live);
        assert_eq!(config.proactive.min_activity_tier, RiskTier::Critical);
        assert_eq!(config.proactive.neighbors, 5);
        assert_eq!(config.vision.models.len(), 1);
        assert_eq!(config.vision.model_for("PowerLine").expect("model"), "power-line-faults/3");
        assert!(config.vision.model_for("RailwayTrack").is_err());
    }

    #[test]
    fn mock_mode_needs_no_credentials() {
        let config = AppConfig::default();
        assert!(validate_credentials(&config).is_ok());
    }

    #[test]
    fn live_mode_requires_credentials() {
        let mut config = AppConfig::default();
        config.collaborators.mode = CollaboratorMode::Live;
        // Use a unique env var name to avoid interfering with other tests
        config.cmms.username_env = "AG_TEST_NONEXISTENT_USER_12345".into();
        let result = validate_credentials(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("AG_TEST_NONEXISTENT_USER_12345"));
    }
}
