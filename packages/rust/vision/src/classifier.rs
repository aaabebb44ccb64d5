//! Primary classification: is this an asset we monitor, and which kind?

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use assetguard_shared::{
    AssetGuardError, Classification, Classifier, ImagePayload, Result, VisionConfig,
    resolve_secret,
};

const USER_AGENT: &str = concat!("AssetGuard/", env!("CARGO_PKG_VERSION"));
const MAX_PREDICTIONS: usize = 5;
const TIMEOUT: Duration = Duration::from_secs(60);

/// Lowercase alphanumerics only, so `Railway Track` matches `RailwayTrack`.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map a raw label onto one of `categories`, exactly first, then by containment.
fn match_category(label: &str, categories: &[String]) -> Option<String> {
    let wanted = normalize(label);
    if wanted.is_empty() {
        return None;
    }
    categories
        .iter()
        .find(|c| normalize(c) == wanted)
        .or_else(|| {
            categories.iter().find(|c| {
                let c = normalize(c);
                c.contains(&wanted) || wanted.contains(&c)
            })
        })
        .cloned()
}

fn classification(asset_type: Option<String>) -> Classification {
    Classification {
        relevant: asset_type.is_some(),
        asset_type,
    }
}

// ---------------------------------------------------------------------------
// HeuristicClassifier
// ---------------------------------------------------------------------------

/// Offline classifier that reads the asset kind from the file name.
pub struct HeuristicClassifier {
    categories: Vec<String>,
}

impl HeuristicClassifier {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    fn guess(name: &str) -> Option<&'static str> {
        let name = name.to_ascii_lowercase();
        let has = |keys: &[&str]| keys.iter().any(|k| name.contains(k));

        if has(&["electric", "circuit", "cable", "pcb"]) {
            if has(&["circuit", "pcb"]) {
                Some("PCB")
            } else {
                Some("ElectricityDistribution")
            }
        } else if has(&["track", "railway"]) {
            Some("RailwayTrack")
        } else if has(&["wagon"]) {
            Some("TrainWagon")
        } else if has(&["wheel"]) {
            Some("TrainWheel")
        } else {
            None
        }
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, image: &ImagePayload) -> Result<Classification> {
        let file_name = Path::new(&image.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let asset_type = Self::guess(&file_name).and_then(|g| match_category(g, &self.categories));
        debug!(file = %file_name, asset_type = ?asset_type, "heuristic classification");
        Ok(classification(asset_type))
    }
}

// ---------------------------------------------------------------------------
// EndpointClassifier
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    display_names: Vec<String>,
    #[serde(default)]
    confidences: Vec<f64>,
}

/// Classifier backed by an AutoML-style image classification predict endpoint.
pub struct EndpointClassifier {
    client: Client,
    endpoint: String,
    token: String,
    categories: Vec<String>,
    confidence_threshold: f64,
}

impl EndpointClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        categories: Vec<String>,
        confidence_threshold: f64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AssetGuardError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
            categories,
            confidence_threshold,
        })
    }

    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        let endpoint = config
            .classifier_endpoint
            .as_deref()
            .ok_or_else(|| AssetGuardError::config("[vision] classifier_endpoint is not set"))?;
        Self::new(
            endpoint,
            resolve_secret(&config.classifier_token_env)?,
            config.categories(),
            config.confidence_threshold,
        )
    }

    /// Highest-confidence label at or above the threshold.
    fn top_label(&self, response: &PredictResponse) -> Option<(String, f64)> {
        let prediction = response.predictions.first()?;
        prediction
            .display_names
            .iter()
            .zip(&prediction.confidences)
            .filter(|(_, c)| **c >= self.confidence_threshold)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, c)| (name.clone(), *c))
    }
}

#[async_trait]
impl Classifier for EndpointClassifier {
    #[instrument(skip_all, fields(image = %image.name))]
    async fn classify(&self, image: &ImagePayload) -> Result<Classification> {
        let body = serde_json::json!({
            "instances": [{ "content": STANDARD.encode(&image.bytes) }],
            "parameters": {
                "confidenceThreshold": self.confidence_threshold,
                "maxPredictions": MAX_PREDICTIONS,
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssetGuardError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AssetGuardError::collaborator(
                "classifier",
                format!("HTTP {status}: {text}"),
            ));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| AssetGuardError::collaborator("classifier", format!("invalid response: {e}")))?;

        let Some((label, confidence)) = self.top_label(&parsed) else {
            info!("no label above the confidence threshold");
            return Ok(classification(None));
        };
        let asset_type = match_category(&label, &self.categories);
        info!(%label, confidence, asset_type = ?asset_type, "image classified");
        Ok(classification(asset_type))
    }
}
