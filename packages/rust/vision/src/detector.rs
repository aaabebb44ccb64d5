//! Defect detection on an already-classified image.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use assetguard_shared::{
    AssetGuardError, BoundingBox, DetectedProblem, Detector, ImagePayload, Result, VisionConfig,
    resolve_secret,
};

const USER_AGENT: &str = concat!("AssetGuard/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct InferenceResponse {
    predictions: Vec<RawPrediction>,
}

/// Detection as the inference API reports it: center point plus size.
#[derive(Deserialize)]
struct RawPrediction {
    class: String,
    confidence: f64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl RawPrediction {
    fn into_problem(self) -> Result<DetectedProblem> {
        DetectedProblem::new(
            self.class,
            self.confidence,
            BoundingBox::from_center(self.x, self.y, self.width, self.height),
        )
    }
}

// ---------------------------------------------------------------------------
// RoboflowDetector
// ---------------------------------------------------------------------------

/// Detector backed by a hosted object-detection inference API.
///
/// Sends `POST {api_url}/{model_id}?api_key=...` with the base64 image as a
/// form-encoded body.
pub struct RoboflowDetector {
    client: Client,
    api_url: String,
    api_key: String,
}

impl RoboflowDetector {
    pub fn new(api_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AssetGuardError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &VisionConfig) -> Result<Self> {
        Self::new(&config.detector_url, resolve_secret(&config.detector_api_key_env)?)
    }
}

#[async_trait]
impl Detector for RoboflowDetector {
    #[instrument(skip_all, fields(image = %image.name, model = model_ref))]
    async fn detect(&self, image: &ImagePayload, model_ref: &str) -> Result<Vec<DetectedProblem>> {
        let url = format!("{}/{}", self.api_url, model_ref.trim_start_matches('/'));
        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(STANDARD.encode(&image.bytes))
            .send()
            .await
            .map_err(|e| AssetGuardError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AssetGuardError::collaborator("detector", format!("HTTP {status}: {text}")));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| AssetGuardError::collaborator("detector", format!("invalid response: {e}")))?;

        let problems = parsed
            .predictions
            .into_iter()
            .map(RawPrediction::into_problem)
            .collect::<Result<Vec<_>>>()?;
        info!(detections = problems.len(), "detection finished");
        Ok(problems)
    }
}

// ---------------------------------------------------------------------------
// StaticDetector
// ---------------------------------------------------------------------------

/// Offline detector returning the same problems for every image.
pub struct StaticDetector {
    problems: Vec<DetectedProblem>,
}

impl StaticDetector {
    pub fn new(problems: Vec<DetectedProblem>) -> Self {
        Self { problems }
    }
}

impl Default for StaticDetector {
    /// A PCB sample with two defects.
    fn default() -> Self {
        let canned = [
            ("spur", 0.766_830_861_568_450_9, 574.0, 195.0, 32.0, 24.0),
            ("open_circuit", 0.762_139_976_024_127_7, 510.5, 528.5, 19.0, 15.0),
        ];
        let problems = canned
            .into_iter()
            .filter_map(|(class, confidence, x, y, w, h)| {
                DetectedProblem::new(class, confidence, BoundingBox::from_center(x, y, w, h)).ok()
            })
            .collect();
        Self { problems }
    }
}

#[async_trait]
impl Detector for StaticDetector {
    async fn detect(&self, image: &ImagePayload, model_ref: &str) -> Result<Vec<DetectedProblem>> {
        if self.problems.is_empty() {
            warn!(image = %image.name, model = model_ref, "static detector has no problems configured");
        }
        Ok(self.problems.clone())
    }
}
