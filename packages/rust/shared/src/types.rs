//! Core domain types for AssetGuard pipelines.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::WorkOrderId;
use crate::error::{AssetGuardError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Pipeline kind / status
// ---------------------------------------------------------------------------

/// Which of the two pipelines a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineKind {
    Reactive,
    Proactive,
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reactive => f.write_str("REACTIVE"),
            Self::Proactive => f.write_str("PROACTIVE"),
        }
    }
}

/// Lifecycle status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    ShortCircuited,
}

impl RunStatus {
    /// Whether the run has reached its final status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::ShortCircuited => "SHORT_CIRCUITED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Reactive inputs
// ---------------------------------------------------------------------------

/// An image handed to the vision collaborators.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// File name (used for content-type guessing and attachment names).
    pub name: String,
    /// Raw encoded image bytes.
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// MIME type guessed from the file extension.
    pub fn content_type(&self) -> &'static str {
        let lower = self.name.to_ascii_lowercase();
        if lower.ends_with(".png") {
            "image/png"
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            "image/jpeg"
        } else {
            "application/octet-stream"
        }
    }
}

/// Result of the primary classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the image shows a monitored asset category at all.
    pub relevant: bool,
    /// Recognised asset category, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Build a box from a center point and size, as detection APIs report them.
    pub fn from_center(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x_min: x - width / 2.0,
            y_min: y - height / 2.0,
            x_max: x + width / 2.0,
            y_max: y + height / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// One defect found by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedProblem {
    /// Defect class label (e.g. `corrosion`).
    pub class: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl DetectedProblem {
    /// Build a problem, rejecting confidences outside `[0, 1]`.
    pub fn new(class: impl Into<String>, confidence: f64, bounding_box: BoundingBox) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AssetGuardError::validation(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        Ok(Self {
            class: class.into(),
            confidence,
            bounding_box,
        })
    }
}

// ---------------------------------------------------------------------------
// Proactive inputs
// ---------------------------------------------------------------------------

/// Feature order shared by weather triggers and historical records.
pub const FEATURE_NAMES: [&str; 5] = [
    "temperature_c",
    "wind_speed_kmh",
    "precipitation_mm",
    "humidity_percent",
    "duration_hours",
];

/// A weather event trigger (the proactive pipeline payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEvent {
    pub temperature_c: f64,
    pub wind_speed_kmh: f64,
    pub precipitation_mm: f64,
    pub humidity_percent: f64,
    pub duration_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl WeatherEvent {
    /// Numeric features in [`FEATURE_NAMES`] order.
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.temperature_c,
            self.wind_speed_kmh,
            self.precipitation_mm,
            self.humidity_percent,
            self.duration_hours,
        ]
    }

    /// One-line human description, e.g. for work order titles.
    pub fn headline(&self) -> String {
        let kind = self.event_type.as_deref().unwrap_or("Weather event");
        match &self.location {
            Some(location) => format!("{kind} at {location}"),
            None => kind.to_string(),
        }
    }
}

/// Damage severity recorded for a historical incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric weight in `(0, 1]` used when averaging severities.
    pub fn weight(self) -> f64 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Critical => 1.0,
        }
    }
}

/// Damage an asset took during a historical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub asset_id: String,
    pub asset_type: String,
    pub damage_severity: Severity,
    /// Repair cost in the dataset's currency.
    pub cost: f64,
    pub downtime_hours: f64,
}

/// A past weather event and the incidents it caused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEventRecord {
    pub event_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Raw (un-normalized) features in [`FEATURE_NAMES`] order.
    pub features: Vec<f64>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

/// Per-asset reference data used by the risk scorer.
///
/// Every numeric field is optional on the wire so a missing value can be
/// rejected instead of defaulted. Domains:
/// - `incident_frequency`: `[0, 1]`, share of past severe-weather events in
///   which this asset had an incident.
/// - `current_condition`: `[0, 1]` on a **health** scale, `1.0` is perfect.
/// - `age_years`: `>= 0`.
/// - `criticality`: `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRiskRecord {
    pub asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub asset_type: String,
    #[serde(default)]
    pub incident_frequency: Option<f64>,
    #[serde(default)]
    pub current_condition: Option<f64>,
    #[serde(default)]
    pub age_years: Option<f64>,
    #[serde(default)]
    pub criticality: Option<f64>,
}

// ---------------------------------------------------------------------------
// Risk output
// ---------------------------------------------------------------------------

/// Discrete risk bucket. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// Lower bound (inclusive) of [`RiskTier::Medium`].
pub const MEDIUM_THRESHOLD: f64 = 0.25;
/// Lower bound (inclusive) of [`RiskTier::High`].
pub const HIGH_THRESHOLD: f64 = 0.5;
/// Lower bound (inclusive) of [`RiskTier::Critical`].
pub const CRITICAL_THRESHOLD: f64 = 0.75;

impl RiskTier {
    /// All tiers, lowest first.
    pub const ALL: [RiskTier; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Map a score to its tier. Bounds are inclusive below, exclusive above.
    pub fn from_score(score: f64) -> Self {
        if score < MEDIUM_THRESHOLD {
            Self::Low
        } else if score < HIGH_THRESHOLD {
            Self::Medium
        } else if score < CRITICAL_THRESHOLD {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = AssetGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(AssetGuardError::parse(format!("unknown risk tier '{other}'"))),
        }
    }
}

/// The four weighted sub-scores behind a [`RiskScore`]. They sum to the score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContributingFactors {
    pub incident_frequency: f64,
    pub current_condition: f64,
    pub age: f64,
    pub criticality: f64,
}

impl ContributingFactors {
    pub fn total(&self) -> f64 {
        self.incident_frequency + self.current_condition + self.age + self.criticality
    }
}

/// Risk assessment for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub asset_id: String,
    pub asset_type: String,
    pub score: f64,
    pub tier: RiskTier,
    pub contributing_factors: ContributingFactors,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Final projection of a finished run, handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub kind: PipelineKind,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<WorkOrderId>,
    pub activity_count: usize,
    /// Count of scored assets per tier (proactive runs only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tier_distribution: BTreeMap<RiskTier, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_circuit_reason: Option<String>,
    /// Short human-readable report.
    pub report: String,
}
