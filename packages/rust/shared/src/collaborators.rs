//! Capability traits for the external services a pipeline talks to.
//!
//! Each trait has interchangeable implementations (live HTTP clients and
//! offline mocks) chosen by configuration, so stage logic never branches on
//! which one it got.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Classification, DetectedProblem, ImagePayload, RiskTier};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Work order identifier as issued by the CMMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkOrderId(pub String);

impl std::fmt::Display for WorkOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Work activity identifier as issued by the CMMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub String);

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Work order / activity priority understood by the CMMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl From<RiskTier> for Priority {
    fn from(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low => Self::Low,
            RiskTier::Medium => Self::Medium,
            RiskTier::High => Self::High,
            RiskTier::Critical => Self::Critical,
        }
    }
}

/// Kind of work a work order requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkOrderKind {
    Maintenance,
    Inspection,
}

impl WorkOrderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "MAINTENANCE",
            Self::Inspection => "INSPECTION",
        }
    }
}

/// Everything needed to open a work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRequest {
    /// Short title (at most 100 characters once sent).
    pub title: String,
    /// Summary of the problem or risk.
    pub summary: String,
    /// Longer notes for the field crew.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Asset codes the work order covers.
    #[serde(default)]
    pub asset_refs: Vec<String>,
    pub priority: Priority,
    pub kind: WorkOrderKind,
}

/// Everything needed to add an activity to a work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub priority: Priority,
    /// CMMS problem category (e.g. `MECHANICAL`, `SAFETY`).
    pub problem_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_ref: Option<String>,
    /// Requested duration; the CMMS client may adjust it by priority.
    pub duration_minutes: u32,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Decides whether an image shows a monitored asset, and which kind.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &ImagePayload) -> Result<Classification>;
}

/// Finds defects on an image using the detection model for its asset type.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &ImagePayload, model_ref: &str) -> Result<Vec<DetectedProblem>>;
}

/// The CMMS operations the pipelines need.
#[async_trait]
pub trait WorkOrderService: Send + Sync {
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<WorkOrderId>;

    async fn create_activity(
        &self,
        work_order_id: &WorkOrderId,
        request: &ActivityRequest,
    ) -> Result<ActivityId>;

    async fn upload_annotated_image(
        &self,
        work_order_id: &WorkOrderId,
        image: &ImagePayload,
    ) -> Result<()>;
}

/// Draws detection boxes onto an image. Pure CPU work, so not async.
pub trait Annotator: Send + Sync {
    fn annotate(&self, image: &ImagePayload, problems: &[DetectedProblem]) -> Result<ImagePayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_follows_tier() {
        assert_eq!(Priority::from(RiskTier::Critical), Priority::Critical);
        assert_eq!(Priority::from(RiskTier::Low).as_str(), "LOW");
    }

    #[test]
    fn request_serialization() {
        let request = WorkOrderRequest {
            title: "Inspect feeders".into(),
            summary: "Storm risk".into(),
            notes: None,
            asset_refs: vec!["PL-001".into()],
            priority: Priority::High,
            kind: WorkOrderKind::Inspection,
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["priority"], "HIGH");
        assert_eq!(json["kind"], "INSPECTION");
        assert!(json.get("notes").is_none());
    }
}
