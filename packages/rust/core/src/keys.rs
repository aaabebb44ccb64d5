//! Context keys, namespaced `<stage>.<field>` by the stage that writes them.

// Trigger payload, seeded before the first stage.
pub const TRIGGER_IMAGE_PATH: &str = "trigger.image_path";
pub const TRIGGER_ASSET_REF: &str = "trigger.asset_ref";
pub const TRIGGER_WEATHER: &str = "trigger.weather";

// Reactive
pub const CLASSIFY_RESULT: &str = "classify.result";
pub const DETECT_MODEL: &str = "detect.model";
pub const DETECT_PROBLEMS: &str = "detect.problems";
pub const SUMMARIZE_REPORT: &str = "summarize.report";
pub const ANNOTATE_UPLOADED: &str = "annotate.uploaded";

// Proactive
pub const SIMILAR_EVENTS: &str = "similar_events.matches";
pub const IMPACTS_PROFILE: &str = "impacts.profile";
pub const IMPACTS_CANDIDATES: &str = "impacts.candidates";
pub const RISK_SCORES: &str = "risk.scores";
pub const RISK_REJECTED: &str = "risk.rejected";

// Shared by both pipelines
pub const WORK_ORDER_ID: &str = "work_order.id";
pub const ACTIVITY_IDS: &str = "activities.ids";
