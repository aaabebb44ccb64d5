//! Reactive pipeline: asset image → defects → maintenance work order.
//!
//! ```text
//! classify → detect → ( work_order | summarize ) → ( annotate | activities )
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use assetguard_shared::{
    ActivityRequest, Annotator, AppConfig, AssetGuardError, Classification, Classifier,
    DetectedProblem, Detector, ImagePayload, PipelineKind, Priority, Result, VisionConfig,
    WorkOrderId, WorkOrderKind, WorkOrderRequest, WorkOrderService,
};

use crate::composer::{ParallelComposer, SequentialComposer};
use crate::context::{ContextStore, ContextUpdate};
use crate::keys;
use crate::run::Pipeline;
use crate::stage::{FnStage, Stage, StageOutput};
use crate::summary::detection_report;

/// Default planned duration of a repair activity.
const REPAIR_MINUTES: u32 = 120;

/// Collaborators the reactive pipeline calls.
#[derive(Clone)]
pub struct ReactiveServices {
    pub classifier: Arc<dyn Classifier>,
    pub detector: Arc<dyn Detector>,
    pub work_orders: Arc<dyn WorkOrderService>,
    pub annotator: Arc<dyn Annotator>,
}

/// Reactive settings taken from configuration.
#[derive(Debug, Clone)]
pub struct ReactivePolicy {
    /// Detection models per asset category.
    pub vision: VisionConfig,
    pub priority: Priority,
}

impl ReactivePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            vision: config.vision.clone(),
            priority: config.reactive.priority,
        }
    }
}

/// Seed a context for one image.
pub fn reactive_trigger(image_path: &Path, asset_ref: Option<&str>) -> Result<ContextStore> {
    let mut ctx = ContextStore::new();
    ctx.set(keys::TRIGGER_IMAGE_PATH, &image_path.to_string_lossy())?;
    if let Some(asset_ref) = asset_ref {
        ctx.set(keys::TRIGGER_ASSET_REF, asset_ref)?;
    }
    Ok(ctx)
}

/// Read the trigger image named in the context.
pub async fn load_image(ctx: &ContextStore) -> Result<ImagePayload> {
    let path: String = ctx.get_as(keys::TRIGGER_IMAGE_PATH)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AssetGuardError::io(&path, e))?;
    let name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.clone());
    Ok(ImagePayload::new(name, bytes))
}

/// CMMS problem category for an asset category.
pub fn problem_type_for(asset_type: &str) -> &'static str {
    match asset_type {
        "ElectricityDistribution" => "ELECTRICAL",
        "PCB" => "ELECTRONIC",
        "RailwayTrack" | "TrainWagon" | "TrainWheel" => "MECHANICAL",
        _ => "OTHER",
    }
}

fn asset_type(ctx: &ContextStore) -> Result<String> {
    let classification: Classification = ctx.get_as(keys::CLASSIFY_RESULT)?;
    classification
        .asset_type
        .ok_or_else(|| AssetGuardError::validation("classification carries no asset type"))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

struct ClassifyStage {
    classifier: Arc<dyn Classifier>,
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> &str {
        "classify"
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let image = load_image(ctx).await?;
        let classification = self.classifier.classify(&image).await?;

        let mut update = ContextUpdate::new();
        update.set(keys::CLASSIFY_RESULT, &classification)?;

        match (&classification.asset_type, classification.relevant) {
            (Some(asset_type), true) => {
                info!(image = %image.name, asset_type = %asset_type, "image classified");
                Ok(StageOutput::Continue(update))
            }
            _ => Ok(StageOutput::ShortCircuit {
                reason: format!("{} does not show a monitored asset", image.name),
                update,
            }),
        }
    }
}

struct DetectStage {
    detector: Arc<dyn Detector>,
    vision: VisionConfig,
}

#[async_trait]
impl Stage for DetectStage {
    fn name(&self) -> &str {
        "detect"
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let asset_type = asset_type(ctx)?;
        let model = self.vision.model_for(&asset_type)?;

        let image = load_image(ctx).await?;
        let problems = self.detector.detect(&image, model).await?;
        info!(model = %model, problems = problems.len(), "detection finished");

        let mut update = ContextUpdate::new();
        update.set(keys::DETECT_MODEL, model)?;
        update.set(keys::DETECT_PROBLEMS, &problems)?;

        if problems.is_empty() {
            return Ok(StageOutput::ShortCircuit {
                reason: format!("no defects detected on {asset_type}"),
                update,
            });
        }
        Ok(StageOutput::Continue(update))
    }
}

struct WorkOrderStage {
    work_orders: Arc<dyn WorkOrderService>,
    priority: Priority,
}

#[async_trait]
impl Stage for WorkOrderStage {
    fn name(&self) -> &str {
        "work_order"
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let asset_type = asset_type(ctx)?;
        let problems: Vec<DetectedProblem> = ctx.get_as(keys::DETECT_PROBLEMS)?;
        let model: String = ctx.get_as(keys::DETECT_MODEL)?;
        let asset_ref: Option<String> = ctx.get_opt(keys::TRIGGER_ASSET_REF)?;

        let request = WorkOrderRequest {
            title: format!("Repair {} defect(s) on {asset_type}", problems.len()),
            summary: detection_report(Some(&asset_type), &problems),
            notes: Some(format!("Defects found by detection model {model}.")),
            asset_refs: asset_ref.into_iter().collect(),
            priority: self.priority,
            kind: WorkOrderKind::Maintenance,
        };
        let id = self.work_orders.create_work_order(&request).await?;
        info!(work_order_id = %id, "work order created");

        let mut update = ContextUpdate::new();
        update.set(keys::WORK_ORDER_ID, &id)?;
        Ok(StageOutput::Continue(update))
    }
}

fn summarize_stage() -> impl Stage {
    FnStage::new("summarize", |ctx: &ContextStore| {
        let asset_type = asset_type(ctx)?;
        let problems: Vec<DetectedProblem> = ctx.get_as(keys::DETECT_PROBLEMS)?;

        let mut update = ContextUpdate::new();
        update.set(keys::SUMMARIZE_REPORT, &detection_report(Some(&asset_type), &problems))?;
        Ok(StageOutput::Continue(update))
    })
}

struct AnnotateStage {
    annotator: Arc<dyn Annotator>,
    work_orders: Arc<dyn WorkOrderService>,
}

#[async_trait]
impl Stage for AnnotateStage {
    fn name(&self) -> &str {
        "annotate"
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let work_order_id: WorkOrderId = ctx.get_as(keys::WORK_ORDER_ID)?;
        let problems: Vec<DetectedProblem> = ctx.get_as(keys::DETECT_PROBLEMS)?;
        let image = load_image(ctx).await?;

        let annotator = Arc::clone(&self.annotator);
        let annotated = tokio::task::spawn_blocking(move || annotator.annotate(&image, &problems))
            .await
            .map_err(|e| AssetGuardError::Internal(format!("annotation task: {e}")))??;

        self.work_orders
            .upload_annotated_image(&work_order_id, &annotated)
            .await?;
        info!(work_order_id = %work_order_id, attachment = %annotated.name, "annotated image uploaded");

        let mut update = ContextUpdate::new();
        update.set(keys::ANNOTATE_UPLOADED, &true)?;
        Ok(StageOutput::Continue(update))
    }
}

struct ProblemActivitiesStage {
    work_orders: Arc<dyn WorkOrderService>,
    priority: Priority,
}

#[async_trait]
impl Stage for ProblemActivitiesStage {
    fn name(&self) -> &str {
        "activities"
    }

    /// One activity per problem, created one at a time in detection order.
    ///
    /// When a creation fails, the ids created before it are still returned.
    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let work_order_id: WorkOrderId = ctx.get_as(keys::WORK_ORDER_ID)?;
        let asset_type = asset_type(ctx)?;
        let problems: Vec<DetectedProblem> = ctx.get_as(keys::DETECT_PROBLEMS)?;
        let asset_ref: Option<String> = ctx.get_opt(keys::TRIGGER_ASSET_REF)?;

        let mut update = ContextUpdate::new();
        for problem in &problems {
            let bbox = &problem.bounding_box;
            let request = ActivityRequest {
                description: format!("Repair {} on {asset_type}", problem.class),
                notes: Some(format!(
                    "confidence {:.2}, region ({:.0}, {:.0})-({:.0}, {:.0})",
                    problem.confidence, bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max
                )),
                priority: self.priority,
                problem_type: problem_type_for(&asset_type).to_string(),
                asset_ref: asset_ref.clone(),
                duration_minutes: REPAIR_MINUTES,
            };
            let id = match self.work_orders.create_activity(&work_order_id, &request).await {
                Ok(id) => id,
                // Activities already created stay recorded.
                Err(error) => return StageOutput::failed(error, update),
            };
            update.append(keys::ACTIVITY_IDS, &id)?;
        }
        info!(work_order_id = %work_order_id, activities = problems.len(), "activities created");
        Ok(StageOutput::Continue(update))
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build the reactive pipeline.
pub fn reactive_pipeline(services: ReactiveServices, policy: ReactivePolicy) -> Pipeline {
    let dispatch = ParallelComposer::new("dispatch")
        .branch(WorkOrderStage {
            work_orders: Arc::clone(&services.work_orders),
            priority: policy.priority,
        })
        .branch(summarize_stage());

    let follow_up = ParallelComposer::new("follow_up")
        .branch(AnnotateStage {
            annotator: services.annotator,
            work_orders: Arc::clone(&services.work_orders),
        })
        .branch(ProblemActivitiesStage {
            work_orders: services.work_orders,
            priority: policy.priority,
        });

    let root = SequentialComposer::new("reactive")
        .then(ClassifyStage {
            classifier: services.classifier,
        })
        .then(DetectStage {
            detector: services.detector,
            vision: policy.vision,
        })
        .then(dispatch)
        .then(follow_up);

    Pipeline::new(PipelineKind::Reactive, root)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::run::SilentProgress;
    use assetguard_cmms::MockWorkOrderService;
    use assetguard_shared::{BoundingBox, RunStatus};
    use assetguard_vision::{HeuristicClassifier, StaticDetector};

    /// Returns the image unchanged under an `annotated_` name.
    struct PassThroughAnnotator;

    impl Annotator for PassThroughAnnotator {
        fn annotate(&self, image: &ImagePayload, _problems: &[DetectedProblem]) -> Result<ImagePayload> {
            Ok(ImagePayload::new(format!("annotated_{}", image.name), image.bytes.clone()))
        }
    }

    fn write_image(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ag-reactive-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        std::fs::write(&path, b"not really a jpeg").expect("write image");
        path
    }

    fn problem(class: &str, confidence: f64) -> DetectedProblem {
        DetectedProblem::new(class, confidence, BoundingBox::from_center(100.0, 80.0, 20.0, 10.0))
            .expect("problem")
    }

    fn pipeline(
        detections: Vec<DetectedProblem>,
        cmms: &Arc<MockWorkOrderService>,
    ) -> Pipeline {
        let config = AppConfig::default();
        let services = ReactiveServices {
            classifier: Arc::new(HeuristicClassifier::new(config.vision.categories())),
            detector: Arc::new(StaticDetector::new(detections)),
            work_orders: Arc::clone(cmms) as Arc<dyn WorkOrderService>,
            annotator: Arc::new(PassThroughAnnotator),
        };
        reactive_pipeline(services, ReactivePolicy::from_config(&config))
    }

    #[tokio::test]
    async fn two_defects_make_one_work_order_with_two_activities() {
        let cmms = Arc::new(MockWorkOrderService::new());
        let pipeline = pipeline(vec![problem("corrosion", 0.91), problem("crack", 0.77)], &cmms);
        let image = write_image("electric_pole_17.jpg");
        let trigger = reactive_trigger(&image, Some("POLE-17")).expect("trigger");

        let run = pipeline.run(trigger, &SilentProgress).await;
        assert_eq!(run.status(), RunStatus::Completed, "error: {:?}", run.error());

        let orders = cmms.work_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, WorkOrderKind::Maintenance);
        assert_eq!(orders[0].asset_refs, vec!["POLE-17"]);
        assert_eq!(orders[0].priority, Priority::Medium);

        let activities = cmms.activities();
        assert_eq!(activities.len(), 2);
        assert!(activities[0].1.description.contains("corrosion"));
        assert!(activities[1].1.description.contains("crack"));
        assert_eq!(activities[0].1.problem_type, "ELECTRICAL");

        let uploads = cmms.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "annotated_electric_pole_17.jpg");

        let summary = run.into_result().expect("summary");
        assert_eq!(summary.activity_count, 2);
        assert!(summary.work_order_id.is_some());
        assert!(summary.report.contains("corrosion: confidence=0.91"));
    }

    #[tokio::test]
    async fn irrelevant_image_short_circuits_before_detection() {
        let cmms = Arc::new(MockWorkOrderService::new());
        let pipeline = pipeline(vec![problem("crack", 0.8)], &cmms);
        let image = write_image("holiday_beach.jpg");

        let run = pipeline
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        assert_eq!(run.status(), RunStatus::ShortCircuited);
        assert!(!run.context().contains(keys::DETECT_PROBLEMS));
        assert!(cmms.work_orders().is_empty());
    }

    #[tokio::test]
    async fn clean_image_raises_no_work_order() {
        let cmms = Arc::new(MockWorkOrderService::new());
        let pipeline = pipeline(vec![], &cmms);
        let image = write_image("railway_track_km12.png");

        let run = pipeline
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        assert_eq!(run.status(), RunStatus::ShortCircuited);
        assert!(run.reason().is_some_and(|r| r.contains("no defects")));
        assert!(cmms.work_orders().is_empty());
    }

    #[tokio::test]
    async fn failed_work_order_skips_follow_up() {
        let cmms = Arc::new(MockWorkOrderService::failing());
        let pipeline = pipeline(vec![problem("crack", 0.8)], &cmms);
        let image = write_image("train_wheel_3.jpg");

        let run = pipeline
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().and_then(|e| e.stage()), Some("work_order"));
        assert!(cmms.activities().is_empty());
        assert!(cmms.uploads().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_keeps_created_activities() {
        let cmms = Arc::new(MockWorkOrderService::failing_uploads());
        let pipeline = pipeline(vec![problem("corrosion", 0.91), problem("crack", 0.77)], &cmms);
        let image = write_image("electric_pole_4.jpg");

        let run = pipeline
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().and_then(|e| e.stage()), Some("annotate"));

        let ids: Vec<String> = run.context().get_as(keys::ACTIVITY_IDS).expect("activity ids");
        assert_eq!(ids, vec!["ACT-1", "ACT-2"]);
        let summary = run.summary();
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.activity_count, 2);
        assert!(summary.work_order_id.is_some());
    }

    #[tokio::test]
    async fn activity_failure_keeps_earlier_activity_ids() {
        let cmms = Arc::new(MockWorkOrderService::failing_after_activities(1));
        let pipeline = pipeline(vec![problem("corrosion", 0.91), problem("crack", 0.77)], &cmms);
        let image = write_image("electric_pole_9.jpg");

        let run = pipeline
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().and_then(|e| e.stage()), Some("activities"));

        let ids: Vec<String> = run.context().get_as(keys::ACTIVITY_IDS).expect("activity ids");
        assert_eq!(ids, vec!["ACT-1"]);
        assert!(run.context().contains(keys::ANNOTATE_UPLOADED));
        assert_eq!(run.summary().activity_count, 1);
    }

    #[tokio::test]
    async fn category_without_model_fails_in_detect() {
        let cmms = Arc::new(MockWorkOrderService::new());
        let config = AppConfig::default();
        let services = ReactiveServices {
            classifier: Arc::new(HeuristicClassifier::new(config.vision.categories())),
            detector: Arc::new(StaticDetector::new(vec![problem("crack", 0.8)])),
            work_orders: Arc::clone(&cmms) as Arc<dyn WorkOrderService>,
            annotator: Arc::new(PassThroughAnnotator),
        };
        let mut policy = ReactivePolicy::from_config(&config);
        policy.vision.models.remove("ElectricityDistribution");
        let image = write_image("electric_pole_2.jpg");

        let run = reactive_pipeline(services, policy)
            .run(reactive_trigger(&image, None).expect("trigger"), &SilentProgress)
            .await;
        let err = run.into_result().unwrap_err();
        assert_eq!(err.stage(), Some("detect"));
        assert!(err.to_string().contains("no detection model configured"));
        assert!(cmms.work_orders().is_empty());
    }

    #[tokio::test]
    async fn missing_image_fails_in_classify() {
        let cmms = Arc::new(MockWorkOrderService::new());
        let pipeline = pipeline(vec![], &cmms);
        let trigger =
            reactive_trigger(Path::new("/definitely/not/here/pole.jpg"), None).expect("trigger");

        let run = pipeline.run(trigger, &SilentProgress).await;
        let err = run.into_result().unwrap_err();
        assert_eq!(err.stage(), Some("classify"));
    }

    #[test]
    fn problem_types_by_category() {
        assert_eq!(problem_type_for("PCB"), "ELECTRONIC");
        assert_eq!(problem_type_for("TrainWagon"), "MECHANICAL");
        assert_eq!(problem_type_for("Unknown"), "OTHER");
    }
}
