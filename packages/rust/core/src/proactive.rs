//! Proactive pipeline: weather event → at-risk assets → inspection work order.
//!
//! ```text
//! similar_events → impacts → risk → work_order → activities
//! ```
//!
//! The first three stages are pure computation over the shared reference
//! data; only the last two call the CMMS.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use assetguard_risk::{
    ImpactProfile, ReferenceData, RiskAssessment, SimilarEvent, score_with_profile,
    select_candidates,
};
use assetguard_shared::{
    ActivityRequest, AppConfig, AssetRiskRecord, PipelineKind, Priority, Result, RiskTier,
    WeatherEvent, WorkOrderId, WorkOrderKind, WorkOrderRequest, WorkOrderService,
};

use crate::composer::SequentialComposer;
use crate::context::{ContextStore, ContextUpdate};
use crate::keys;
use crate::run::Pipeline;
use crate::stage::{FnStage, Stage, StageOutput};
use crate::summary::risk_report;

const INSPECTION_MINUTES: u32 = 120;
const INSPECTION_PROBLEM_TYPE: &str = "SAFETY";

/// Proactive settings taken from configuration.
#[derive(Debug, Clone)]
pub struct ProactivePolicy {
    /// Number of similar historical events to consider.
    pub neighbors: usize,
    /// Lowest tier that still gets an inspection activity.
    pub min_activity_tier: RiskTier,
}

impl ProactivePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            neighbors: config.proactive.neighbors,
            min_activity_tier: config.proactive.min_activity_tier,
        }
    }
}

/// Seed a context for one weather event.
pub fn proactive_trigger(event: &WeatherEvent) -> Result<ContextStore> {
    let mut ctx = ContextStore::new();
    ctx.set(keys::TRIGGER_WEATHER, event)?;
    Ok(ctx)
}

/// The assessment written by the `risk` stage.
fn stored_assessment(ctx: &ContextStore) -> Result<RiskAssessment> {
    Ok(RiskAssessment {
        scores: ctx.get_as(keys::RISK_SCORES)?,
        rejected: ctx.get_as(keys::RISK_REJECTED)?,
    })
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn find_similar_stage(reference: Arc<ReferenceData>, neighbors: usize) -> impl Stage {
    FnStage::new("similar_events", move |ctx: &ContextStore| {
        let event: WeatherEvent = ctx.get_as(keys::TRIGGER_WEATHER)?;
        let matches = reference
            .index
            .find_similar(&event.feature_vector(), neighbors)?;
        info!(matches = matches.len(), k = neighbors, "similar historical events found");

        let mut update = ContextUpdate::new();
        update.set(keys::SIMILAR_EVENTS, &matches)?;
        Ok(StageOutput::Continue(update))
    })
}

fn analyze_impacts_stage(reference: Arc<ReferenceData>) -> impl Stage {
    FnStage::new("impacts", move |ctx: &ContextStore| {
        let matches: Vec<SimilarEvent> = ctx.get_as(keys::SIMILAR_EVENTS)?;
        let profile = ImpactProfile::from_similar(&matches);
        let candidates = select_candidates(&profile, &reference.assets);
        info!(
            incidents = profile.total_incidents,
            asset_types = profile.by_asset_type.len(),
            candidates = candidates.len(),
            "historical impacts analyzed"
        );

        let mut update = ContextUpdate::new();
        update.set(keys::IMPACTS_PROFILE, &profile)?;
        update.set(keys::IMPACTS_CANDIDATES, &candidates)?;
        Ok(StageOutput::Continue(update))
    })
}

fn score_assets_stage() -> impl Stage {
    FnStage::new("risk", |ctx: &ContextStore| {
        let profile: ImpactProfile = ctx.get_as(keys::IMPACTS_PROFILE)?;
        let candidates: Vec<AssetRiskRecord> = ctx.get_as(keys::IMPACTS_CANDIDATES)?;
        let assessment = score_with_profile(&profile, &candidates);

        let mut update = ContextUpdate::new();
        update.set(keys::RISK_SCORES, &assessment.scores)?;
        update.set(keys::RISK_REJECTED, &assessment.rejected)?;
        Ok(StageOutput::Continue(update))
    })
}

struct InspectionWorkOrderStage {
    work_orders: Arc<dyn WorkOrderService>,
    min_tier: RiskTier,
}

#[async_trait]
impl Stage for InspectionWorkOrderStage {
    fn name(&self) -> &str {
        "work_order"
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let assessment = stored_assessment(ctx)?;
        let urgent = assessment.at_or_above(self.min_tier);
        // Scores are sorted, so the first one carries the highest tier.
        let Some(top) = urgent.first() else {
            return Ok(StageOutput::short_circuit(format!(
                "no asset reached the {} risk tier",
                self.min_tier
            )));
        };

        let event: WeatherEvent = ctx.get_as(keys::TRIGGER_WEATHER)?;
        let similar: Vec<SimilarEvent> = ctx.get_as(keys::SIMILAR_EVENTS)?;

        let request = WorkOrderRequest {
            title: format!("Pre-event inspection: {}", event.headline()),
            summary: risk_report(&similar, &assessment),
            notes: event
                .severity
                .as_ref()
                .map(|severity| format!("Forecast severity: {severity}")),
            asset_refs: urgent.iter().map(|s| s.asset_id.clone()).collect(),
            priority: Priority::from(top.tier),
            kind: WorkOrderKind::Inspection,
        };
        let id = self.work_orders.create_work_order(&request).await?;
        info!(work_order_id = %id, assets = urgent.len(), priority = %request.priority.as_str(), "inspection work order created");

        let mut update = ContextUpdate::new();
        update.set(keys::WORK_ORDER_ID, &id)?;
        Ok(StageOutput::Continue(update))
    }
}

struct AssetActivitiesStage {
    work_orders: Arc<dyn WorkOrderService>,
    min_tier: RiskTier,
}

#[async_trait]
impl Stage for AssetActivitiesStage {
    fn name(&self) -> &str {
        "activities"
    }

    /// One activity per urgent asset, highest score first. Ids created
    /// before a failing call are still returned.
    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let work_order_id: WorkOrderId = ctx.get_as(keys::WORK_ORDER_ID)?;
        let event: WeatherEvent = ctx.get_as(keys::TRIGGER_WEATHER)?;
        let assessment = stored_assessment(ctx)?;
        let urgent = assessment.at_or_above(self.min_tier);

        let mut update = ContextUpdate::new();
        for score in &urgent {
            let factors = &score.contributing_factors;
            let request = ActivityRequest {
                description: format!(
                    "Inspect {} ({}) ahead of {}",
                    score.asset_id,
                    score.asset_type,
                    event.headline()
                ),
                notes: Some(format!(
                    "risk {:.2} {}: incident history {:.2}, condition {:.2}, age {:.2}, criticality {:.2}",
                    score.score,
                    score.tier,
                    factors.incident_frequency,
                    factors.current_condition,
                    factors.age,
                    factors.criticality
                )),
                priority: Priority::from(score.tier),
                problem_type: INSPECTION_PROBLEM_TYPE.to_string(),
                asset_ref: Some(score.asset_id.clone()),
                duration_minutes: INSPECTION_MINUTES,
            };
            let id = match self.work_orders.create_activity(&work_order_id, &request).await {
                Ok(id) => id,
                Err(error) => return StageOutput::failed(error, update),
            };
            update.append(keys::ACTIVITY_IDS, &id)?;
        }
        info!(work_order_id = %work_order_id, activities = urgent.len(), "inspection activities created");
        Ok(StageOutput::Continue(update))
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Build the proactive pipeline over shared reference data.
pub fn proactive_pipeline(
    reference: Arc<ReferenceData>,
    work_orders: Arc<dyn WorkOrderService>,
    policy: ProactivePolicy,
) -> Pipeline {
    let root = SequentialComposer::new("proactive")
        .then(find_similar_stage(Arc::clone(&reference), policy.neighbors))
        .then(analyze_impacts_stage(reference))
        .then(score_assets_stage())
        .then(InspectionWorkOrderStage {
            work_orders: Arc::clone(&work_orders),
            min_tier: policy.min_activity_tier,
        })
        .then(AssetActivitiesStage {
            work_orders,
            min_tier: policy.min_activity_tier,
        });

    Pipeline::new(PipelineKind::Proactive, root)
}

/// The analysis half of the proactive pipeline, without CMMS calls.
pub fn assessment_pipeline(reference: Arc<ReferenceData>, neighbors: usize) -> Pipeline {
    let root = SequentialComposer::new("assessment")
        .then(find_similar_stage(Arc::clone(&reference), neighbors))
        .then(analyze_impacts_stage(reference))
        .then(score_assets_stage());
    Pipeline::new(PipelineKind::Proactive, root)
}
