//! Deterministic text reports and the final [`RunSummary`] projection.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::de::DeserializeOwned;
use tracing::warn;

use assetguard_risk::{RejectedAsset, RiskAssessment, SimilarEvent};
use assetguard_shared::{
    ActivityId, DetectedProblem, PipelineKind, RiskScore, RiskTier, RunStatus, RunSummary,
    WorkOrderId,
};

use crate::context::ContextStore;
use crate::keys;
use crate::run::PipelineRun;

/// List detections one per line, e.g. ` - corrosion: confidence=0.91`.
pub fn detection_report(asset_type: Option<&str>, problems: &[DetectedProblem]) -> String {
    let mut out = String::new();
    if let Some(asset_type) = asset_type {
        let _ = writeln!(out, "Asset type: {asset_type}");
    }
    let _ = write!(out, "Detections: {}", problems.len());
    for problem in problems {
        let _ = write!(out, "\n - {}: confidence={:.2}", problem.class, problem.confidence);
    }
    out
}

/// Risk overview for a proactive run, highest tiers first.
pub fn risk_report(similar: &[SimilarEvent], assessment: &RiskAssessment) -> String {
    let mut out = format!(
        "Similar historical events: {}\nAssets scored: {}",
        similar.len(),
        assessment.scores.len()
    );
    let counts = assessment.tier_distribution();
    for tier in RiskTier::ALL.iter().rev() {
        let _ = write!(out, "\n {tier}: {}", counts.get(tier).copied().unwrap_or(0));
    }
    for score in assessment.at_or_above(RiskTier::High) {
        let _ = write!(
            out,
            "\n - {} ({}): {:.2} {}",
            score.asset_id, score.asset_type, score.score, score.tier
        );
    }
    if !assessment.rejected.is_empty() {
        let _ = write!(out, "\nAssets not scored: {}", assessment.rejected.len());
    }
    out
}

/// Read an optional key for reporting. A value of the wrong shape is logged
/// and treated as absent.
fn read_opt<T: DeserializeOwned>(ctx: &ContextStore, key: &str) -> Option<T> {
    match ctx.get_opt(key) {
        Ok(value) => value,
        Err(error) => {
            warn!(key, error = %error, "context value has unexpected shape; left out of the summary");
            None
        }
    }
}

fn activity_count(ctx: &ContextStore) -> usize {
    read_opt::<Vec<ActivityId>>(ctx, keys::ACTIVITY_IDS).map_or(0, |ids| ids.len())
}

fn report_for(run: &PipelineRun, assessment: Option<&RiskAssessment>) -> String {
    let ctx = run.context();
    let body = match run.kind() {
        PipelineKind::Reactive => read_opt::<String>(ctx, keys::SUMMARIZE_REPORT).unwrap_or_default(),
        PipelineKind::Proactive => {
            let similar: Vec<SimilarEvent> = read_opt(ctx, keys::SIMILAR_EVENTS).unwrap_or_default();
            match assessment {
                Some(assessment) => risk_report(&similar, assessment),
                None if !similar.is_empty() => risk_report(&similar, &RiskAssessment::default()),
                None => String::new(),
            }
        }
    };

    let status_line = match (run.status(), run.reason(), run.error()) {
        (RunStatus::ShortCircuited, Some(reason), _) => format!("Stopped early: {reason}"),
        (RunStatus::Failed, _, Some(error)) => format!("Failed: {error}"),
        (status, _, _) => format!("Status: {status}"),
    };

    if body.is_empty() {
        status_line
    } else {
        format!("{status_line}\n{body}")
    }
}

/// Project a run's final context into its summary.
pub fn summarize(run: &PipelineRun) -> RunSummary {
    let ctx = run.context();
    let assessment = read_opt::<Vec<RiskScore>>(ctx, keys::RISK_SCORES).map(|scores| RiskAssessment {
        scores,
        rejected: read_opt::<Vec<RejectedAsset>>(ctx, keys::RISK_REJECTED).unwrap_or_default(),
    });
    let tier_distribution = assessment
        .as_ref()
        .map(RiskAssessment::tier_distribution)
        .unwrap_or_else(BTreeMap::new);

    RunSummary {
        run_id: run.run_id().clone(),
        kind: run.kind(),
        status: run.status(),
        work_order_id: read_opt::<WorkOrderId>(ctx, keys::WORK_ORDER_ID),
        activity_count: activity_count(ctx),
        tier_distribution,
        short_circuit_reason: run.reason().map(str::to_string),
        report: report_for(run, assessment.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetguard_shared::{BoundingBox, ContributingFactors};

    fn problem(class: &str, confidence: f64) -> DetectedProblem {
        DetectedProblem::new(class, confidence, BoundingBox::from_center(5.0, 5.0, 2.0, 2.0))
            .expect("problem")
    }

    fn score(id: &str, value: f64) -> RiskScore {
        RiskScore {
            asset_id: id.into(),
            asset_type: "PowerLine".into(),
            score: value,
            tier: RiskTier::from_score(value),
            contributing_factors: ContributingFactors::default(),
        }
    }

    #[test]
    fn detection_report_lists_each_problem() {
        let report = detection_report(
            Some("ElectricityDistribution"),
            &[problem("corrosion", 0.91), problem("crack", 0.77)],
        );
        assert_eq!(
            report,
            "Asset type: ElectricityDistribution\nDetections: 2\n - corrosion: confidence=0.91\n - crack: confidence=0.77"
        );
    }

    #[test]
    fn risk_report_lists_urgent_assets() {
        let assessment = RiskAssessment {
            scores: vec![score("PL-1", 0.81), score("TR-2", 0.3)],
            rejected: vec![],
        };
        let report = risk_report(&[], &assessment);
        assert!(report.contains("CRITICAL: 1"));
        assert!(report.contains("MEDIUM: 1"));
        assert!(report.contains("PL-1 (PowerLine): 0.81 CRITICAL"));
        assert!(!report.contains("TR-2 ("));
    }

    #[test]
    fn summary_reads_shared_keys() {
        let mut ctx = ContextStore::new();
        ctx.set(keys::WORK_ORDER_ID, "WO-7").expect("set");
        ctx.append(keys::ACTIVITY_IDS, "A-1").expect("append");
        ctx.set(keys::RISK_SCORES, &vec![score("PL-1", 0.9)]).expect("set");

        let mut run = PipelineRun::new(PipelineKind::Proactive, ctx);
        run.complete().expect("complete");
        let summary = summarize(&run);

        assert_eq!(summary.work_order_id, Some(WorkOrderId("WO-7".into())));
        assert_eq!(summary.activity_count, 1);
        assert_eq!(summary.tier_distribution[&RiskTier::Critical], 1);
        assert_eq!(summary.tier_distribution[&RiskTier::Low], 0);
        assert!(summary.report.starts_with("Status: COMPLETED"));
    }

    #[test]
    fn misshapen_values_are_left_out_of_the_summary() {
        let mut ctx = ContextStore::new();
        ctx.set(keys::ACTIVITY_IDS, "not-a-list").expect("set");
        ctx.set(keys::WORK_ORDER_ID, &42).expect("set");

        let mut run = PipelineRun::new(PipelineKind::Reactive, ctx);
        run.complete().expect("complete");
        let summary = summarize(&run);

        assert_eq!(summary.activity_count, 0);
        assert_eq!(summary.work_order_id, None);
        assert!(summary.tier_distribution.is_empty());
        assert_eq!(read_opt::<Vec<ActivityId>>(run.context(), keys::ACTIVITY_IDS), None);
    }
}
