//! Pipeline runs: one execution of a pipeline with its own context and status.

use std::time::Instant;

use tracing::{error, info, instrument};

use assetguard_shared::{AssetGuardError, PipelineKind, Result, RunId, RunStatus, RunSummary};

use crate::composer::{Flow, SequentialComposer};
use crate::context::ContextStore;
use crate::summary;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a top-level stage starts.
    fn phase(&self, name: &str);
    /// Called once the run has reached its final status.
    fn done(&self, run: &PipelineRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _run: &PipelineRun) {}
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// One execution of a pipeline.
///
/// Starts `RUNNING` and moves to a terminal status exactly once.
#[derive(Debug)]
pub struct PipelineRun {
    run_id: RunId,
    kind: PipelineKind,
    context: ContextStore,
    status: RunStatus,
    reason: Option<String>,
    error: Option<AssetGuardError>,
}

impl PipelineRun {
    pub fn new(kind: PipelineKind, context: ContextStore) -> Self {
        Self {
            run_id: RunId::new(),
            kind,
            context,
            status: RunStatus::Running,
            reason: None,
            error: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Short-circuit reason, if the run short-circuited.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Failure cause, if the run failed.
    pub fn error(&self) -> Option<&AssetGuardError> {
        self.error.as_ref()
    }

    fn transition(&mut self, status: RunStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AssetGuardError::validation(format!(
                "run {} already finished as {}; cannot move to {status}",
                self.run_id, self.status
            )));
        }
        self.status = status;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(RunStatus::Completed)
    }

    pub fn short_circuit(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::ShortCircuited)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn fail(&mut self, error: AssetGuardError) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Project a finished run into its summary.
    pub fn summary(&self) -> RunSummary {
        summary::summarize(self)
    }

    /// The summary, or the failure that ended the run.
    pub fn into_result(self) -> Result<RunSummary> {
        match self.error {
            Some(error) => Err(error),
            None if !self.status.is_terminal() => Err(AssetGuardError::validation(format!(
                "run {} has not finished",
                self.run_id
            ))),
            None => Ok(summary::summarize(&self)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A named, reusable composition; each call to [`Pipeline::run`] is a new run.
pub struct Pipeline {
    kind: PipelineKind,
    root: SequentialComposer,
}

impl Pipeline {
    pub fn new(kind: PipelineKind, root: SequentialComposer) -> Self {
        Self { kind, root }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.root.stage_names()
    }

    /// Execute once against a freshly seeded context.
    #[instrument(skip_all, fields(kind = %self.kind))]
    pub async fn run(&self, trigger: ContextStore, progress: &dyn ProgressReporter) -> PipelineRun {
        let start = Instant::now();
        let mut run = PipelineRun::new(self.kind, trigger);
        info!(run_id = %run.run_id, "starting pipeline run");

        let outcome = self.root.execute(&mut run.context, progress).await;
        let transition = match outcome {
            Ok(Flow::Completed) => run.complete(),
            Ok(Flow::ShortCircuited(reason)) => run.short_circuit(reason),
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "pipeline run failed");
                run.fail(e)
            }
        };
        if let Err(e) = transition {
            error!(run_id = %run.run_id, error = %e, "run status already final");
        }

        info!(
            run_id = %run.run_id,
            status = %run.status,
            elapsed_ms = start.elapsed().as_millis(),
            "pipeline run finished"
        );
        progress.done(&run);
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextUpdate;
    use crate::stage::{FnStage, StageOutput};

    #[test]
    fn status_moves_to_terminal_exactly_once() {
        let mut run = PipelineRun::new(PipelineKind::Reactive, ContextStore::new());
        assert_eq!(run.status(), RunStatus::Running);
        run.complete().expect("complete");
        assert_eq!(run.status(), RunStatus::Completed);

        assert!(run.fail(AssetGuardError::NoHistoricalData).is_err());
        assert!(run.short_circuit("late").is_err());
        assert_eq!(run.status(), RunStatus::Completed);
        assert!(run.error().is_none());
    }

    #[test]
    fn unfinished_run_has_no_result() {
        let run = PipelineRun::new(PipelineKind::Proactive, ContextStore::new());
        assert!(run.into_result().is_err());
    }

    #[tokio::test]
    async fn failed_run_returns_structured_failure() {
        let root = SequentialComposer::new("proactive").then(FnStage::new(
            "similar_events",
            |_ctx: &ContextStore| -> Result<StageOutput> { Err(AssetGuardError::NoHistoricalData) },
        ));
        let pipeline = Pipeline::new(PipelineKind::Proactive, root);
        let run = pipeline.run(ContextStore::new(), &SilentProgress).await;

        assert_eq!(run.status(), RunStatus::Failed);
        let err = run.into_result().unwrap_err();
        assert_eq!(err.stage(), Some("similar_events"));
        assert!(err.to_string().contains("no historical data"));
    }

    #[tokio::test]
    async fn short_circuited_run_yields_summary_with_reason() {
        let root = SequentialComposer::new("reactive").then(FnStage::new(
            "classify",
            |_ctx: &ContextStore| {
                Ok(StageOutput::ShortCircuit {
                    reason: "image is not a monitored asset".into(),
                    update: ContextUpdate::new(),
                })
            },
        ));
        let pipeline = Pipeline::new(PipelineKind::Reactive, root);
        let run = pipeline.run(ContextStore::new(), &SilentProgress).await;

        assert_eq!(run.reason(), Some("image is not a monitored asset"));
        let summary = run.into_result().expect("summary");
        assert_eq!(summary.status, RunStatus::ShortCircuited);
        assert_eq!(summary.work_order_id, None);
        assert_eq!(summary.activity_count, 0);
    }
}
