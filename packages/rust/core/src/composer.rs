//! Sequential and parallel composition of stages.
//!
//! Both composers are stages themselves, so they nest freely:
//! `Sequential(a, Parallel(b, c), d)`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use assetguard_shared::{AssetGuardError, Result};

use crate::context::{ContextStore, ContextUpdate};
use crate::run::ProgressReporter;
use crate::stage::{Stage, StageOutput};

/// How a composer finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Completed,
    ShortCircuited(String),
}

// ---------------------------------------------------------------------------
// Sequential
// ---------------------------------------------------------------------------

/// Runs stages in order; each sees everything its predecessors wrote.
pub struct SequentialComposer {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
}

impl SequentialComposer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage (builder style).
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run against `ctx`, applying each stage's update as it lands.
    ///
    /// A failing stage stops the run; its error is tagged with the stage
    /// name once. The update of a short-circuiting stage is still applied,
    /// and so is the update of a stage that failed after side effects.
    pub async fn execute(
        &self,
        ctx: &mut ContextStore,
        progress: &dyn ProgressReporter,
    ) -> Result<Flow> {
        self.drive(ctx, Some(progress), None).await
    }

    async fn drive(
        &self,
        ctx: &mut ContextStore,
        progress: Option<&dyn ProgressReporter>,
        mut journal: Option<&mut ContextUpdate>,
    ) -> Result<Flow> {
        for stage in &self.stages {
            if let Some(progress) = progress {
                progress.phase(stage.name());
            }
            debug!(composer = %self.name, stage = %stage.name(), "running stage");

            let output = stage
                .run(ctx)
                .await
                .map_err(|e| e.in_stage(stage.name()))?;
            let (update, ending) = match output {
                StageOutput::Continue(update) => (update, None),
                StageOutput::ShortCircuit { reason, update } => (update, Some(Ok(reason))),
                StageOutput::Failed { error, update } => {
                    (update, Some(Err(error.in_stage(stage.name()))))
                }
            };

            let journaled = journal.as_ref().map(|_| update.clone());
            if let Err(apply_err) = ctx.apply(update) {
                if let Some(Err(error)) = ending {
                    warn!(stage = %stage.name(), error = %apply_err, "writes of failed stage not recorded");
                    return Err(error);
                }
                return Err(apply_err);
            }
            if let (Some(journal), Some(writes)) = (journal.as_deref_mut(), journaled) {
                journal.extend(writes);
            }

            match ending {
                None => {}
                Some(Ok(reason)) => {
                    info!(stage = %stage.name(), reason = %reason, "pipeline short-circuited");
                    return Ok(Flow::ShortCircuited(reason));
                }
                Some(Err(error)) => return Err(error),
            }
        }
        Ok(Flow::Completed)
    }
}

#[async_trait]
impl Stage for SequentialComposer {
    fn name(&self) -> &str {
        &self.name
    }

    /// Runs on a private copy and returns every write it made, in order,
    /// including the writes that landed before a failure.
    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let mut local = ctx.clone();
        let mut journal = ContextUpdate::new();
        match self.drive(&mut local, None, Some(&mut journal)).await {
            Ok(Flow::Completed) => Ok(StageOutput::Continue(journal)),
            Ok(Flow::ShortCircuited(reason)) => Ok(StageOutput::ShortCircuit {
                reason,
                update: journal,
            }),
            Err(error) => StageOutput::failed(error, journal),
        }
    }
}

// ---------------------------------------------------------------------------
// Parallel
// ---------------------------------------------------------------------------

/// Runs branches concurrently on a snapshot and merges their disjoint writes.
pub struct ParallelComposer {
    name: String,
    branches: Vec<Arc<dyn Stage>>,
}

impl ParallelComposer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
        }
    }

    pub fn branch(mut self, stage: impl Stage + 'static) -> Self {
        self.branches.push(Arc::new(stage));
        self
    }

}

#[async_trait]
impl Stage for ParallelComposer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        let snapshot = Arc::new(ctx.clone());

        let handles: Vec<_> = self
            .branches
            .iter()
            .map(|branch| {
                let branch = Arc::clone(branch);
                let snapshot = Arc::clone(&snapshot);
                tokio::spawn(async move { branch.run(&snapshot).await })
            })
            .collect();

        // Await every branch, in branch order, before deciding anything.
        let mut first_error: Option<AssetGuardError> = None;
        let mut first_reason: Option<String> = None;
        let mut partials = Vec::with_capacity(self.branches.len());

        for (branch, handle) in self.branches.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(result) => result.map_err(|e| e.in_stage(branch.name())),
                Err(join_err) => Err(AssetGuardError::StageFailure {
                    stage: branch.name().to_string(),
                    source: Box::new(AssetGuardError::Internal(join_err.to_string())),
                }),
            };

            let failure = match outcome {
                Ok(StageOutput::Continue(update)) => {
                    partials.push((branch.name().to_string(), update));
                    None
                }
                Ok(StageOutput::ShortCircuit { reason, update }) => {
                    first_reason.get_or_insert(reason);
                    partials.push((branch.name().to_string(), update));
                    None
                }
                Ok(StageOutput::Failed { error, update }) => {
                    partials.push((branch.name().to_string(), update));
                    Some(error.in_stage(branch.name()))
                }
                Err(e) => Some(e),
            };

            if let Some(e) = failure {
                warn!(composer = %self.name, branch = %branch.name(), error = %e, "parallel branch failed");
                first_error.get_or_insert(e);
            }
        }

        // Writes of branches that did finish are kept even when a sibling failed.
        let merged = match (ContextUpdate::merge(partials), first_error) {
            (Ok(merged), None) => merged,
            (Err(conflict), None) => return Err(conflict),
            (Ok(merged), Some(error)) => return StageOutput::failed(error, merged),
            (Err(conflict), Some(error)) => {
                warn!(composer = %self.name, error = %conflict, "dropping partial writes of failed step");
                return Err(error);
            }
        };
        Ok(match first_reason {
            None => StageOutput::Continue(merged),
            Some(reason) => StageOutput::ShortCircuit {
                reason,
                update: merged,
            },
        })
    }
}
