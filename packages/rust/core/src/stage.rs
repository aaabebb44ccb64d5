//! The unit of pipeline work.

use async_trait::async_trait;

use assetguard_shared::{AssetGuardError, Result};

use crate::context::{ContextStore, ContextUpdate};

/// What a stage hands back to its composer.
#[derive(Debug)]
pub enum StageOutput {
    /// Apply the update and keep going.
    Continue(ContextUpdate),
    /// Apply the update, then end the run without error.
    ShortCircuit { reason: String, update: ContextUpdate },
    /// The stage failed after side effects that `update` records. The
    /// composer applies the update, then fails with `error`.
    Failed { error: AssetGuardError, update: ContextUpdate },
}

impl StageOutput {
    pub fn short_circuit(reason: impl Into<String>) -> Self {
        Self::ShortCircuit {
            reason: reason.into(),
            update: ContextUpdate::new(),
        }
    }

    /// Fail, keeping `update`. An empty update is a plain error.
    pub fn failed(error: AssetGuardError, update: ContextUpdate) -> Result<Self> {
        if update.is_empty() {
            return Err(error);
        }
        Ok(Self::Failed { error, update })
    }

    pub fn update(&self) -> &ContextUpdate {
        match self {
            Self::Continue(update) | Self::ShortCircuit { update, .. } | Self::Failed { update, .. } => {
                update
            }
        }
    }
}

/// A named step that reads the context and proposes writes.
///
/// Stages never see writes made by stages that run after them, and never
/// mutate the store themselves.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput>;
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(&ContextStore) -> Result<StageOutput> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&ContextStore) -> Result<StageOutput> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ContextStore) -> Result<StageOutput> {
        (self.f)(ctx)
    }
}
