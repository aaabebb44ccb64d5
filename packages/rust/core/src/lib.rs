//! Pipeline orchestration for AssetGuard.
//!
//! Stages share state through a [`ContextStore`] and are composed with
//! [`SequentialComposer`] and [`ParallelComposer`]. The two concrete
//! pipelines live in [`reactive`] and [`proactive`].

pub mod audit;
pub mod composer;
pub mod context;
pub mod keys;
pub mod proactive;
pub mod reactive;
pub mod run;
pub mod stage;
pub mod summary;

pub use audit::write_audit_log;
pub use composer::{Flow, ParallelComposer, SequentialComposer};
pub use context::{ContextStore, ContextUpdate, Write};
pub use proactive::{ProactivePolicy, assessment_pipeline, proactive_pipeline, proactive_trigger};
pub use reactive::{ReactivePolicy, ReactiveServices, reactive_pipeline, reactive_trigger};
pub use run::{Pipeline, PipelineRun, ProgressReporter, SilentProgress};
pub use stage::{FnStage, Stage, StageOutput};
