//! Shared types, error model, configuration, and collaborator traits for AssetGuard.
//!
//! This crate is the foundation depended on by all other AssetGuard crates.
//! It provides:
//! - [`AssetGuardError`], the unified error type
//! - Domain types ([`DetectedProblem`], [`HistoricalEventRecord`], [`AssetRiskRecord`],
//!   [`RiskScore`], [`RunSummary`], ...)
//! - Capability traits for external services ([`Classifier`], [`Detector`],
//!   [`WorkOrderService`], [`Annotator`])
//! - Configuration ([`AppConfig`], config loading)

pub mod collaborators;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use collaborators::{
    ActivityId, ActivityRequest, Annotator, Classifier, Detector, Priority, WorkOrderId,
    WorkOrderKind, WorkOrderRequest, WorkOrderService,
};
pub use config::{
    AppConfig, AuditConfig, CmmsConfig, CollaboratorMode, CollaboratorsConfig, DatasetConfig,
    ProactiveConfig, ReactiveConfig, VisionConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_secret, validate_credentials,
};
pub use error::{AssetGuardError, Result};
pub use types::{
    AssetRiskRecord, BoundingBox, CRITICAL_THRESHOLD, Classification, ContributingFactors,
    DetectedProblem, FEATURE_NAMES, HIGH_THRESHOLD, HistoricalEventRecord, ImagePayload, Incident,
    MEDIUM_THRESHOLD, PipelineKind, RiskScore, RiskTier, RunId, RunStatus, RunSummary, Severity,
    WeatherEvent,
};
