//! Per-run audit log: `<dir>/<run_id>.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use assetguard_shared::{AssetGuardError, PipelineKind, Result, RunId, RunStatus};

use crate::context::ContextStore;
use crate::run::PipelineRun;

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    run_id: &'a RunId,
    kind: PipelineKind,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_stage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    written_at: DateTime<Utc>,
    context: &'a ContextStore,
}

/// Write a finished run to `dir`, creating the directory if needed.
pub fn write_audit_log(dir: &Path, run: &PipelineRun) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| AssetGuardError::io(dir, e))?;

    let record = AuditRecord {
        run_id: run.run_id(),
        kind: run.kind(),
        status: run.status(),
        reason: run.reason(),
        failed_stage: run.error().and_then(|e| e.stage()),
        error: run.error().map(|e| e.to_string()),
        written_at: Utc::now(),
        context: run.context(),
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| AssetGuardError::parse(format!("audit record: {e}")))?;

    let path = dir.join(format!("{}.json", run.run_id()));
    std::fs::write(&path, json).map_err(|e| AssetGuardError::io(&path, e))?;
    debug!(path = %path.display(), "audit log written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_run_with_context() {
        let dir = std::env::temp_dir().join(format!("ag-audit-{}", uuid::Uuid::now_v7()));
        let mut ctx = ContextStore::new();
        ctx.set("trigger.image_path", "pole.jpg").expect("set");
        let mut run = PipelineRun::new(PipelineKind::Reactive, ctx);
        run.fail(AssetGuardError::Network("timeout".into()).in_stage("detect"))
            .expect("fail");

        let path = write_audit_log(&dir, &run).expect("write");
        assert!(path.ends_with(format!("{}.json", run.run_id())));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written["status"], "FAILED");
        assert_eq!(written["failed_stage"], "detect");
        assert_eq!(written["context"]["trigger.image_path"], "pole.jpg");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
