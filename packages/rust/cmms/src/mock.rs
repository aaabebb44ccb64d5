//! In-memory CMMS used in mock mode and in tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use assetguard_shared::{
    ActivityId, ActivityRequest, AssetGuardError, ImagePayload, Result, WorkOrderId,
    WorkOrderRequest, WorkOrderService,
};

#[derive(Default)]
struct Log {
    work_orders: Vec<WorkOrderRequest>,
    activities: Vec<(WorkOrderId, ActivityRequest)>,
    uploads: Vec<(WorkOrderId, String)>,
}

/// Which calls the mock rejects.
#[derive(Debug, Default, Clone, Copy)]
struct Failures {
    all: bool,
    uploads: bool,
    /// Reject activity creation once this many activities exist.
    activities_after: Option<usize>,
}

/// Records every request and hands out sequential ids (`WO-1`, `ACT-1`, ...).
#[derive(Default)]
pub struct MockWorkOrderService {
    log: Mutex<Log>,
    failures: Failures,
}

impl MockWorkOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A CMMS that rejects every request.
    pub fn failing() -> Self {
        Self::with_failures(Failures {
            all: true,
            ..Failures::default()
        })
    }

    /// A CMMS whose attachment uploads fail.
    pub fn failing_uploads() -> Self {
        Self::with_failures(Failures {
            uploads: true,
            ..Failures::default()
        })
    }

    /// A CMMS that accepts `count` activities and rejects the rest.
    pub fn failing_after_activities(count: usize) -> Self {
        Self::with_failures(Failures {
            activities_after: Some(count),
            ..Failures::default()
        })
    }

    fn with_failures(failures: Failures) -> Self {
        Self {
            log: Mutex::default(),
            failures,
        }
    }

    pub fn work_orders(&self) -> Vec<WorkOrderRequest> {
        self.lock().work_orders.clone()
    }

    pub fn activities(&self) -> Vec<(WorkOrderId, ActivityRequest)> {
        self.lock().activities.clone()
    }

    /// Uploaded attachments as `(work order, file name)`.
    pub fn uploads(&self) -> Vec<(WorkOrderId, String)> {
        self.lock().uploads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Log> {
        // A panicking test thread must not hide the log from the others.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, rejected: bool) -> Result<()> {
        if self.failures.all || rejected {
            Err(AssetGuardError::collaborator("cmms", "mock CMMS configured to fail"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkOrderService for MockWorkOrderService {
    async fn create_work_order(&self, request: &WorkOrderRequest) -> Result<WorkOrderId> {
        self.check(false)?;
        let mut log = self.lock();
        log.work_orders.push(request.clone());
        let id = WorkOrderId(format!("WO-{}", log.work_orders.len()));
        info!(work_order_id = %id, title = %request.title, "mock work order created");
        Ok(id)
    }

    async fn create_activity(
        &self,
        work_order_id: &WorkOrderId,
        request: &ActivityRequest,
    ) -> Result<ActivityId> {
        let mut log = self.lock();
        let limit_reached = self
            .failures
            .activities_after
            .is_some_and(|limit| log.activities.len() >= limit);
        self.check(limit_reached)?;
        log.activities.push((work_order_id.clone(), request.clone()));
        Ok(ActivityId(format!("ACT-{}", log.activities.len())))
    }

    async fn upload_annotated_image(
        &self,
        work_order_id: &WorkOrderId,
        image: &ImagePayload,
    ) -> Result<()> {
        self.check(self.failures.uploads)?;
        self.lock()
            .uploads
            .push((work_order_id.clone(), image.name.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetguard_shared::{Priority, WorkOrderKind};

    fn request() -> WorkOrderRequest {
        WorkOrderRequest {
            title: "Inspect".into(),
            summary: "storm".into(),
            notes: None,
            asset_refs: vec![],
            priority: Priority::Low,
            kind: WorkOrderKind::Inspection,
        }
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let cmms = MockWorkOrderService::new();
        let first = cmms.create_work_order(&request()).await.expect("first");
        let second = cmms.create_work_order(&request()).await.expect("second");
        assert_eq!(first.0, "WO-1");
        assert_eq!(second.0, "WO-2");
        assert_eq!(cmms.work_orders().len(), 2);
    }

    #[tokio::test]
    async fn failing_mock_records_nothing() {
        let cmms = MockWorkOrderService::failing();
        assert!(cmms.create_work_order(&request()).await.is_err());
        assert!(cmms.work_orders().is_empty());
    }

    #[tokio::test]
    async fn activity_limit_rejects_later_activities() {
        let cmms = MockWorkOrderService::failing_after_activities(1);
        let work_order = cmms.create_work_order(&request()).await.expect("work order");
        let activity = ActivityRequest {
            description: "Repair crack".into(),
            notes: None,
            priority: Priority::Medium,
            problem_type: "MECHANICAL".into(),
            asset_ref: None,
            duration_minutes: 60,
        };
        let first = cmms.create_activity(&work_order, &activity).await.expect("first");
        assert_eq!(first.0, "ACT-1");
        assert!(cmms.create_activity(&work_order, &activity).await.is_err());
        assert_eq!(cmms.activities().len(), 1);
    }
}
