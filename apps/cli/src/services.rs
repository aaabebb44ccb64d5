//! Collaborator wiring: configuration picks the implementations, the
//! pipelines never see which.

use std::sync::Arc;

use assetguard_cmms::{CmmsClient, MockWorkOrderService};
use assetguard_core::ReactiveServices;
use assetguard_shared::{AppConfig, CollaboratorMode, Result, WorkOrderService, validate_credentials};
use assetguard_vision::{
    BoxAnnotator, EndpointClassifier, HeuristicClassifier, RoboflowDetector, StaticDetector,
};
use tracing::info;

pub(crate) fn work_order_service(config: &AppConfig) -> Result<Arc<dyn WorkOrderService>> {
    match config.collaborators.mode {
        CollaboratorMode::Mock => Ok(Arc::new(MockWorkOrderService::new())),
        CollaboratorMode::Live => {
            validate_credentials(config)?;
            Ok(Arc::new(CmmsClient::from_config(&config.cmms)?))
        }
    }
}

pub(crate) fn reactive_services(config: &AppConfig) -> Result<ReactiveServices> {
    let services = match config.collaborators.mode {
        CollaboratorMode::Mock => ReactiveServices {
            classifier: Arc::new(HeuristicClassifier::new(config.vision.categories())),
            detector: Arc::new(StaticDetector::default()),
            work_orders: Arc::new(MockWorkOrderService::new()),
            annotator: Arc::new(BoxAnnotator::default()),
        },
        CollaboratorMode::Live => {
            validate_credentials(config)?;
            ReactiveServices {
                classifier: Arc::new(EndpointClassifier::from_config(&config.vision)?),
                detector: Arc::new(RoboflowDetector::from_config(&config.vision)?),
                work_orders: Arc::new(CmmsClient::from_config(&config.cmms)?),
                annotator: Arc::new(BoxAnnotator::default()),
            }
        }
    };
    info!(mode = ?config.collaborators.mode, "collaborators ready");
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_mode_needs_no_credentials() {
        let config = AppConfig::default();
        assert!(reactive_services(&config).is_ok());
        assert!(work_order_service(&config).is_ok());
    }

    #[test]
    fn live_mode_requires_credentials() {
        let mut config = AppConfig::default();
        config.collaborators.mode = CollaboratorMode::Live;
        config.cmms.username_env = "ASSETGUARD_TEST_UNSET_USER".into();
        assert!(reactive_services(&config).is_err());
    }
}
