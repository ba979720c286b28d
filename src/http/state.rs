use crate::service::MonitorService;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MonitorService>,
}

impl AppState {
    pub fn new(service: Arc<MonitorService>) -> Self {
        Self { service }
    }
}
