//! Shared application state threaded through every handler via
//! `axum::extract::State`, the way `knhk-workflow-engine::api::rest`
//! threads `Arc<WorkflowEngine>`.

use std::sync::Arc;

use shield_metering::{AccountRegistry, FleetHealth};
use shield_pipeline::PipelineOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub accounts: Arc<AccountRegistry>,
    pub fleet: Arc<FleetHealth>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, accounts: Arc<AccountRegistry>, fleet: Arc<FleetHealth>) -> Self {
        Self { orchestrator, accounts, fleet }
    }
}
