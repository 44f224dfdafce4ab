use std::sync::Arc;

use crate::alignment::AnalysisOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
/// The orchestrator owns the model adapter and the result cache for the process.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
}
