//! Application state for the bridge API

use std::sync::Arc;

use mgmt_gateway::BridgeHandler;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    handler: Arc<BridgeHandler>,
}

impl AppState {
    pub fn new(handler: Arc<BridgeHandler>) -> Self {
        Self { handler }
    }

    /// The bridge every request is dispatched to
    pub fn handler(&self) -> &Arc<BridgeHandler> {
        &self.handler
    }
}
