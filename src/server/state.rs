use std::sync::Arc;

use crate::hub::HubServices;

// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<HubServices>,
    pub default_extend_secs: u64,
}

impl AppState {
    pub fn new(hub: HubServices) -> Self {
        Self {
            hub: Arc::new(hub),
            default_extend_secs: crate::constants::DEFAULT_EXTEND_SECS,
        }
    }
}
