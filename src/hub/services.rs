use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::toggle::{Actuator, QueueSettings, ToggleQueue};
use super::{Allocator, CompletionHandler, LeaseReclaimer, SaturationRescan};
use crate::models::AppConfig;
use crate::modules::persistence::Store;

/// Every hub component wired to one store and one rotation queue.
#[derive(Clone)]
pub struct HubServices {
    pub store: Store,
    pub allocator: Allocator,
    pub completion: CompletionHandler,
    pub reclaimer: LeaseReclaimer,
    pub rescan: SaturationRescan,
    pub queue: ToggleQueue,
    rescan_enabled: bool,
    cancel: CancellationToken,
}

impl HubServices {
    pub fn build(config: &AppConfig, store: Store, actuator: Arc<dyn Actuator>) -> Self {
        let cancel = CancellationToken::new();
        let cap = config.allocation.proxy_use_cap;

        let queue = ToggleQueue::new(
            store.clone(),
            actuator,
            QueueSettings::from_config(&config.toggle),
            cancel.child_token(),
        );
        let allocator = Allocator::new(store.clone(), config.allocation.clone());
        let completion = CompletionHandler::new(store.clone(), queue.clone(), cap);
        let reclaimer = LeaseReclaimer::new(
            store.clone(),
            Duration::from_secs(config.reclaim.interval_secs.max(1)),
            config.allocation.max_extend_secs,
            cancel.child_token(),
        );
        let rescan = SaturationRescan::new(
            store.clone(),
            queue.clone(),
            cap,
            Duration::from_secs(config.reclaim.rescan_interval_secs.max(1)),
            Duration::from_secs(config.reclaim.rescan_idle_secs),
            cancel.child_token(),
        );

        Self {
            store,
            allocator,
            completion,
            reclaimer,
            rescan,
            queue,
            rescan_enabled: config.reclaim.rescan_enabled,
            cancel,
        }
    }

    pub async fn start_background(&self) {
        self.queue.start().await;
        self.reclaimer.start().await;
        if self.rescan_enabled {
            self.rescan.start().await;
        }
    }

    /// Cancels every background task and waits up to `timeout` for each.
    pub async fn shutdown(&self, timeout: Duration) {
        tracing::info!("Stopping hub background tasks...");
        self.cancel.cancel();
        self.rescan.shutdown(timeout).await;
        self.reclaimer.shutdown(timeout).await;
        self.queue.shutdown(timeout).await;
        tracing::info!("Hub background tasks stopped");
    }
}
