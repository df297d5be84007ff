use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::clock::now_millis;
use super::lifecycle::{self, TaskSlot};
use super::toggle::{ToggleQueue, ToggleTarget};
use crate::error::AppResult;
use crate::modules::persistence::{proxy_db, Store};

/// Finds proxies stuck at their use cap with nothing queued for them (after a
/// restart, a cleared queue or a dropped rotation) and queues them again.
#[derive(Clone)]
pub struct SaturationRescan {
    store: Store,
    queue: ToggleQueue,
    use_cap: i64,
    interval: Duration,
    idle_grace: Duration,
    cancel: CancellationToken,
    worker: TaskSlot,
}

impl SaturationRescan {
    pub fn new(
        store: Store,
        queue: ToggleQueue,
        use_cap: i64,
        interval: Duration,
        idle_grace: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            queue,
            use_cap,
            interval,
            idle_grace,
            cancel,
            worker: lifecycle::empty_slot(),
        }
    }

    /// Returns how many proxies were newly queued.
    pub async fn scan_at(&self, now_ms: i64) -> AppResult<usize> {
        let cap = self.use_cap;
        let idle_before = now_ms - self.idle_grace.as_millis() as i64;
        let saturated = self
            .store
            .run_blocking(move |store| {
                store.read(|conn| proxy_db::list_saturated_idle(conn, cap, idle_before))
            })
            .await?;

        let queued = saturated
            .iter()
            .filter(|proxy| self.queue.enqueue(ToggleTarget::from_proxy(proxy)))
            .count();
        if queued > 0 {
            tracing::info!("Saturation rescan queued {} idle proxy(ies) for rotation", queued);
        }
        Ok(queued)
    }

    pub async fn start(&self) {
        let this = self.clone();
        let cancel = self.cancel.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Saturation rescan received cancel signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = this.scan_at(now_millis()).await {
                            tracing::error!("Saturation rescan failed: {}", e);
                        }
                    }
                }
            }
        });

        lifecycle::install_task(&self.worker, handle, "Saturation rescan").await;
        tracing::info!(
            "Saturation rescan started (interval: {:?}, idle grace: {:?})",
            self.interval,
            self.idle_grace
        );
    }

    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        lifecycle::join_task(&self.worker, timeout, "Saturation rescan").await;
    }
}
