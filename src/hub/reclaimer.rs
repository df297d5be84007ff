use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::clock::{now_millis, today};
use super::lifecycle::{self, TaskSlot};
use crate::error::{AppError, AppResult};
use crate::models::{millis_to_utc, LeaseStats};
use crate::modules::persistence::allocation_db::{self, ActivityEntry};
use crate::modules::persistence::{proxy_db, work_db, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub proxies_released: usize,
}

/// Expires abandoned leases and gives their proxy use and slot quota back.
#[derive(Clone)]
pub struct LeaseReclaimer {
    store: Store,
    interval: Duration,
    max_extend_secs: u64,
    cancel: CancellationToken,
    worker: TaskSlot,
}

impl LeaseReclaimer {
    pub fn new(
        store: Store,
        interval: Duration,
        max_extend_secs: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            interval,
            max_extend_secs,
            cancel,
            worker: lifecycle::empty_slot(),
        }
    }

    /// Expires every live lease whose deadline is before `now_ms`, all in one
    /// transaction. A failure rolls the whole batch back.
    pub fn sweep_at(&self, now_ms: i64) -> AppResult<SweepReport> {
        self.store.write(|tx| {
            let mut report = SweepReport::default();
            for allocation in allocation_db::list_expired(tx, now_ms)? {
                if !allocation_db::mark_expired(tx, allocation.id, now_ms)? {
                    continue;
                }
                if proxy_db::release_use(tx, allocation.proxy_id, allocation.proxy_epoch, now_ms)? {
                    report.proxies_released += 1;
                }
                work_db::release_slot(tx, allocation.work_slot_id, allocation.work_date)?;
                allocation_db::insert_activity(
                    tx,
                    &ActivityEntry {
                        client: &allocation.client,
                        allocation_id: Some(allocation.id),
                        work_slot_id: Some(allocation.work_slot_id),
                        status: "timeout",
                        execution_time_ms: None,
                    },
                    now_ms,
                )?;
                tracing::debug!(
                    "Lease {} expired (slot {}, proxy {})",
                    allocation.allocation_key,
                    allocation.work_slot_id,
                    allocation.proxy_id
                );
                report.expired += 1;
            }
            Ok(report)
        })
    }

    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let this = self.clone();
        self.store
            .run_blocking(move |_| this.sweep_at(now_millis()))
            .await
    }

    pub fn extend_at(&self, key: &str, secs: u64, now_ms: i64) -> AppResult<DateTime<Utc>> {
        if secs == 0 || secs > self.max_extend_secs {
            return Err(AppError::InvalidRequest(format!(
                "seconds must be between 1 and {}",
                self.max_extend_secs
            )));
        }
        let expires_at = self
            .store
            .write(|tx| allocation_db::extend_lease(tx, key, secs as i64, now_ms))?;
        Ok(millis_to_utc(expires_at))
    }

    pub async fn extend(&self, key: String, secs: u64) -> AppResult<DateTime<Utc>> {
        let this = self.clone();
        let log_key = key.clone();
        let result = self
            .store
            .run_blocking(move |_| this.extend_at(&key, secs, now_millis()))
            .await;
        match &result {
            Ok(expires_at) => tracing::info!("Lease {} extended to {}", log_key, expires_at),
            Err(e) => tracing::warn!("Lease extension for {} refused: {}", log_key, e),
        }
        result
    }

    pub async fn lease_stats(&self) -> AppResult<LeaseStats> {
        self.store
            .run_blocking(|store| {
                store.read(|conn| allocation_db::lease_stats(conn, today(), now_millis()))
            })
            .await
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
                        tracing::info!("Lease reclaimer received cancel signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match this.sweep().await {
                            Ok(report) if report.expired > 0 => tracing::info!(
                                "Lease sweep: expired {} allocation(s), released {} proxy use(s)",
                                report.expired,
                                report.proxies_released
                            ),
                            Ok(_) => {}
                            Err(e) => tracing::error!("Lease sweep failed, retrying next tick: {}", e),
                        }
                    }
                }
            }
        });

        lifecycle::install_task(&self.worker, handle, "Lease reclaimer").await;
        tracing::info!("Lease reclaimer started (interval: {:?})", self.interval);
    }

    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        lifecycle::join_task(&self.worker, timeout, "Lease reclaimer").await;
    }
}
