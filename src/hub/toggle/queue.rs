use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::actuator::Actuator;
use super::types::{
    QueueItem, QueueItemView, QueueSnapshot, QueueStats, ToggleOutcome, ToggleTarget,
};
use crate::error::AppResult;
use crate::hub::clock::now_millis;
use crate::hub::lifecycle::{self, TaskSlot};
use crate::models::ToggleConfig;
use crate::modules::persistence::proxy_db::{self, ToggleLogEntry};
use crate::modules::persistence::Store;

/// Lower bound for a device-reported cooldown so a zero or bogus value
/// cannot turn the worker into a busy loop against the device.
const MIN_DEVICE_COOLDOWN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub cooldown: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub actuation_timeout: Duration,
}

impl QueueSettings {
    pub fn from_config(config: &ToggleConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            max_retries: config.max_retries.max(1),
            retry_backoff: config.retry_backoff(),
            actuation_timeout: config.actuation_timeout(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    processing: bool,
    cooldown_until: Option<Instant>,
    stats: QueueStats,
}

impl QueueState {
    fn position(&self, proxy_id: i64) -> Option<usize> {
        self.items.iter().position(|i| i.target.proxy_id == proxy_id)
    }

    fn remove(&mut self, proxy_id: i64) -> Option<QueueItem> {
        self.position(proxy_id).and_then(|idx| self.items.remove(idx))
    }
}

struct Inner {
    store: Store,
    actuator: Arc<dyn Actuator>,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    wake: Notify,
    cancel: CancellationToken,
    worker: TaskSlot,
}

/// Serializes proxy rotations behind one global cooldown. A single worker
/// drains the queue; the head item stays queued while it is in flight so a
/// duplicate enqueue for the same proxy is rejected.
#[derive(Clone)]
pub struct ToggleQueue {
    inner: Arc<Inner>,
}

impl ToggleQueue {
    pub fn new(
        store: Store,
        actuator: Arc<dyn Actuator>,
        settings: QueueSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                actuator,
                settings,
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
                cancel,
                worker: lifecycle::empty_slot(),
            }),
        }
    }

    /// Queues a rotation. Returns `false` when the proxy is already queued.
    pub fn enqueue(&self, target: ToggleTarget) -> bool {
        let size = {
            let mut state = self.inner.state.lock();
            if state.position(target.proxy_id).is_some() {
                tracing::debug!("Proxy {} already queued for rotation", target.proxy_id);
                return false;
            }
            tracing::info!(
                "Queued rotation for proxy {} ({}:{})",
                target.proxy_id,
                target.server_ip,
                target.port
            );
            state.items.push_back(QueueItem {
                target,
                enqueued_at: Utc::now(),
                retry_count: 0,
                max_retries: self.inner.settings.max_retries,
            });
            state.stats.enqueued += 1;
            state.items.len()
        };
        tracing::debug!("Toggle queue size: {}", size);
        self.inner.wake.notify_one();
        true
    }

    pub fn status(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        let now = Instant::now();
        let cooldown_remaining = state
            .cooldown_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();
        let wall_now = Utc::now();
        QueueSnapshot {
            queue_size: state.items.len(),
            processing: state.processing,
            global_cooldown_remaining_secs: cooldown_remaining.as_secs_f64().ceil() as u64,
            stats: state.stats.clone(),
            queue: state
                .items
                .iter()
                .map(|item| QueueItemView {
                    proxy_id: item.target.proxy_id,
                    port: item.target.port,
                    retry_count: item.retry_count,
                    max_retries: item.max_retries,
                    waiting_secs: (wall_now - item.enqueued_at).num_seconds().max(0),
                })
                .collect(),
        }
    }

    /// Drops every queued item, including one currently in flight; its
    /// outcome is still recorded but it will not be retried.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut state = self.inner.state.lock();
            let n = state.items.len();
            state.items.clear();
            n
        };
        tracing::info!("Toggle queue cleared ({} items removed)", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn start(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run().await });
        lifecycle::install_task(&self.inner.worker, handle, "Toggle queue").await;
        tracing::info!(
            "Toggle queue worker started (cooldown: {:?}, max retries: {})",
            self.inner.settings.cooldown,
            self.inner.settings.max_retries
        );
    }

    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.cancel.cancel();
        lifecycle::join_task(&self.inner.worker, timeout, "Toggle queue").await;
    }

    pub async fn is_running(&self) -> bool {
        lifecycle::is_running(&self.inner.worker).await
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        loop {
            let head = {
                let mut state = self.state.lock();
                let head = state.items.front().cloned();
                state.processing = head.is_some();
                head
            };

            let Some(item) = head else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.wake.notified() => {}
                }
                continue;
            };

            if let Some(deadline) = self.cooldown_deadline() {
                let wait = deadline.saturating_duration_since(Instant::now());
                self.state.lock().stats.cooldown_waits += 1;
                tracing::info!("Waiting {:?} for the global toggle cooldown", wait);
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
                continue;
            }

            self.state.lock().stats.total_requests += 1;
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = tokio::time::timeout(
                    self.settings.actuation_timeout,
                    self.actuator.actuate(&item.target),
                ) => res.unwrap_or_else(|_| ToggleOutcome::Failed {
                    reason: format!(
                        "actuation timed out after {:?}",
                        self.settings.actuation_timeout
                    ),
                }),
            };

            if let Some(backoff) = self.settle(&item, outcome).await {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }

        self.state.lock().processing = false;
        tracing::info!("Toggle queue worker stopped");
    }

    fn cooldown_deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        self.state.lock().cooldown_until.filter(|until| *until > now)
    }

    /// Applies an actuation outcome; returns the backoff to wait before the
    /// next attempt when the item was sent to the back of the queue.
    async fn settle(&self, item: &QueueItem, outcome: ToggleOutcome) -> Option<Duration> {
        let proxy_id = item.target.proxy_id;
        match outcome {
            ToggleOutcome::Rotated {
                old_ip,
                new_ip,
                processing_ms,
                is_virtual,
            } => {
                let persisted = self
                    .persist_rotation(
                        proxy_id,
                        old_ip.clone(),
                        new_ip.clone(),
                        processing_ms,
                        is_virtual,
                    )
                    .await;
                let mut state = self.state.lock();
                state.remove(proxy_id);
                state.cooldown_until = Some(Instant::now() + self.settings.cooldown);
                match persisted {
                    Ok(()) => {
                        state.stats.success_count += 1;
                        state.stats.last_success_at = Some(Utc::now());
                        tracing::info!(
                            "Proxy {} rotated: {} -> {}{}",
                            proxy_id,
                            old_ip.as_deref().unwrap_or("unknown"),
                            new_ip,
                            if is_virtual { " (virtual)" } else { "" }
                        );
                    }
                    Err(e) => {
                        state.stats.fail_count += 1;
                        tracing::error!(
                            "Proxy {} rotated to {} but the store update failed: {}",
                            proxy_id,
                            new_ip,
                            e
                        );
                    }
                }
                None
            }
            ToggleOutcome::Cooldown { remaining } => {
                let wait = remaining.max(MIN_DEVICE_COOLDOWN);
                self.state.lock().cooldown_until = Some(Instant::now() + wait);
                tracing::info!(
                    "Device reports global cooldown, retrying proxy {} in {:?}",
                    proxy_id,
                    wait
                );
                None
            }
            ToggleOutcome::Locked => {
                let mut state = self.state.lock();
                state.remove(proxy_id);
                state.stats.skipped_count += 1;
                tracing::warn!(
                    "Proxy {} is locked by another process, dropped from the queue",
                    proxy_id
                );
                None
            }
            ToggleOutcome::Failed { reason } => {
                let mut state = self.state.lock();
                let mut current = state.remove(proxy_id)?;
                current.retry_count += 1;
                if current.retry_count >= current.max_retries {
                    state.stats.fail_count += 1;
                    tracing::error!(
                        "Rotation of proxy {} failed for good after {} attempts: {}",
                        proxy_id,
                        current.retry_count,
                        reason
                    );
                    return None;
                }
                state.stats.retry_count += 1;
                tracing::warn!(
                    "Rotation of proxy {} failed ({}/{}), retrying later: {}",
                    proxy_id,
                    current.retry_count,
                    current.max_retries,
                    reason
                );
                state.items.push_back(current);
                Some(self.settings.retry_backoff)
            }
        }
    }

    async fn persist_rotation(
        &self,
        proxy_id: i64,
        old_ip: Option<String>,
        new_ip: String,
        processing_ms: Option<i64>,
        is_virtual: bool,
    ) -> AppResult<()> {
        self.store
            .run_blocking(move |store| {
                store.write(|tx| {
                    let now = now_millis();
                    if !proxy_db::record_rotation(tx, proxy_id, &new_ip, now)? {
                        tracing::warn!("Rotated proxy {} no longer exists in the store", proxy_id);
                        return Ok(());
                    }
                    proxy_db::insert_toggle_log(
                        tx,
                        &ToggleLogEntry {
                            proxy_id,
                            old_ip: old_ip.as_deref(),
                            new_ip: &new_ip,
                            processing_ms,
                            is_virtual,
                        },
                        now,
                    )
                })
            })
            .await
    }
}
