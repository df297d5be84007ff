use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::clock::work_date;
use super::keys::generate_allocation_key;
use crate::error::{AppError, AppResult};
use crate::models::{
    AllocationConfig, AllocationGrant, AllocationSummary, ClientIdentity, ProxyView,
    SlotSnapshot, WorkSlotView,
};
use crate::modules::persistence::allocation_db::{self, NewAllocation};
use crate::modules::persistence::{proxy_db, work_db, Store};

/// Hands out (work slot, proxy) pairs under the store write lock.
#[derive(Debug, Clone)]
pub struct Allocator {
    store: Store,
    config: AllocationConfig,
}

impl Allocator {
    pub fn new(store: Store, config: AllocationConfig) -> Self {
        Self { store, config }
    }

    pub fn use_cap(&self) -> i64 {
        self.config.proxy_use_cap
    }

    /// Grants one allocation to `client` as of `now`. Everything happens in a
    /// single IMMEDIATE transaction; any failure leaves the store untouched.
    pub fn allocate_at(
        &self,
        client: &ClientIdentity,
        now: DateTime<Utc>,
    ) -> AppResult<AllocationGrant> {
        let cap = self.config.proxy_use_cap;
        let date = work_date(now);
        let now_ms = now.timestamp_millis();
        let expires_at = i64::try_from(self.config.lease_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|lease| now.checked_add_signed(lease))
            .ok_or_else(|| {
                AppError::Config(format!("lease_secs out of range: {}", self.config.lease_secs))
            })?;

        self.store.write(|tx| {
            work_db::init_daily_tracking(tx, date)?;

            let slot = work_db::pick_available_slot(tx, date, client)?
                .ok_or(AppError::NoWorkAvailable)?;
            let proxy = proxy_db::pick_available(tx, cap)?.ok_or(AppError::NoProxyAvailable)?;

            let key = generate_allocation_key(date);
            let snapshot = SlotSnapshot::of(&slot, now);
            allocation_db::insert_allocation(
                tx,
                &NewAllocation {
                    allocation_key: &key,
                    work_date: date,
                    proxy_id: proxy.id,
                    proxy_epoch: proxy.rotation_epoch,
                    client,
                    expires_at: expires_at.timestamp_millis(),
                    snapshot: &snapshot,
                },
                now_ms,
            )?;

            if !proxy_db::increment_use(tx, proxy.id, cap, now_ms)? {
                return Err(AppError::NoProxyAvailable);
            }
            if !work_db::reserve_slot(tx, slot.id, date, now_ms)? {
                return Err(AppError::NoWorkAvailable);
            }
            allocation_db::touch_client(tx, client, now_ms)?;

            let mut proxy_view = ProxyView::from_resource(&proxy);
            proxy_view.use_count += 1;
            Ok(AllocationGrant {
                allocation_key: key,
                work: WorkSlotView {
                    id: slot.id,
                    keyword: slot.keyword.clone(),
                    code: slot.code.clone(),
                },
                proxy: proxy_view,
                settings: slot.settings.clone(),
                expires_at,
            })
        })
    }

    pub async fn allocate(&self, client: ClientIdentity) -> AppResult<AllocationGrant> {
        let this = self.clone();
        let result = self
            .store
            .run_blocking(move |_| this.allocate_at(&client, Utc::now()).map(|g| (g, client)))
            .await;
        match result {
            Ok((grant, client)) => {
                tracing::info!(
                    "Allocated {} (slot {} '{}', proxy {} use {}/{}) to {}#{}/{}",
                    grant.allocation_key,
                    grant.work.id,
                    grant.work.keyword,
                    grant.proxy.id,
                    grant.proxy.use_count,
                    self.config.proxy_use_cap,
                    client.client_ip,
                    client.instance_number,
                    client.user_folder
                );
                Ok(grant)
            }
            Err(e) if e.is_contention() => {
                tracing::debug!("Allocation declined: {}", e);
                Err(e)
            }
            Err(e) => {
                tracing::error!("Allocation failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn lookup(&self, key: String) -> AppResult<AllocationSummary> {
        self.store
            .run_blocking(move |store| {
                store.read(|conn| {
                    allocation_db::find_by_key(conn, &key)?
                        .map(|a| AllocationSummary::of(&a))
                        .ok_or_else(|| AppError::AllocationNotFound(key.clone()))
                })
            })
            .await
    }
}
