use super::toggle::{ToggleQueue, ToggleTarget};
use crate::error::{AppError, AppResult};
use crate::hub::clock::now_millis;
use crate::models::{CompletionAck, WorkOutcome};
use crate::modules::persistence::allocation_db::{self, ActivityEntry};
use crate::modules::persistence::{proxy_db, work_db, Store};

/// What a committed completion produced.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub result_id: i64,
    pub rotation: Option<ToggleTarget>,
}

/// Records worker outcomes and feeds saturated proxies to the rotation queue.
#[derive(Clone)]
pub struct CompletionHandler {
    store: Store,
    queue: ToggleQueue,
    use_cap: i64,
}

impl CompletionHandler {
    pub fn new(store: Store, queue: ToggleQueue, use_cap: i64) -> Self {
        Self {
            store,
            queue,
            use_cap,
        }
    }

    /// Closes the allocation named by `key` in one transaction. The returned
    /// rotation target is set when the consumed proxy sits at its use cap.
    pub fn complete_at(
        &self,
        key: &str,
        outcome: &WorkOutcome,
        now_ms: i64,
    ) -> AppResult<CompletionRecord> {
        let cap = self.use_cap;
        self.store.write(|tx| {
            let allocation = allocation_db::find_by_key(tx, key)?
                .ok_or_else(|| AppError::InvalidAllocationKey(key.to_string()))?;
            if allocation.status.is_terminal() {
                return Err(AppError::DuplicateSubmission(key.to_string()));
            }

            let result_id = allocation_db::insert_work_result(tx, &allocation, outcome, now_ms)?;
            if !allocation_db::mark_completed(tx, allocation.id, now_ms)? {
                return Err(AppError::DuplicateSubmission(key.to_string()));
            }
            work_db::record_slot_outcome(
                tx,
                allocation.work_slot_id,
                allocation.work_date,
                outcome.is_success(),
            )?;
            allocation_db::insert_activity(
                tx,
                &ActivityEntry {
                    client: &allocation.client,
                    allocation_id: Some(allocation.id),
                    work_slot_id: Some(allocation.work_slot_id),
                    status: &outcome.result.status,
                    execution_time_ms: outcome.execution.execution_time_ms,
                },
                now_ms,
            )?;

            let rotation = proxy_db::get_proxy(tx, allocation.proxy_id)?
                .filter(|p| p.use_count >= cap)
                .map(|p| ToggleTarget::from_proxy(&p));
            Ok(CompletionRecord {
                result_id,
                rotation,
            })
        })
    }

    pub async fn complete(&self, key: String, outcome: WorkOutcome) -> AppResult<CompletionAck> {
        let this = self.clone();
        let status = outcome.result.status.clone();
        let log_key = key.clone();
        let record = self
            .store
            .run_blocking(move |_| this.complete_at(&key, &outcome, now_millis()))
            .await;

        let record = match record {
            Ok(record) => record,
            Err(e @ (AppError::InvalidAllocationKey(_) | AppError::DuplicateSubmission(_))) => {
                tracing::warn!("Rejected result for {}: {}", log_key, e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Failed to record result for {}: {}", log_key, e);
                return Err(e);
            }
        };

        let toggle_enqueued = match record.rotation {
            Some(target) => {
                tracing::info!(
                    "Proxy {} reached its use cap of {}, requesting rotation",
                    target.proxy_id,
                    self.use_cap
                );
                self.queue.enqueue(target)
            }
            None => false,
        };
        tracing::info!(
            "Result recorded for {} (status: {}, result id: {})",
            log_key,
            status,
            record.result_id
        );
        Ok(CompletionAck {
            result_id: record.result_id,
            toggle_enqueued,
        })
    }
}
