use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

pub(crate) type TaskSlot = Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>;

pub(crate) fn empty_slot() -> TaskSlot {
    Arc::new(tokio::sync::Mutex::new(None))
}

/// Stores `handle`, aborting whatever task previously occupied the slot.
pub(crate) async fn install_task(slot: &TaskSlot, handle: JoinHandle<()>, task_name: &str) {
    let mut guard = slot.lock().await;
    if let Some(old) = guard.take() {
        old.abort();
        tracing::warn!("Aborted previous {} task", task_name);
    }
    *guard = Some(handle);
}

/// Waits for a cancelled task to wind down, aborting it once `timeout` passes.
pub(crate) async fn join_task(slot: &TaskSlot, timeout: Duration, task_name: &str) {
    let Some(mut handle) = slot.lock().await.take() else {
        return;
    };

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => tracing::debug!("{} task stopped", task_name),
        Ok(Err(e)) if e.is_cancelled() => tracing::info!("{} task aborted", task_name),
        Ok(Err(e)) => tracing::warn!("{} task error: {}", task_name, e),
        Err(_) => {
            handle.abort();
            tracing::warn!(
                "{} task did not stop within {:?}, force-aborted",
                task_name,
                timeout
            );
        }
    }
}

pub(crate) async fn is_running(slot: &TaskSlot) -> bool {
    slot.lock()
        .await
        .as_ref()
        .map(|h| !h.is_finished())
        .unwrap_or(false)
}
