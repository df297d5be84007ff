use std::sync::Arc;
use std::time::Duration;

use super::{seed_proxy, seed_slot, wait_for, ScriptedActuator};
use crate::hub::HubServices;
use crate::models::{AllocationStatus, AppConfig, ClientIdentity, WorkOutcome};
use crate::modules::persistence::db::temp_store;
use crate::modules::persistence::proxy_db;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.toggle.cooldown_ms = 50;
    config.toggle.retry_backoff_ms = 20;
    config.reclaim.interval_secs = 1;
    config.reclaim.rescan_enabled = false;
    config
}

#[tokio::test]
async fn single_unit_slot_is_handed_out_once() {
    let (_dir, store) = temp_store();
    seed_slot(&store, "one-shot", 1);
    seed_proxy(&store, "192.168.1.1", 10_011);
    let hub = HubServices::build(
        &test_config(),
        store.clone(),
        Arc::new(ScriptedActuator::new(vec![])),
    );

    hub.allocator
        .allocate(ClientIdentity::new("10.30.0.1", 1, 1))
        .await
        .unwrap();
    let err = hub
        .allocator
        .allocate(ClientIdentity::new("10.30.0.2", 1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_WORK_AVAILABLE");
}

#[tokio::test]
async fn proxy_at_cap_is_rotated_after_completion() {
    let (_dir, store) = temp_store();
    seed_slot(&store, "rotate", 10);
    let proxy = seed_proxy(&store, "192.168.1.1", 10_011);
    store
        .write(|tx| proxy_db::set_use_count(tx, proxy.id, 19))
        .unwrap();
    let actuator = Arc::new(ScriptedActuator::new(vec![]));
    let hub = HubServices::build(&test_config(), store.clone(), actuator.clone());
    hub.start_background().await;

    let grant = hub
        .allocator
        .allocate(ClientIdentity::new("10.30.0.1", 1, 1))
        .await
        .unwrap();
    assert_eq!(grant.proxy.use_count, 20);

    let err = hub
        .allocator
        .allocate(ClientIdentity::new("10.30.0.1", 1, 2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NO_PROXY_AVAILABLE");

    let ack = hub
        .completion
        .complete(grant.allocation_key.clone(), WorkOutcome::with_status("success"))
        .await
        .unwrap();
    assert!(ack.toggle_enqueued);

    let rotated = wait_for(
        || {
            store
                .read(|conn| proxy_db::get_proxy(conn, proxy.id))
                .ok()
                .flatten()
                .map(|p| p.use_count == 0 && p.rotation_epoch == 1)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(rotated);

    let after = store
        .read(|conn| proxy_db::get_proxy(conn, proxy.id))
        .unwrap()
        .unwrap();
    assert_ne!(after.external_ip, proxy.external_ip);
    assert_eq!(actuator.calls().len(), 1);

    hub.allocator
        .allocate(ClientIdentity::new("10.30.0.1", 1, 2))
        .await
        .unwrap();
    hub.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn abandoned_lease_is_reclaimed_and_can_no_longer_be_submitted() {
    let (_dir, store) = temp_store();
    seed_slot(&store, "abandon", 10);
    let proxy = seed_proxy(&store, "192.168.1.1", 10_011);
    let hub = HubServices::build(
        &test_config(),
        store.clone(),
        Arc::new(ScriptedActuator::new(vec![])),
    );

    let grant = hub
        .allocator
        .allocate(ClientIdentity::new("10.30.0.1", 1, 1))
        .await
        .unwrap();
    let extended = hub
        .reclaimer
        .extend(grant.allocation_key.clone(), 200)
        .await
        .unwrap();
    assert!(extended > grant.expires_at);

    let report = hub
        .reclaimer
        .sweep_at(extended.timestamp_millis() + 1)
        .unwrap();
    assert_eq!(report.expired, 1);

    let summary = hub.allocator.lookup(grant.allocation_key.clone()).await.unwrap();
    assert_eq!(summary.status, AllocationStatus::Expired);
    let err = hub
        .completion
        .complete(grant.allocation_key.clone(), WorkOutcome::with_status("success"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_SUBMISSION");

    let p = store
        .read(|conn| proxy_db::get_proxy(conn, proxy.id))
        .unwrap()
        .unwrap();
    assert_eq!(p.use_count, 0);

    let stats = hub.reclaimer.lease_stats().await.unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.expired_today, 1);
}
