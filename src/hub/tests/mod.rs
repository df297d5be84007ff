mod end_to_end;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Days;
use parking_lot::Mutex;

use crate::hub::clock::today;
use crate::hub::toggle::{Actuator, ToggleOutcome, ToggleTarget};
use crate::models::{
    AllocationConfig, NewProxy, NewWorkSlot, ProxyResource, ProxyStatus, SlotSettings, WorkSlot,
};
use crate::modules::persistence::{proxy_db, work_db, Store};

/// Plays back scripted outcomes, then rotates successfully forever.
pub(crate) struct ScriptedActuator {
    script: Mutex<VecDeque<ToggleOutcome>>,
    calls: Mutex<Vec<(i64, Instant)>>,
    counter: AtomicU32,
}

impl ScriptedActuator {
    pub(crate) fn new(script: Vec<ToggleOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(i64, Instant)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Actuator for ScriptedActuator {
    async fn actuate(&self, target: &ToggleTarget) -> ToggleOutcome {
        self.calls.lock().push((target.proxy_id, Instant::now()));
        if let Some(outcome) = self.script.lock().pop_front() {
            return outcome;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        ToggleOutcome::Rotated {
            old_ip: target.external_ip.clone(),
            new_ip: format!("198.51.100.{}", n % 250 + 1),
            processing_ms: Some(5),
            is_virtual: false,
        }
    }
}

pub(crate) fn alloc_config(cap: i64) -> AllocationConfig {
    AllocationConfig {
        lease_secs: 120,
        proxy_use_cap: cap,
        max_extend_secs: 3600,
    }
}

pub(crate) fn seed_proxy(store: &Store, server_ip: &str, port: u16) -> ProxyResource {
    store
        .write(|tx| {
            proxy_db::upsert_proxy(
                tx,
                &NewProxy {
                    server_ip: server_ip.to_string(),
                    port,
                    external_ip: Some(format!("100.64.0.{}", port % 250)),
                    status: ProxyStatus::Active,
                },
                0,
            )
        })
        .expect("seed proxy")
}

/// Active slot whose window comfortably covers today.
pub(crate) fn seed_slot(store: &Store, keyword: &str, daily_target: i64) -> WorkSlot {
    let today = today();
    store
        .write(|tx| {
            work_db::create_work_slot(
                tx,
                &NewWorkSlot {
                    keyword: keyword.to_string(),
                    code: None,
                    start_date: today - Days::new(2),
                    end_date: today + Days::new(2),
                    daily_target,
                    priority: 0,
                    settings: SlotSettings::default(),
                },
                0,
            )
        })
        .expect("seed slot")
}

/// Polls `check` until it holds or `timeout` elapses.
pub(crate) async fn wait_for(check: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
