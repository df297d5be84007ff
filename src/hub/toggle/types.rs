use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ProxyResource;

/// What the rotation queue needs to know about a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleTarget {
    pub proxy_id: i64,
    pub server_ip: String,
    pub port: u16,
    pub external_ip: Option<String>,
}

impl ToggleTarget {
    pub fn from_proxy(proxy: &ProxyResource) -> Self {
        Self {
            proxy_id: proxy.id,
            server_ip: proxy.server_ip.clone(),
            port: proxy.port,
            external_ip: proxy.external_ip.clone(),
        }
    }

    /// Simulated proxies: high ports or hosts inside 10.0.0.0/8.
    pub fn is_virtual(&self, port_threshold: u16) -> bool {
        if self.port >= port_threshold {
            return true;
        }
        match self.server_ip.parse::<Ipv4Addr>() {
            Ok(addr) => addr.octets()[0] == 10,
            Err(_) => self.server_ip.starts_with("10."),
        }
    }

    /// Device subnet index addressed by this proxy's port.
    pub fn subnet(&self, port_base: u16) -> Option<u16> {
        self.port.checked_sub(port_base)
    }
}

/// Result of a single actuation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    Rotated {
        old_ip: Option<String>,
        new_ip: String,
        processing_ms: Option<i64>,
        is_virtual: bool,
    },
    /// The device is inside its global cooldown for `remaining`.
    Cooldown { remaining: Duration },
    /// Another process holds the device lock for this proxy.
    Locked,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub(crate) struct QueueItem {
    pub target: ToggleTarget,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub total_requests: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub skipped_count: u64,
    pub cooldown_waits: u64,
    pub retry_count: u64,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueItemView {
    pub proxy_id: i64,
    pub port: u16,
    pub retry_count: u32,
    pub max_retries: u32,
    pub waiting_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue_size: usize,
    pub processing: bool,
    pub global_cooldown_remaining_secs: u64,
    pub stats: QueueStats,
    pub queue: Vec<QueueItemView>,
}
