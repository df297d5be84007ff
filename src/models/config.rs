use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub toggle: ToggleConfig,
    #[serde(default)]
    pub reclaim: ReclaimConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allow_lan_access: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn bind_host(&self) -> &'static str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            allow_lan_access: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    // Relative paths resolve against the data dir.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_proxy_use_cap")]
    pub proxy_use_cap: i64,
    #[serde(default = "default_max_extend_secs")]
    pub max_extend_secs: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lease_secs: default_lease_secs(),
            proxy_use_cap: default_proxy_use_cap(),
            max_extend_secs: default_max_extend_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_actuator_url")]
    pub actuator_url: String,
    #[serde(default = "default_toggle_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_toggle_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_toggle_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
    #[serde(default = "default_toggle_timeout_secs")]
    pub toggle_timeout_secs: u64,
    #[serde(default = "default_actuation_timeout_secs")]
    pub actuation_timeout_secs: u64,
    #[serde(default = "default_subnet_port_base")]
    pub subnet_port_base: u16,
    #[serde(default = "default_virtual_port_threshold")]
    pub virtual_port_threshold: u16,
}

impl ToggleConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn actuation_timeout(&self) -> Duration {
        Duration::from_secs(self.actuation_timeout_secs)
    }
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            actuator_url: default_actuator_url(),
            cooldown_ms: default_toggle_cooldown_ms(),
            max_retries: default_toggle_max_retries(),
            retry_backoff_ms: default_toggle_retry_backoff_ms(),
            status_timeout_secs: default_status_timeout_secs(),
            toggle_timeout_secs: default_toggle_timeout_secs(),
            actuation_timeout_secs: default_actuation_timeout_secs(),
            subnet_port_base: default_subnet_port_base(),
            virtual_port_threshold: default_virtual_port_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimConfig {
    #[serde(default = "default_reclaim_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub rescan_enabled: bool,
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
    #[serde(default = "default_rescan_idle_secs")]
    pub rescan_idle_secs: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reclaim_interval_secs(),
            rescan_enabled: true,
            rescan_interval_secs: default_rescan_interval_secs(),
            rescan_idle_secs: default_rescan_idle_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_days: default_log_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_lease_secs() -> u64 {
    DEFAULT_LEASE_SECS
}
fn default_proxy_use_cap() -> i64 {
    DEFAULT_PROXY_USE_CAP
}
fn default_max_extend_secs() -> u64 {
    DEFAULT_MAX_EXTEND_SECS
}
fn default_actuator_url() -> String {
    DEFAULT_ACTUATOR_URL.to_string()
}
fn default_toggle_cooldown_ms() -> u64 {
    DEFAULT_TOGGLE_COOLDOWN_MS
}
fn default_toggle_max_retries() -> u32 {
    DEFAULT_TOGGLE_MAX_RETRIES
}
fn default_toggle_retry_backoff_ms() -> u64 {
    DEFAULT_TOGGLE_RETRY_BACKOFF_MS
}
fn default_status_timeout_secs() -> u64 {
    DEFAULT_STATUS_TIMEOUT_SECS
}
fn default_toggle_timeout_secs() -> u64 {
    DEFAULT_TOGGLE_TIMEOUT_SECS
}
fn default_actuation_timeout_secs() -> u64 {
    DEFAULT_ACTUATION_TIMEOUT_SECS
}
fn default_subnet_port_base() -> u16 {
    DEFAULT_SUBNET_PORT_BASE
}
fn default_virtual_port_threshold() -> u16 {
    DEFAULT_VIRTUAL_PORT_THRESHOLD
}
fn default_reclaim_interval_secs() -> u64 {
    DEFAULT_RECLAIM_INTERVAL_SECS
}
fn default_rescan_interval_secs() -> u64 {
    DEFAULT_RESCAN_INTERVAL_SECS
}
fn default_rescan_idle_secs() -> u64 {
    DEFAULT_RESCAN_IDLE_SECS
}
fn default_log_retention_days() -> u64 {
    DEFAULT_LOG_RETENTION_DAYS
}
