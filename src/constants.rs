pub const DATA_DIR_NAME: &str = ".proxy-hub";
pub const DB_FILE_NAME: &str = "hub.db";

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_LEASE_SECS: u64 = 120;
pub const DEFAULT_PROXY_USE_CAP: i64 = 20;
pub const DEFAULT_MAX_EXTEND_SECS: u64 = 3_600;
pub const DEFAULT_EXTEND_SECS: u64 = 60;
// Upper bound for both the lease length and a single extension.
pub const MAX_LEASE_SECS: u64 = 86_400;

pub const DEFAULT_TOGGLE_COOLDOWN_MS: u64 = 31_000;
pub const DEFAULT_TOGGLE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TOGGLE_RETRY_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_ACTUATOR_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_STATUS_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TOGGLE_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_ACTUATION_TIMEOUT_SECS: u64 = 35;

// Subnet number on the device is the proxy port minus this base.
pub const DEFAULT_SUBNET_PORT_BASE: u16 = 10_000;
// Ports at or above this (or 10.x server addresses) have no physical device.
pub const DEFAULT_VIRTUAL_PORT_THRESHOLD: u16 = 20_000;
pub const VIRTUAL_DELAY_MIN_MS: u64 = 100;
pub const VIRTUAL_DELAY_MAX_MS: u64 = 500;

pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RESCAN_IDLE_SECS: u64 = 300;

pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

pub const ALLOCATION_KEY_PREFIX: &str = "WA";
pub const SHUTDOWN_GRACE_SECS: u64 = 5;
