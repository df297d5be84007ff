use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::constants::{DATA_DIR_NAME, DB_FILE_NAME};
use crate::error::{AppError, AppResult};
use crate::models::AppConfig;

const CONFIG_FILE: &str = "config.json";
pub const DATA_DIR_ENV: &str = "HUB_DATA_DIR";

pub fn get_data_dir() -> AppResult<PathBuf> {
    fn ensure_dir(path: &Path) -> AppResult<()> {
        if !path.exists() {
            fs::create_dir_all(path)
                .map_err(|e| AppError::Config(format!("failed_to_create_data_dir: {}", e)))?;
        }
        Ok(())
    }
    if let Ok(env_path) = std::env::var(DATA_DIR_ENV) {
        if !env_path.trim().is_empty() {
            let data_dir = PathBuf::from(env_path);
            ensure_dir(&data_dir)?;
            return Ok(data_dir);
        }
    }
    if cfg!(test) {
        let data_dir =
            std::env::temp_dir().join(format!(".proxy-hub-test-{}", std::process::id()));
        ensure_dir(&data_dir)?;
        return Ok(data_dir);
    }

    if let Some(home) = dirs::home_dir() {
        let data_dir = home.join(DATA_DIR_NAME);
        if ensure_dir(&data_dir).is_ok() {
            return Ok(data_dir);
        }
    }
    let fallback_dir = std::env::temp_dir().join(DATA_DIR_NAME);
    ensure_dir(&fallback_dir)?;
    Ok(fallback_dir)
}

/// Reads `config.json` from the data dir, writing the defaults on first run.
pub fn load_app_config() -> AppResult<AppConfig> {
    let config_path = get_data_dir()?.join(CONFIG_FILE);

    if !config_path.exists() {
        let config = AppConfig::new();
        if let Err(e) = save_app_config(&config) {
            warn!("Could not write default config: {}", e);
        }
        return Ok(config);
    }

    let content = fs::read_to_string(&config_path)
        .map_err(|e| AppError::Config(format!("failed_to_read_config_file: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("failed_to_parse_config_file: {}", e)))
}

pub fn save_app_config(config: &AppConfig) -> AppResult<()> {
    let config_path = get_data_dir()?.join(CONFIG_FILE);
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, content)?;
    Ok(())
}

/// Where the SQLite file lives: the configured path (relative paths resolve
/// against the data dir) or `hub.db` in the data dir.
pub fn resolve_db_path(config: &AppConfig, data_dir: &Path) -> PathBuf {
    match config.database.path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            if path.is_absolute() {
                path
            } else {
                data_dir.join(path)
            }
        }
        _ => data_dir.join(DB_FILE_NAME),
    }
}

pub(crate) fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

/// Applies environment overrides on top of the file config. Invalid values
/// are logged and skipped.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(port) = env_value::<u16>("HUB_PORT") {
        info!("Using port from environment: {}", port);
        config.server.port = port;
    }
    if let Ok(raw) = std::env::var("HUB_ALLOW_LAN_ACCESS") {
        match parse_env_bool(&raw) {
            Some(allow) => {
                info!("Using LAN access setting from environment: {}", allow);
                config.server.allow_lan_access = allow;
            }
            None => warn!("Ignoring invalid HUB_ALLOW_LAN_ACCESS='{}'", raw),
        }
    }
    if let Some(secs) = env_value::<u64>("LEASE_DURATION_SECS") {
        config.allocation.lease_secs = secs;
    }
    if let Some(cap) = env_value::<i64>("PROXY_USE_CAP") {
        config.allocation.proxy_use_cap = cap;
    }
    if let Some(ms) = env_value::<u64>("TOGGLE_COOLDOWN_MS") {
        info!("Using toggle cooldown from environment: {}ms", ms);
        config.toggle.cooldown_ms = ms;
    }
    if let Some(retries) = env_value::<u32>("TOGGLE_MAX_RETRIES") {
        config.toggle.max_retries = retries;
    }
    if let Ok(url) = std::env::var("TOGGLE_SERVER_URL") {
        if !url.trim().is_empty() {
            info!("Using toggle server from environment: {}", url.trim());
            config.toggle.actuator_url = url.trim().to_string();
        }
    }
    if let Some(secs) = env_value::<u64>("RECLAIM_INTERVAL_SECS") {
        config.reclaim.interval_secs = secs;
    }
    if let Ok(path) = std::env::var("HUB_DB_PATH") {
        if !path.trim().is_empty() {
            config.database.path = Some(path.trim().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{lock_env, ScopedDataDir, ScopedEnvVar};

    #[test]
    fn env_overrides_apply_and_invalid_values_are_ignored() {
        let _lock = lock_env();
        let _port = ScopedEnvVar::set("HUB_PORT", "4100");
        let _lan = ScopedEnvVar::set("HUB_ALLOW_LAN_ACCESS", "yes");
        let _cooldown = ScopedEnvVar::set("TOGGLE_COOLDOWN_MS", "not-a-number");
        let _cap = ScopedEnvVar::set("PROXY_USE_CAP", "12");
        let _url = ScopedEnvVar::set("TOGGLE_SERVER_URL", " http://10.0.0.9:8080 ");
        let _lease = ScopedEnvVar::unset("LEASE_DURATION_SECS");

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.server.port, 4100);
        assert!(config.server.allow_lan_access);
        assert_eq!(config.toggle.cooldown_ms, AppConfig::default().toggle.cooldown_ms);
        assert_eq!(config.allocation.proxy_use_cap, 12);
        assert_eq!(config.toggle.actuator_url, "http://10.0.0.9:8080");
        assert_eq!(config.allocation.lease_secs, 120);
    }

    #[test]
    fn config_file_round_trips_through_data_dir() {
        let _lock = lock_env();
        let data = ScopedDataDir::new();
        let dir = &data.dir;

        let first = load_app_config().unwrap();
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(first.server.port, crate::constants::DEFAULT_PORT);

        let mut changed = first.clone();
        changed.allocation.lease_secs = 300;
        save_app_config(&changed).unwrap();
        assert_eq!(load_app_config().unwrap().allocation.lease_secs, 300);
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let _lock = lock_env();
        let data = ScopedDataDir::new();
        let dir = &data.dir;
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"toggle": {"cooldown_ms": 1000}}"#,
        )
        .unwrap();
        let config = load_app_config().unwrap();
        assert_eq!(config.toggle.cooldown_ms, 1000);
        assert_eq!(config.toggle.max_retries, 3);
        assert_eq!(config.allocation.proxy_use_cap, 20);
    }

    #[test]
    fn db_path_resolves_relative_to_data_dir() {
        let data = Path::new("/srv/hub");
        let mut config = AppConfig::default();
        assert_eq!(resolve_db_path(&config, data), data.join("hub.db"));
        config.database.path = Some("state/custom.db".into());
        assert_eq!(resolve_db_path(&config, data), data.join("state/custom.db"));
        config.database.path = Some("/var/lib/hub.db".into());
        assert_eq!(resolve_db_path(&config, data), PathBuf::from("/var/lib/hub.db"));
    }
}
