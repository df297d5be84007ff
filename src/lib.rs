pub mod constants;
pub mod error;
pub mod hub;
pub mod models;
pub mod modules;
pub mod server;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::hub::{HttpActuator, HubServices};
use crate::models::AppConfig;
use crate::modules::persistence::Store;
use crate::modules::system::{config, logger, validation};
use crate::server::{build_router, AppState, HubServer};

fn load_runtime_config() -> Result<AppConfig, String> {
    let mut config =
        config::load_app_config().map_err(|e| format!("failed_to_load_config: {}", e))?;
    config::apply_env_overrides(&mut config);
    validation::validate_app_config(&config).map_err(|errors| {
        format!(
            "configuration_validation_failed:\n{}",
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;
    Ok(config)
}

async fn start_hub(config: &AppConfig) -> AppResult<(HubServices, HubServer)> {
    let data_dir = config::get_data_dir()?;
    let db_path = config::resolve_db_path(config, &data_dir);
    let store = Store::open(&db_path, config.database.busy_timeout())?;
    info!("Store opened at {}", store.path().display());

    let actuator = Arc::new(HttpActuator::new(&config.toggle)?);
    let hub = HubServices::build(config, store, actuator);
    hub.start_background().await;

    if config.server.allow_lan_access {
        warn!("LAN access is enabled (bind address will be 0.0.0.0)");
    } else {
        info!("LAN access is disabled (bind address will be 127.0.0.1)");
    }
    let app = build_router(AppState::new(hub.clone()), config.server.max_body_bytes);
    let (server, _handle) = HubServer::start(
        config.server.bind_host(),
        config.server.port,
        app,
        CancellationToken::new(),
    )
    .await?;
    Ok((hub, server))
}

pub fn run() {
    let data_dir = match config::get_data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to resolve data directory: {}", e);
            std::process::exit(1);
        }
    };
    logger::init_logger(&data_dir);

    let config = match load_runtime_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    logger::prune_logs(&data_dir, config.log.retention_days);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(async {
        let (hub, server) = match start_hub(&config).await {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start hub: {}", e);
                std::process::exit(1);
            }
        };

        info!("Hub is running. Press Ctrl+C to exit.");
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down hub");
        server.stop();
        hub.shutdown(Duration::from_secs(crate::constants::SHUTDOWN_GRACE_SECS))
            .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{lock_env, ScopedDataDir, ScopedEnvVar};

    #[test]
    fn invalid_overrides_abort_with_every_problem_listed() {
        let _lock = lock_env();
        let _data = ScopedDataDir::new();
        let _cap = ScopedEnvVar::set("PROXY_USE_CAP", "0");
        let _url = ScopedEnvVar::set("TOGGLE_SERVER_URL", "device.local:8080");

        let err = load_runtime_config().unwrap_err();
        assert!(err.starts_with("configuration_validation_failed"));
        assert!(err.contains("allocation.proxy_use_cap"));
        assert!(err.contains("toggle.actuator_url"));
    }

    #[tokio::test]
    async fn hub_starts_on_an_ephemeral_port_and_stops() {
        let _lock = lock_env();
        let data = ScopedDataDir::new();
        let mut config = AppConfig::default();
        config.server.port = 0;
        config.reclaim.rescan_enabled = false;

        let (hub, server) = start_hub(&config).await.unwrap();
        assert!(data.dir.path().join(crate::constants::DB_FILE_NAME).exists());
        assert_ne!(server.local_addr().port(), 0);
        assert!(hub.queue.is_running().await);

        server.stop();
        hub.shutdown(Duration::from_secs(1)).await;
        assert!(!hub.queue.is_running().await);
    }
}
