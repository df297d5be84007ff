use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{ok, Success};
use crate::error::{AppError, AppResult};
use crate::hub::clock::now_millis;
use crate::models::{NewProxy, ProxyResource};
use crate::modules::persistence::proxy_db;
use crate::server::state::AppState;

#[derive(Serialize)]
pub(crate) struct ProxyBody {
    proxy: ProxyResource,
}

pub(crate) async fn register_proxy(
    State(state): State<AppState>,
    Json(proxy): Json<NewProxy>,
) -> AppResult<Json<Success<ProxyBody>>> {
    if proxy.server_ip.trim().is_empty() || proxy.port == 0 {
        return Err(AppError::InvalidRequest(
            "server_ip and a non-zero port are required".into(),
        ));
    }
    let proxy = state
        .hub
        .store
        .run_blocking(move |store| {
            store.write(|tx| proxy_db::upsert_proxy(tx, &proxy, now_millis()))
        })
        .await?;
    tracing::info!(
        "Registered proxy {} ({}:{})",
        proxy.id,
        proxy.server_ip,
        proxy.port
    );
    ok(ProxyBody { proxy })
}

#[derive(Serialize)]
pub(crate) struct ProxyListBody {
    proxies: Vec<ProxyResource>,
}

pub(crate) async fn list_proxies(
    State(state): State<AppState>,
) -> AppResult<Json<Success<ProxyListBody>>> {
    let proxies = state
        .hub
        .store
        .run_blocking(|store| store.read(proxy_db::list_proxies))
        .await?;
    ok(ProxyListBody { proxies })
}
