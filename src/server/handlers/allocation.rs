use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ok, Success};
use crate::error::{AppError, AppResult};
use crate::hub::keys;
use crate::models::{
    AllocationGrant, AllocationSummary, CompletionAck, LeaseStats, SubmitResultRequest,
};
use crate::server::middleware::client_identity;
use crate::server::state::AppState;

pub(crate) async fn allocate_work(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Json<Success<AllocationGrant>>> {
    let client = client_identity(&headers, connect.map(|ConnectInfo(addr)| addr));
    ok(state.hub.allocator.allocate(client).await?)
}

pub(crate) async fn submit_result(
    State(state): State<AppState>,
    Json(request): Json<SubmitResultRequest>,
) -> AppResult<Json<Success<CompletionAck>>> {
    let key = request.allocation_key.trim().to_string();
    if !keys::is_well_formed(&key) {
        return Err(AppError::InvalidAllocationKey(key));
    }
    ok(state.hub.completion.complete(key, request.outcome).await?)
}

#[derive(Serialize)]
pub(crate) struct AllocationBody {
    allocation: AllocationSummary,
}

pub(crate) async fn get_allocation(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<Success<AllocationBody>>> {
    if !keys::is_well_formed(&key) {
        return Err(AppError::InvalidAllocationKey(key));
    }
    let allocation = state.hub.allocator.lookup(key).await?;
    ok(AllocationBody { allocation })
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ExtendRequest {
    seconds: Option<u64>,
}

#[derive(Serialize)]
pub(crate) struct ExtendBody {
    allocation_key: String,
    expires_at: DateTime<Utc>,
}

pub(crate) async fn extend_allocation(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<ExtendRequest>>,
) -> AppResult<Json<Success<ExtendBody>>> {
    let seconds = body
        .and_then(|Json(req)| req.seconds)
        .unwrap_or(state.default_extend_secs);
    let expires_at = state.hub.reclaimer.extend(key.clone(), seconds).await?;
    ok(ExtendBody {
        allocation_key: key,
        expires_at,
    })
}

pub(crate) async fn timeout_stats(
    State(state): State<AppState>,
) -> AppResult<Json<Success<LeaseStats>>> {
    ok(state.hub.reclaimer.lease_stats().await?)
}
