use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{ok, Success};
use crate::error::AppResult;
use crate::hub::toggle::QueueSnapshot;
use crate::server::state::AppState;

pub(crate) async fn queue_status(
    State(state): State<AppState>,
) -> AppResult<Json<Success<QueueSnapshot>>> {
    ok(state.hub.queue.status())
}

#[derive(Serialize)]
pub(crate) struct ClearedBody {
    cleared: usize,
}

pub(crate) async fn clear_queue(
    State(state): State<AppState>,
) -> AppResult<Json<Success<ClearedBody>>> {
    let cleared = state.hub.queue.clear();
    tracing::info!("Toggle queue cleared by request ({} item(s))", cleared);
    ok(ClearedBody { cleared })
}
