use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};

use super::state::AppState;

pub async fn health_check_handler(State(state): State<AppState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "toggle_queue_size": state.hub.queue.len(),
    }))
    .into_response()
}
