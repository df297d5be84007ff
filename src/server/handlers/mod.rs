pub mod allocation;
pub mod proxies;
pub mod toggle;
pub mod work_slots;

use axum::Json;
use serde::Serialize;

use crate::error::AppResult;

/// `{"success": true, ...body}` envelope shared by every successful response.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

pub(crate) fn ok<T: Serialize>(body: T) -> AppResult<Json<Success<T>>> {
    Ok(Json(Success {
        success: true,
        body,
    }))
}
