use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;

use super::handlers::{allocation, proxies, toggle, work_slots};
use super::health::health_check_handler;
use super::middleware::cors_layer;
use super::state::AppState;

const PATH_HEALTH: &str = "/health";
const PATH_ALLOCATE_WORK: &str = "/api/allocate-work";
const PATH_SUBMIT_RESULT: &str = "/api/submit-result";
const PATH_ALLOCATION: &str = "/api/allocations/:key";
const PATH_ALLOCATION_EXTEND: &str = "/api/allocations/:key/extend";
const PATH_TOGGLE_QUEUE: &str = "/api/toggle/queue";
const PATH_TIMEOUT_STATS: &str = "/api/timeout/stats";
const PATH_WORK_SLOTS: &str = "/api/work-slots";
const PATH_WORK_SLOT_SETTINGS: &str = "/api/work-slots/:id/settings";
const PATH_WORK_SLOTS_INIT_DAILY: &str = "/api/work-slots/init-daily";
const PATH_PROXIES: &str = "/api/proxies";

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(PATH_HEALTH, get(health_check_handler))
        .route(PATH_ALLOCATE_WORK, get(allocation::allocate_work))
        .route(PATH_SUBMIT_RESULT, post(allocation::submit_result))
        .route(PATH_ALLOCATION, get(allocation::get_allocation))
        .route(PATH_ALLOCATION_EXTEND, post(allocation::extend_allocation))
        .route(
            PATH_TOGGLE_QUEUE,
            get(toggle::queue_status).delete(toggle::clear_queue),
        )
        .route(PATH_TIMEOUT_STATS, get(allocation::timeout_stats))
        .route(
            PATH_WORK_SLOTS,
            get(work_slots::list_work_slots).post(work_slots::create_work_slot),
        )
        .route(PATH_WORK_SLOT_SETTINGS, patch(work_slots::update_settings))
        .route(PATH_WORK_SLOTS_INIT_DAILY, post(work_slots::init_daily))
        .route(
            PATH_PROXIES,
            get(proxies::list_proxies).post(proxies::register_proxy),
        )
        .layer(cors_layer())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
