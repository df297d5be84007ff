use axum::http::{header, HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

use super::client_ip::{HEADER_CLIENT_IP, HEADER_INSTANCE, HEADER_USER_FOLDER};

/// Workers call from arbitrary hosts, so any origin is accepted.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(HEADER_CLIENT_IP),
            HeaderName::from_static(HEADER_INSTANCE),
            HeaderName::from_static(HEADER_USER_FOLDER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}
