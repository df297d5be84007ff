use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::models::ClientIdentity;

pub const HEADER_CLIENT_IP: &str = "x-client-ip";
pub const HEADER_INSTANCE: &str = "x-instance-number";
pub const HEADER_USER_FOLDER: &str = "x-user-folder";

const UNKNOWN_CLIENT: &str = "unknown";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// Missing or non-numeric worker coordinates fall back to 1.
fn header_number(headers: &HeaderMap, name: &str) -> i64 {
    header_str(headers, name)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Worker identity from the allocation headers. The declared `x-client-ip`
/// wins over the socket address.
pub fn client_identity(headers: &HeaderMap, remote: Option<SocketAddr>) -> ClientIdentity {
    let client_ip = header_str(headers, HEADER_CLIENT_IP)
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    ClientIdentity::new(
        client_ip,
        header_number(headers, HEADER_INSTANCE),
        header_number(headers, HEADER_USER_FOLDER),
    )
}
