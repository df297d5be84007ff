pub mod client_ip;
pub mod cors;

pub use client_ip::{client_identity, HEADER_CLIENT_IP, HEADER_INSTANCE, HEADER_USER_FOLDER};
pub use cors::cors_layer;
