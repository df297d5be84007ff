//! HTTP surface of the hub: an axum router over [`crate::hub::HubServices`].

mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::ErrorBody;
pub use routes::build_router;
pub use server::HubServer;
pub use state::AppState;
