//! HTTP front end for the wildcard grant checker
//!
//! Exposes permission checks at `/authz`, grant management at `/grants`
//! and a database-backed health probe at `/health`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use config::{Args, ServerConfig};
pub use error::ApiError;
pub use server::AuthzServer;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the main application router with all routes and middleware
pub fn create_app(server: AuthzServer) -> Router {
    routes::create_routes()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(server)
}
