use crate::{
    handlers::{authz, grants, health},
    server::AuthzServer,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Permission check routes; GET and HEAD only
pub fn authz_routes() -> Router<AuthzServer> {
    Router::new()
        .route(
            "/authz",
            get(authz::check_by_query).fallback(authz::method_not_allowed),
        )
        .route(
            "/authz/:user",
            get(authz::check_by_user).fallback(authz::method_not_allowed),
        )
        .route(
            "/authz/:user/:rel",
            get(authz::check_by_user_relation).fallback(authz::method_not_allowed),
        )
        .route(
            "/authz/:user/:rel/:ent",
            get(authz::check_full).fallback(authz::method_not_allowed),
        )
}

/// Grant management routes
pub fn grant_routes() -> Router<AuthzServer> {
    Router::new().route(
        "/grants",
        post(grants::create_grant).delete(grants::revoke_grants),
    )
}

pub fn health_routes() -> Router<AuthzServer> {
    Router::new().route("/health", get(health::health_check))
}

/// Create all routes
pub fn create_routes() -> Router<AuthzServer> {
    Router::new()
        .merge(authz_routes())
        .merge(grant_routes())
        .merge(health_routes())
}
