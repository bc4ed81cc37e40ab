use crate::{error::ApiError, server::AuthzServer, types::HealthResponse};
use axum::{extract::State, Json};
use chrono::Utc;
use tracing::warn;

/// Healthy only when the database answers within the operation deadline.
pub async fn health_check(State(server): State<AuthzServer>) -> Result<Json<HealthResponse>, ApiError> {
    if let Err(err) = server.engine.ping().await {
        warn!("Health check failed: {}", err);
        return Err(ApiError::ServiceUnavailable {
            message: err.to_string(),
        });
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
