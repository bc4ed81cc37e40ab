use crate::{
    error::ApiError,
    server::AuthzServer,
    types::{create_field, filter_field, CreateGrantRequest, GrantView, RevokeResponse},
};
use auth_grants::{NewGrant, RevokeFilter};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

pub async fn create_grant(
    State(server): State<AuthzServer>,
    Json(request): Json<CreateGrantRequest>,
) -> Result<(StatusCode, Json<GrantView>), ApiError> {
    let mut grant = NewGrant::new(
        create_field(request.subject)?,
        create_field(request.relation)?,
        create_field(request.entity)?,
    );
    if let Some(expires_at) = request.expires_at {
        grant = grant.expires_at(expires_at);
    }

    let created = server.engine.create(grant).await?;
    Ok((StatusCode::CREATED, Json(GrantView::from(created))))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeParams {
    pub subject: Option<String>,
    pub relation: Option<String>,
    pub entity: Option<String>,
}

pub async fn revoke_grants(
    State(server): State<AuthzServer>,
    Query(params): Query<RevokeParams>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let filter = RevokeFilter {
        subject: filter_field(params.subject)?,
        relation: filter_field(params.relation)?,
        entity: filter_field(params.entity)?,
    };

    let deleted = server.engine.revoke(&filter).await?;
    Ok(Json(RevokeResponse { deleted }))
}
