use crate::{
    error::{ApiError, CACHE_POSITIVE},
    server::AuthzServer,
    types::{http_date, GrantView},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::debug;

/// Query-string form of a check. Path segments take precedence.
#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    pub user: Option<String>,
    pub rel: Option<String>,
    pub ent: Option<String>,
}

pub async fn check_by_query(
    State(server): State<AuthzServer>,
    method: Method,
    Query(params): Query<CheckParams>,
) -> Result<Response, ApiError> {
    check_permission(&server, &method, params).await
}

pub async fn check_by_user(
    State(server): State<AuthzServer>,
    method: Method,
    Path(user): Path<String>,
    Query(params): Query<CheckParams>,
) -> Result<Response, ApiError> {
    let params = CheckParams {
        user: Some(user),
        ..params
    };
    check_permission(&server, &method, params).await
}

pub async fn check_by_user_relation(
    State(server): State<AuthzServer>,
    method: Method,
    Path((user, rel)): Path<(String, String)>,
    Query(params): Query<CheckParams>,
) -> Result<Response, ApiError> {
    let params = CheckParams {
        user: Some(user),
        rel: Some(rel),
        ..params
    };
    check_permission(&server, &method, params).await
}

pub async fn check_full(
    State(server): State<AuthzServer>,
    method: Method,
    Path((user, rel, ent)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let params = CheckParams {
        user: Some(user),
        rel: Some(rel),
        ent: Some(ent),
    };
    check_permission(&server, &method, params).await
}

/// Any method other than GET or HEAD on a check route.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn check_permission(
    server: &AuthzServer,
    method: &Method,
    params: CheckParams,
) -> Result<Response, ApiError> {
    let (Some(user), Some(rel), Some(ent)) = (params.user, params.rel, params.ent) else {
        return Err(ApiError::bad_request("user, rel and ent are required"));
    };

    let grant = server
        .engine
        .check(&user, &rel, &ent)
        .await?
        .ok_or(ApiError::Forbidden)?;
    debug!("{} {} {} authorized by {}", user, rel, ent, grant);

    let created_at = grant.created_at;
    let expires_at = grant.expires_at;
    let mut response = if *method == Method::HEAD {
        ().into_response()
    } else {
        Json(GrantView::from(grant)).into_response()
    };

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_POSITIVE));
    if let Ok(value) = HeaderValue::from_str(&http_date(created_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Some(value) = expires_at.and_then(|at| HeaderValue::from_str(&http_date(at)).ok()) {
        headers.insert(header::EXPIRES, value);
    }
    Ok(response)
}
