//! HTTP surface tests against the in-memory grant store.

use auth_grants::repository::InMemoryGrantStore;
use auth_grants::{GrantEngine, GrantField, NewGrant};
use authz_server::{create_app, AuthzServer, ServerConfig};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<GrantEngine>) {
    let engine = GrantEngine::new(Arc::new(InMemoryGrantStore::new()));
    let server = AuthzServer::new(engine, ServerConfig::default());
    let engine = server.engine.clone();
    (create_app(server), engine)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn cache_control(response: &Response) -> &str {
    response
        .headers()
        .get(header::CACHE_CONTROL)
        .unwrap()
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_check_without_grant_is_forbidden() {
    let (app, _) = test_app();

    let response = send(&app, Method::GET, "/authz/alice/editor/doc1", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(cache_control(&response), "public, max-age=5");
}

#[tokio::test]
async fn test_check_with_grant_returns_grant() {
    let (app, engine) = test_app();
    engine
        .create(NewGrant::concrete("alice", "editor", "doc1").unwrap())
        .await
        .unwrap();

    let response = send(&app, Method::GET, "/authz/alice/editor/doc1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_control(&response), "public, max-age=1");
    assert!(response.headers().contains_key(header::LAST_MODIFIED));
    assert!(!response.headers().contains_key(header::EXPIRES), "grant never expires");

    let body = body_json(response).await;
    assert_eq!(body["user"], "alice");
    assert_eq!(body["relation"], "editor");
    assert_eq!(body["entity"], "doc1");
    assert_eq!(body["expire_at"], Value::Null);
}

#[tokio::test]
async fn test_expiring_grant_sets_expires_header() {
    let (app, engine) = test_app();
    engine
        .create(
            NewGrant::concrete("alice", "viewer", "doc1")
                .unwrap()
                .expires_at(Utc::now() + Duration::hours(1)),
        )
        .await
        .unwrap();

    let response = send(&app, Method::GET, "/authz/alice/viewer/doc1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let expires = response.headers().get(header::EXPIRES).unwrap().to_str().unwrap();
    assert!(expires.ends_with(" GMT"));
    let body = body_json(response).await;
    assert_ne!(body["expire_at"], Value::Null);
}

#[tokio::test]
async fn test_query_and_path_forms_agree() {
    let (app, engine) = test_app();
    engine
        .create(NewGrant::new(
            GrantField::Wildcard,
            GrantField::concrete("editor").unwrap(),
            GrantField::concrete("doc1").unwrap(),
        ))
        .await
        .unwrap();

    for uri in [
        "/authz?user=bob&rel=editor&ent=doc1",
        "/authz/bob?rel=editor&ent=doc1",
        "/authz/bob/editor?ent=doc1",
        "/authz/bob/editor/doc1",
    ] {
        let response = send(&app, Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        let body = body_json(response).await;
        assert_eq!(body["user"], Value::Null, "{}", uri);
    }
}

#[tokio::test]
async fn test_missing_arguments_are_bad_request() {
    let (app, _) = test_app();

    let response = send(&app, Method::GET, "/authz?user=alice&rel=editor", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(cache_control(&response), "public, max-age=60");

    let response = send(&app, Method::GET, "/authz?user=&rel=editor&ent=doc1", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_methods_not_allowed_on_check() {
    let (app, _) = test_app();

    let response = send(&app, Method::POST, "/authz/alice/editor/doc1", None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(cache_control(&response), "public, max-age=60");
}

#[tokio::test]
async fn test_head_has_headers_but_no_body() {
    let (app, engine) = test_app();
    engine
        .create(NewGrant::concrete("alice", "viewer", "doc1").unwrap())
        .await
        .unwrap();

    let response = send(&app, Method::HEAD, "/authz/alice/viewer/doc1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_control(&response), "public, max-age=1");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_create_grant_and_conflict() {
    let (app, _) = test_app();

    let response = send(
        &app,
        Method::POST,
        "/grants",
        Some(json!({"relation": "editor", "entity": "doc1"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["user"], Value::Null);

    let response = send(
        &app,
        Method::POST,
        "/grants",
        Some(json!({"subject": "carol", "relation": "editor", "entity": "doc1"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["conflicting"]["user"], Value::Null);
    assert_eq!(body["conflicting"]["entity"], "doc1");
}

#[tokio::test]
async fn test_create_rejects_all_wildcard_and_empty_fields() {
    let (app, _) = test_app();

    let response = send(&app, Method::POST, "/grants", Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        Method::POST,
        "/grants",
        Some(json!({"subject": "", "relation": "editor", "entity": "doc1"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_created_grant_with_past_expiry_never_authorizes() {
    let (app, _) = test_app();
    let expired = Utc::now() - Duration::seconds(1);

    let response = send(
        &app,
        Method::POST,
        "/grants",
        Some(json!({"subject": "dave", "relation": "viewer", "entity": "doc2", "expires_at": expired})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, Method::GET, "/authz/dave/viewer/doc2", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_revoke_by_filter() {
    let (app, engine) = test_app();
    for entity in ["doc1", "doc2"] {
        engine
            .create(NewGrant::concrete("erin", "viewer", entity).unwrap())
            .await
            .unwrap();
    }
    engine
        .create(NewGrant::new(
            GrantField::Wildcard,
            GrantField::concrete("viewer").unwrap(),
            GrantField::concrete("doc3").unwrap(),
        ))
        .await
        .unwrap();

    let response = send(&app, Method::DELETE, "/grants", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, Method::DELETE, "/grants?subject=erin&entity=doc1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deleted"], 1);

    let response = send(&app, Method::DELETE, "/grants?subject=*", None).await;
    assert_eq!(body_json(response).await["deleted"], 1);

    let response = send(&app, Method::GET, "/authz/erin/viewer/doc2", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_star_in_create_body_is_wildcard() {
    let (app, _) = test_app();

    let response = send(
        &app,
        Method::POST,
        "/grants",
        Some(json!({"subject": "*", "relation": "editor", "entity": "doc1"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"], Value::Null);

    let response = send(&app, Method::GET, "/authz/bob/editor/doc1", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::DELETE, "/grants?subject=*", None).await;
    assert_eq!(body_json(response).await["deleted"], 1);

    let response = send(&app, Method::GET, "/authz/bob/editor/doc1", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app();

    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}
