use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        claims::Claims,
        dto::{LoginRequest, RegisterRequest, TokenResponse, UpdateProfileRequest},
        extractors::AuthUser,
    },
    error::AuthResult,
    state::AppState,
    users::PublicUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/validate", get(validate))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/profile",
        get(get_profile).put(update_profile).delete(delete_profile),
    )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, Json<TokenResponse>)> {
    let Json(payload) = payload?;
    let access_token = state.credentials.register(payload).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { access_token })))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<TokenResponse>> {
    let Json(payload) = payload?;
    let access_token = state.credentials.login(payload).await?;
    Ok(Json(TokenResponse { access_token }))
}

pub async fn validate(AuthUser(claims): AuthUser) -> Json<Claims> {
    Json(claims)
}

#[instrument(skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AuthResult<Json<PublicUser>> {
    let user = state.credentials.profile(claims.user_id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, claims, payload), fields(user_id = %claims.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AuthResult<Json<PublicUser>> {
    let Json(payload) = payload?;
    let user = state
        .credentials
        .update_profile(claims.user_id, payload, claims.user_id)
        .await?;
    Ok(Json(user))
}

#[instrument(skip(state, claims), fields(user_id = %claims.user_id))]
pub async fn delete_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AuthResult<Json<PublicUser>> {
    let user = state
        .credentials
        .delete_account(claims.user_id, claims.user_id)
        .await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, users::repo::memory::MemoryUserStore};

    use super::*;

    fn app() -> Router {
        build_app(AppState::with_store(Arc::new(MemoryUserStore::default())))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn register_login_profile_flow() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "alice", "name": "Alice", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["access_token"].is_string());
        assert!(body.get("password_hash").is_none());

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "alice", "name": "Other", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "alice", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap().to_string();

        let (status, claims) = send(&app, "GET", "/api/v1/auth/validate", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claims["username"], "alice");
        assert_eq!(claims["role"], "user");

        let (status, profile) = send(&app, "GET", "/api/v1/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Alice");
        assert!(profile.get("password_hash").is_none());

        let (status, profile) = send(
            &app,
            "PUT",
            "/api/v1/profile",
            Some(&token),
            Some(json!({"name": "Alice B"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["name"], "Alice B");
        assert_eq!(profile["updated_by"], claims["user_id"]);

        let (status, profile) = send(&app, "DELETE", "/api/v1/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(profile["deleted_at"].is_string());

        let (status, _) = send(&app, "GET", "/api/v1/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_failures_look_identical() {
        let app = app();
        send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "alice", "name": "Alice", "password": "password123"})),
        )
        .await;

        let (s1, wrong) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "alice", "password": "wrong"})),
        )
        .await;
        let (s2, unknown) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "bob", "password": "x"})),
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn bearer_token_is_required() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/v1/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(body["message"], "missing bearer token");

        let (status, body) = send(&app, "GET", "/api/v1/auth/validate", Some("junk"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token_invalid");
    }

    #[tokio::test]
    async fn register_validation_is_bad_request() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "", "name": "Alice", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({"username": "alice", "name": "Alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({"username": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");

        // no content type at all
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/login")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
