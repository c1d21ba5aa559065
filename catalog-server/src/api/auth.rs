//! Session authentication: login, logout, password change, and the
//! middleware gating every protected route.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use catalog_common::db::models::Session;
use catalog_common::Error;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::{ApiError, ApiResult};
use crate::store::users;
use crate::AppState;

const SESSION_COOKIE: &str = "session_token";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}")
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Response> {
    let user = users::get_user_by_username(&state.db, &payload.username).await?;

    let user = match user {
        Some(u) => u,
        None => {
            warn!(username = %payload.username, "login attempt for unknown user");
            return Err(Error::Unauthorized("Invalid username or password".to_string()).into());
        }
    };

    if users::is_locked(&user) {
        return Err(Error::Locked(
            "Too many failed attempts, try again later".to_string(),
        )
        .into());
    }
    if !user.active {
        return Err(Error::Unauthorized("Account is disabled".to_string()).into());
    }

    if !users::verify_password(&payload.password, &user.password_hash) {
        users::record_login_attempt(&state.db, user.id, false).await?;
        return Err(Error::Unauthorized("Invalid username or password".to_string()).into());
    }

    users::record_login_attempt(&state.db, user.id, true).await?;
    let token = users::create_session(&state.db, user.id).await?;
    info!(username = %user.username, "login succeeded");

    let mut response = Json(json!({
        "username": user.username,
        "role": user.role,
        "must_change_password": user.must_change_password,
    }))
    .into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&session_cookie(&token, 86400))
            .map_err(|e| Error::Internal(format!("cookie header: {e}")))?,
    );
    Ok(response)
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = session_token(&headers) {
        users::delete_session(&state.db, &token).await?;
    }

    let mut response = Json(json!({ "status": "logged_out" })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&session_cookie("", 0))
            .map_err(|e| Error::Internal(format!("cookie header: {e}")))?,
    );
    Ok(response)
}

pub async fn me(Extension(session): Extension<Session>) -> Json<Value> {
    Json(json!({
        "username": session.username,
        "role": session.role,
        "must_change_password": session.must_change_password,
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }

    let user = users::get_user_by_username(&state.db, &session.username)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", session.username)))?;

    if !users::verify_password(&payload.current_password, &user.password_hash) {
        return Err(Error::Unauthorized("Current password is incorrect".to_string()).into());
    }

    users::update_password(&state.db, user.id, &payload.new_password).await?;
    info!(username = %user.username, "password changed");
    Ok(Json(json!({ "status": "password_changed" })))
}

/// Gate for protected routes. Resolves the session cookie, slides the
/// expiry forward, and stashes the session in request extensions. When
/// authentication is disabled a synthetic admin session is injected so
/// handlers that read the session keep working.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.auth_enabled {
        request.extensions_mut().insert(Session {
            token: String::new(),
            user_id: 0,
            username: "anonymous".to_string(),
            role: "admin".to_string(),
            must_change_password: false,
            expires_at: String::new(),
        });
        return next.run(request).await;
    }

    let token = match session_token(request.headers()) {
        Some(t) => t,
        None => {
            return ApiError(Error::Unauthorized("Missing session cookie".to_string()))
                .into_response()
        }
    };

    let session = match users::get_session(&state.db, &token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            return ApiError(Error::Unauthorized(
                "Session expired or invalid".to_string(),
            ))
            .into_response()
        }
        Err(err) => return ApiError(err).into_response(),
    };

    if let Err(err) = users::refresh_session(&state.db, &token).await {
        warn!(error = %err, "failed to refresh session expiry");
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}
