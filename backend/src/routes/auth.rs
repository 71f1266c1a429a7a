use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::ApiError;
use crate::models::api::{AuthResponse, GoogleAuthRequest, UserProfile};
use crate::quota::QuotaError;
use crate::ratelimit::client_ip;
use crate::AppState;

/// POST /auth/google - exchange a Google ID token for a session token.
///
/// The ID token is verified against Google's JWKS on every call; the quota
/// is reported but not consumed, so an exhausted user can still sign in.
async fn google_auth(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<GoogleAuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if !state.rate_limiter.check(client_ip(&headers, &peer)) {
        return Err(ApiError::RateLimited);
    }

    let identity = state.google.verify(&request.id_token).await?;

    let user = state.users.get_or_create(
        &identity.subject_id,
        identity.email.as_deref(),
        identity.display_name.as_deref(),
    )?;

    let access_token = state
        .sessions
        .issue(&user.subject_id, user.email.as_deref())?;

    let queries_remaining = remaining_or_zero(&state, &user.subject_id)?;

    tracing::info!(user_id = %user.subject_id, "User authenticated");

    Ok(Json(AuthResponse {
        access_token,
        token_type: "bearer",
        user_id: user.subject_id,
        email: user.email,
        name: user.display_name,
        queries_remaining,
    }))
}

/// GET /auth/profile - current user and quota usage. Never consumes quota.
async fn profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let claims = state.sessions.authenticate(&headers)?;

    let user = state
        .users
        .get(&claims.sub)?
        .ok_or(ApiError::InvalidSession)?;

    let queries_remaining = remaining_or_zero(&state, &user.subject_id)?;
    let today = chrono::Utc::now().date_naive();
    let queries_used_today = user.used_on(today);

    Ok(Json(UserProfile {
        user_id: user.subject_id,
        email: user.email,
        name: user.display_name,
        queries_used_today,
        queries_remaining,
        last_query_date: user.last_query_date,
    }))
}

/// Quota peek for reporting endpoints: an exhausted allowance reads as 0
/// remaining instead of failing the request.
fn remaining_or_zero(state: &AppState, subject_id: &str) -> Result<u32, ApiError> {
    match state.quota.check_and_get_remaining(subject_id) {
        Ok(remaining) => Ok(remaining),
        Err(QuotaError::Exceeded) => Ok(0),
        Err(other) => Err(other.into()),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/google", post(google_auth))
        .route("/auth/profile", get(profile))
        .with_state(state)
}
