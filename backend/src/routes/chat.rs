use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::error::ApiError;
use crate::models::api::{ChatRequest, ChatResponse};
use crate::ratelimit::client_ip;
use crate::AppState;

/// POST /chat - run the agent on a user message.
///
/// The quota charge is spent atomically before the agent call and is not
/// refunded if the agent fails or the caller goes away; the discrepancy is
/// logged instead.
async fn chat(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if !state.rate_limiter.check(client_ip(&headers, &peer)) {
        return Err(ApiError::RateLimited);
    }

    let claims = state.sessions.authenticate(&headers)?;

    request.validate().map_err(ApiError::Validation)?;

    let queries_remaining = state.quota.consume(&claims.sub)?;

    tracing::info!(
        user_id = %claims.sub,
        remaining = queries_remaining,
        "Running agent query"
    );

    let response = match state.agent.run(&request.message).await {
        Ok(reply) => reply,
        Err(e) => {
            // The spend already happened; record the mismatch rather than
            // failing accounting.
            tracing::warn!(
                user_id = %claims.sub,
                error = %e,
                "Agent failed after quota charge; charge not refunded"
            );
            return Err(e.into());
        }
    };

    Ok(Json(ChatResponse {
        response,
        timestamp: Utc::now(),
        user_id: claims.sub,
        message_id: format!("msg_{}", uuid::Uuid::new_v4()),
        queries_remaining,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(state)
}
