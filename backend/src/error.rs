//! API-level error taxonomy and HTTP mapping.
//!
//! Component modules carry their own error enums; everything converges here
//! before leaving the process. Identity, session and quota failures surface
//! fixed generic messages; store/agent failures are logged with full detail
//! server-side and surfaced as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::agent::AgentError;
use crate::auth::{IdTokenError, SessionError};
use crate::quota::QuotaError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid Google token")]
    InvalidIdToken,

    #[error("Token issuer is not trusted")]
    UntrustedIssuer,

    #[error("Google token has expired")]
    ExpiredIdToken,

    #[error("Invalid session token")]
    InvalidSession,

    #[error("Session token has expired")]
    ExpiredSession,

    #[error("Daily query limit reached")]
    QuotaExceeded,

    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    #[error("{0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidIdToken
            | ApiError::UntrustedIssuer
            | ApiError::ExpiredIdToken
            | ApiError::InvalidSession
            | ApiError::ExpiredSession => StatusCode::UNAUTHORIZED,
            ApiError::QuotaExceeded | ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind, so clients can tell the two 429s apart.
    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidIdToken => "invalid_id_token",
            ApiError::UntrustedIssuer => "untrusted_issuer",
            ApiError::ExpiredIdToken => "expired_id_token",
            ApiError::InvalidSession => "invalid_session",
            ApiError::ExpiredSession => "expired_session",
            ApiError::QuotaExceeded => "quota_exceeded",
            ApiError::RateLimited => "rate_limited",
            ApiError::Validation(_) => "validation_error",
            ApiError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string()
            }
        }));

        (self.status(), body).into_response()
    }
}

impl From<IdTokenError> for ApiError {
    fn from(err: IdTokenError) -> Self {
        match err {
            IdTokenError::Expired => ApiError::ExpiredIdToken,
            IdTokenError::UntrustedIssuer(issuer) => {
                tracing::warn!("ID token from untrusted issuer: {}", issuer);
                ApiError::UntrustedIssuer
            }
            IdTokenError::Invalid(detail) | IdTokenError::KeyNotFound(detail) => {
                tracing::warn!("ID token verification failed: {}", detail);
                ApiError::InvalidIdToken
            }
            IdTokenError::JwksFetch(detail) => {
                tracing::error!("JWKS fetch failed: {}", detail);
                ApiError::Internal
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired => ApiError::ExpiredSession,
            SessionError::MissingHeader | SessionError::InvalidFormat => ApiError::InvalidSession,
            SessionError::Invalid(detail) => {
                tracing::debug!("Session validation failed: {}", detail);
                ApiError::InvalidSession
            }
            SessionError::Signing(detail) => {
                tracing::error!("Session signing failed: {}", detail);
                ApiError::Internal
            }
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Exceeded => ApiError::QuotaExceeded,
            QuotaError::UnknownSubject(subject) => {
                tracing::error!("Quota check for unknown subject: {}", subject);
                ApiError::Internal
            }
            QuotaError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("User store failure: {}", err);
        ApiError::Internal
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        tracing::error!("Agent invocation failed: {}", err);
        ApiError::Internal
    }
}
