use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Session lifetime, independent of the Google token's own expiry.
const SESSION_TTL_HOURS: i64 = 24;

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject identifier of the authenticated user
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Invalid Authorization header format")]
    InvalidFormat,
    #[error("Invalid session token: {0}")]
    Invalid(String),
    #[error("Session token has expired")]
    Expired,
    #[error("Failed to sign session token: {0}")]
    Signing(String),
}

/// Issues and validates the service's own session tokens.
///
/// Tokens are HS256 JWTs signed with a process-wide secret. Validity is
/// fully determined by signature and expiry; nothing is persisted and there
/// is no revocation. Expiry is checked with zero leeway so the boundary is
/// exact.
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a session token for an authenticated subject, expiring
    /// [`SESSION_TTL_HOURS`] from now.
    pub fn issue(&self, subject_id: &str, email: Option<&str>) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: subject_id.to_string(),
            email: email.map(String::from),
            iat: now.timestamp(),
            exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Validate a raw session token and return its claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Authenticate a request by validating its Bearer token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<SessionClaims, SessionError> {
        let auth_header = headers
            .get("authorization")
            .ok_or(SessionError::MissingHeader)?
            .to_str()
            .map_err(|_| SessionError::InvalidFormat)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(SessionError::InvalidFormat)?;

        self.validate(token)
    }
}
