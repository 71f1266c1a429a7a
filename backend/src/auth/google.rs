use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Identity extracted from a verified Google ID token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdTokenError {
    #[error("Invalid ID token: {0}")]
    Invalid(String),
    #[error("Untrusted issuer: {0}")]
    UntrustedIssuer(String),
    #[error("ID token has expired")]
    Expired,
    #[error("JWKS fetch error: {0}")]
    JwksFetch(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
}

/// JWKS key set response.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

/// Claims carried by a Google ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OidcDiscovery {
    jwks_uri: String,
}

/// Verifies Google-issued ID tokens against Google's published JWKS.
///
/// Verification runs per assertion and is never cached; only the issuer's
/// public keys are, refreshed when a token references an unknown `kid`.
pub struct GoogleVerifier {
    http_client: Client,
    jwks_uri: String,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    trusted_issuers: Vec<String>,
    audience: String,
}

impl GoogleVerifier {
    /// Discover the JWKS endpoint for `issuer` and load its current keys.
    ///
    /// `issuer` is the trusted issuer base URL; Google tokens carry the
    /// issuer both with and without the scheme, so both spellings are
    /// accepted.
    pub async fn new(issuer: &str, audience: &str) -> Result<Self, IdTokenError> {
        let http_client = Client::new();

        let config_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let discovery: OidcDiscovery = http_client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| IdTokenError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdTokenError::JwksFetch(e.to_string()))?;

        let bare_issuer = issuer
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        let verifier = Self {
            http_client,
            jwks_uri: discovery.jwks_uri,
            keys: Arc::new(RwLock::new(HashMap::new())),
            trusted_issuers: vec![
                issuer.trim_end_matches('/').to_string(),
                bare_issuer.to_string(),
            ],
            audience: audience.to_string(),
        };

        verifier.refresh_keys().await?;

        Ok(verifier)
    }

    async fn refresh_keys(&self) -> Result<(), IdTokenError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| IdTokenError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdTokenError::JwksFetch(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty == "RSA" {
                if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                    match DecodingKey::from_rsa_components(n, e) {
                        Ok(key) => {
                            keys.insert(jwk.kid.clone(), key);
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                        }
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    /// Verify a single ID token and extract the identity it asserts.
    pub async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdTokenError> {
        let header =
            decode_header(id_token).map_err(|e| IdTokenError::Invalid(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| IdTokenError::Invalid("missing kid in token header".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&self.trusted_issuers);
        validation.set_audience(&[&self.audience]);

        let token_data =
            decode::<IdTokenClaims>(id_token, &key, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => IdTokenError::Expired,
                ErrorKind::InvalidIssuer => {
                    IdTokenError::UntrustedIssuer(issuer_of(id_token))
                }
                _ => IdTokenError::Invalid(e.to_string()),
            })?;

        Ok(VerifiedIdentity {
            subject_id: token_data.claims.sub,
            email: token_data.claims.email,
            display_name: token_data.claims.name,
        })
    }

    /// Look up the decoding key for `kid`, refreshing the cached set once on
    /// a miss. Google rotates its signing keys.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, IdTokenError> {
        {
            let keys = self.keys.read().await;
            if let Some(key) = keys.get(kid) {
                return Ok(key.clone());
            }
        }

        self.refresh_keys().await?;

        let keys = self.keys.read().await;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| IdTokenError::KeyNotFound(kid.to_string()))
    }
}

/// Best-effort read of the unverified `iss` claim, for the warning log.
fn issuer_of(id_token: &str) -> String {
    #[derive(Deserialize)]
    struct Iss {
        iss: String,
    }

    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Iss>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.iss)
        .unwrap_or_else(|_| "<unreadable>".to_string())
}
