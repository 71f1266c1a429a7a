pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod quota;
pub mod ratelimit;
pub mod routes;
pub mod store;
pub mod test_util;

pub use agent::AgentClient;
pub use auth::{GoogleVerifier, SessionSigner, VerifiedIdentity};
pub use config::Config;
pub use error::ApiError;
pub use models::user::User;
pub use quota::QuotaManager;
pub use ratelimit::IpRateLimiter;
pub use store::UserStore;

use std::sync::Arc;

/// Shared application state.
///
/// Every component is an explicit dependency injected at construction, so
/// tests can stand in their own issuer, agent and store.
pub struct AppState {
    pub config: Config,
    pub google: GoogleVerifier,
    pub sessions: SessionSigner,
    pub users: Arc<UserStore>,
    pub quota: QuotaManager,
    pub rate_limiter: IpRateLimiter,
    pub agent: AgentClient,
}
