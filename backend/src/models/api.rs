//! Request/response bodies for the public HTTP surface.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Longest message accepted by POST /chat.
pub const MESSAGE_MAX_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    /// ID token obtained from Google Sign-In on the client
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub queries_remaining: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    /// Enforce the 1..=1000 character bound on the message.
    pub fn validate(&self) -> Result<(), String> {
        let len = self.message.chars().count();
        if len == 0 {
            return Err("message must not be empty".to_string());
        }
        if len > MESSAGE_MAX_LEN {
            return Err(format!("message must be at most {MESSAGE_MAX_LEN} characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub message_id: String,
    pub queries_remaining: u32,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub queries_used_today: u32,
    pub queries_remaining: u32,
    pub last_query_date: Option<NaiveDate>,
}
