use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for the downstream agent service.
///
/// The agent is an external collaborator; every invocation is bounded by a
/// request timeout so a stuck agent cannot pin a gateway task.
pub struct AgentClient {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct AgentRunRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct AgentRunResponse {
    response: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transport failure or connection refused; retryable.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    /// The agent did not answer within the configured timeout; retryable.
    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The agent answered with a non-success status; not retryable.
    #[error("Agent error: {0}")]
    Agent(String),
}

impl AgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Run the agent on a user message and return its reply text.
    pub async fn run(&self, message: &str) -> Result<String, AgentError> {
        let url = format!("{}/run", self.base_url);

        tracing::debug!("Invoking agent at {}", url);

        let response = self
            .http_client
            .post(&url)
            .timeout(self.timeout)
            .json(&AgentRunRequest { message })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(self.timeout)
                } else {
                    AgentError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Agent(format!("{status}: {body}")));
        }

        let reply: AgentRunResponse = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;

        Ok(reply.response)
    }
}
