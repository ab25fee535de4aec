//! Credential verification against the external auth service.
//!
//! The service takes `{username, password}` and answers
//! `{success, user: {username, id}, error}`. Its status and error text are
//! relayed to the client unchanged on rejection.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default verification endpoint.
pub const DEFAULT_AUTH_URL: &str = "http://localhost:3000/verify";

const AUTH_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a verification the service actually answered.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Accepted {
        username: String,
        user_id: Option<serde_json::Value>,
    },
    /// `status` is what the client should see (never 2xx).
    Rejected { status: u16, error: String },
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The service could not be reached.
    #[error("Authentication service unavailable")]
    Unavailable(String),
}

/// Something that can check a username/password pair.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<AuthOutcome, AuthError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    user: Option<VerifiedUser>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifiedUser {
    username: Option<String>,
    id: Option<serde_json::Value>,
}

/// Auth service reached over HTTP.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: Client,
    url: String,
}

impl HttpAuthBackend {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(AUTH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn verify(&self, username: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        let response = self
            .client
            .post(&self.url)
            .json(&VerifyRequest { username, password })
            .send()
            .await
            .map_err(|e| {
                warn!("Auth service unreachable at {}: {}", self.url, e);
                AuthError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        let body: VerifyResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Unparsable auth response ({}): {}", status, e);
                VerifyResponse {
                    error: Some("Invalid auth response".to_string()),
                    ..Default::default()
                }
            }
        };

        Ok(outcome_from(status.as_u16(), body, username))
    }
}

fn outcome_from(status: u16, body: VerifyResponse, submitted: &str) -> AuthOutcome {
    let ok = (200..300).contains(&status);
    if ok && body.success {
        let (username, user_id) = match body.user {
            Some(user) => (user.username, user.id),
            None => (None, None),
        };
        return AuthOutcome::Accepted {
            username: username.unwrap_or_else(|| submitted.to_string()),
            user_id,
        };
    }

    AuthOutcome::Rejected {
        status: if ok { 401 } else { status },
        error: body
            .error
            .unwrap_or_else(|| "Authentication failed".to_string()),
    }
}
