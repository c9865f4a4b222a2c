//! Remote identity authority
//!
//! The user-token scheme does not hold secrets locally. It forwards the
//! user/token pair to an HTTP endpoint and trusts its answer:
//!
//! ```text
//! GET <base_url><auth_url>?username=<user>&token=<token>
//!
//! 200 OK
//! {"code": 0, "data": {"username": "...", "token": "..."}}
//! ```
//!
//! Transport errors, 5xx and 429 responses are retried with capped exponential
//! backoff. Any other non-200 status, a non-zero `code` or a malformed body is
//! a final answer.

use async_trait::async_trait;
use burrow_proto::{CommonResponse, UserIdentity};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Default verification path, relative to the authority base URL
pub const DEFAULT_AUTH_URL: &str = "/clients/verify";

/// Errors talking to the remote authority
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Rejected by authority (code {code}): {msg}")]
    Rejected { code: i32, msg: String },

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RemoteError>,
    },
}

impl RemoteError {
    /// Whether another attempt could produce a different answer
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status(status) => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }
}

/// Something that can confirm a user/token pair
///
/// Returns the canonical identity when the authority supplied one, `None` when
/// it confirmed the pair without a payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    async fn verify(&self, username: &str, token: &str)
        -> Result<Option<UserIdentity>, RemoteError>;
}

/// Bounded retry schedule for remote verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Settings for [`HttpAuthority`]
#[derive(Debug, Clone)]
pub struct HttpAuthorityConfig {
    /// Scheme and host of the authority, e.g. `https://admin.example.com`
    pub base_url: String,
    /// Verification path, or an absolute URL that overrides `base_url`
    pub auth_url: String,
    /// Accept any certificate presented by the authority
    pub insecure_skip_verify: bool,
    /// Include the token as a query parameter
    pub send_token: bool,
    /// Timeout for a single attempt
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpAuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            insecure_skip_verify: true,
            send_token: true,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpAuthorityConfig {
    /// Full verification URL
    pub fn verify_url(&self) -> String {
        if is_absolute_url(&self.auth_url) {
            return self.auth_url.clone();
        }

        let base = self.base_url.trim_end_matches('/');
        if self.auth_url.starts_with('/') {
            format!("{}{}", base, self.auth_url)
        } else {
            format!("{}/{}", base, self.auth_url)
        }
    }
}

pub(crate) fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Identity authority reached over HTTP
pub struct HttpAuthority {
    client: reqwest::Client,
    verify_url: String,
    send_token: bool,
    retry: RetryPolicy,
}

impl HttpAuthority {
    pub fn new(config: &HttpAuthorityConfig) -> Result<Self, RemoteError> {
        if config.insecure_skip_verify {
            warn!(
                "⚠️  Certificate verification disabled for identity authority {}",
                config.verify_url()
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self {
            client,
            verify_url: config.verify_url(),
            send_token: config.send_token,
            retry: config.retry,
        })
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }

    async fn attempt(
        &self,
        username: &str,
        token: &str,
    ) -> Result<Option<UserIdentity>, RemoteError> {
        let mut request = self
            .client
            .get(&self.verify_url)
            .query(&[("username", username)]);
        if self.send_token {
            request = request.query(&[("token", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body: CommonResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        if !body.is_success() {
            return Err(RemoteError::Rejected {
                code: body.code,
                msg: body.msg,
            });
        }

        body.identity()
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IdentityAuthority for HttpAuthority {
    async fn verify(
        &self,
        username: &str,
        token: &str,
    ) -> Result<Option<UserIdentity>, RemoteError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(username, token).await {
                Ok(identity) => {
                    debug!(
                        "Authority confirmed user '{}' on attempt {}",
                        username, attempt
                    );
                    return Ok(identity);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Failed to verify user '{}' (attempt {} of {}): {}. Retrying in {:?}",
                        username, attempt, max_attempts, e, delay
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Failed to verify user '{}' (attempt {} of {}): {}",
                        username, attempt, max_attempts, e
                    );
                    return Err(RemoteError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
