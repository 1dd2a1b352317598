//! Webhook transport
//!
//! Notifiers hand a fully built request to a [`WebhookSender`]. The
//! [`HttpWebhookSender`] performs it with reqwest; retries and backoff, if
//! any, belong to the sender and not to the notifiers.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::TransportError;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A request prepared by a notifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendWebhookSettings {
    pub url: String,
    pub body: String,
    /// HTTP method, `POST` when empty
    pub http_method: String,
    /// Basic auth user, only used together with `password`
    pub user: String,
    pub password: String,
    pub http_header: BTreeMap<String, String>,
    /// Content type, `application/json` when empty
    pub content_type: String,
}

impl SendWebhookSettings {
    pub fn json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

/// Transport that performs a prepared webhook request
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send_webhook(&self, cmd: &SendWebhookSettings) -> Result<(), TransportError>;
}

/// reqwest based webhook transport
pub struct HttpWebhookSender {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookSender {
    /// Create a sender with the default timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Create a sender with a custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send_webhook(&self, cmd: &SendWebhookSettings) -> Result<(), TransportError> {
        let method = if cmd.http_method.is_empty() {
            Method::POST
        } else {
            Method::from_bytes(cmd.http_method.to_uppercase().as_bytes()).map_err(|_| {
                TransportError::InvalidRequest(format!("invalid HTTP method '{}'", cmd.http_method))
            })?
        };
        let content_type = if cmd.content_type.is_empty() {
            "application/json"
        } else {
            cmd.content_type.as_str()
        };

        let mut request = self
            .client
            .request(method, &cmd.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(cmd.body.clone())
            .timeout(self.timeout);

        if !cmd.user.is_empty() && !cmd.password.is_empty() {
            request = request.basic_auth(&cmd.user, Some(&cmd.password));
        }
        for (key, value) in &cmd.http_header {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_builder() {
                TransportError::InvalidRequest(e.to_string())
            } else {
                TransportError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(format!("failed to read response body: {}", e)))?;

        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "webhook delivered");
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
