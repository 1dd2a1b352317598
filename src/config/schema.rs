//! Configuration schema for alert-receivers
//!
//! This module defines the application configuration: the public base URL
//! used in links, transport and logging settings, and the configured
//! integrations.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::integration::{hash_integrations, IntegrationConfig};
use crate::error::{AppConfigError, TransportError};
use crate::logging::LoggingConfig;
use crate::sender::{HttpWebhookSender, DEFAULT_TIMEOUT_SECS};
use crate::templates::TextTemplate;

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Configuration format version
    pub version: String,

    /// Public base URL of the alerting system
    #[serde(default = "default_external_url")]
    pub external_url: String,

    /// Webhook request timeout
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Configured receiver instances
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
}

fn default_external_url() -> String {
    "http://localhost:3000/".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AppConfig {
    pub fn external_url(&self) -> Result<Url, AppConfigError> {
        Ok(Url::parse(&self.external_url)?)
    }

    /// Default template engine bound to the external URL
    pub fn template(&self) -> Result<TextTemplate, AppConfigError> {
        Ok(TextTemplate::new(self.external_url()?))
    }

    /// HTTP transport honoring the configured timeout
    pub fn sender(&self) -> Result<HttpWebhookSender, TransportError> {
        HttpWebhookSender::with_timeout(self.http_timeout_secs)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            debug: self.debug,
            ..Default::default()
        }
    }

    /// Digest over every configured integration, in order
    pub fn config_hash(&self) -> [u8; 16] {
        hash_integrations(&self.integrations)
    }
}
