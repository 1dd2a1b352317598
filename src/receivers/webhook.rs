//! Generic HTTP webhook receiver
//!
//! Posts the whole alert group as JSON to an arbitrary endpoint, with
//! optional basic auth or an `Authorization` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::alert::{Alert, LabelSet};
use crate::error::{ConfigError, Result};
use crate::receivers::r#trait::{Base, Metadata, Notifier};
use crate::receivers::{parse_settings, send_webhook, FactoryConfig};
use crate::secrets::SecureValues;
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::{tmpl_text, TemplateData, TemplateEngine};

pub const WEBHOOK: &str = "webhook";

pub const FULL_VALID_CONFIG_FOR_TESTING: &str = r#"{
    "url": "http://localhost/test",
    "httpMethod": "PUT",
    "username": "test-user",
    "maxAlerts": 2,
    "title": "{{ default.title }}",
    "message": "{{ default.message }}"
}"#;

pub const FULL_VALID_SECRETS_FOR_TESTING: &str = r#"{
    "password": "test-password"
}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    url: String,
    #[serde(default)]
    http_method: String,
    #[serde(default)]
    username: String,
    #[serde(default, rename = "authorization_scheme")]
    authorization_scheme: String,
    #[serde(default)]
    max_alerts: usize,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
}

/// Credentials attached to each request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Basic { user: String, password: String },
    Header { scheme: String, credentials: String },
}

/// Resolved webhook settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub http_method: String,
    pub auth: Auth,
    /// Maximum alerts included in the body, 0 for no limit
    pub max_alerts: usize,
    pub title: String,
    pub message: String,
}

impl Config {
    pub fn new(settings: &serde_json::Value, secrets: &SecureValues<'_>) -> std::result::Result<Self, ConfigError> {
        let raw: RawSettings = parse_settings(WEBHOOK, settings)?;
        if raw.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                receiver: WEBHOOK,
                field: "url",
            });
        }

        let http_method = match raw.http_method.to_uppercase().as_str() {
            "" | "POST" => "POST".to_string(),
            "PUT" => "PUT".to_string(),
            _ => {
                return Err(ConfigError::InvalidValue {
                    receiver: WEBHOOK,
                    field: "httpMethod",
                    value: raw.http_method,
                })
            }
        };

        let password = secrets.get("password", "");
        let credentials = secrets.get("authorization_credentials", "");
        let auth = match (raw.username.is_empty() && password.is_empty(), credentials.is_empty()) {
            (true, true) => Auth::None,
            (false, true) => Auth::Basic {
                user: raw.username,
                password,
            },
            (true, false) => Auth::Header {
                scheme: if raw.authorization_scheme.is_empty() {
                    "Bearer".to_string()
                } else {
                    raw.authorization_scheme
                },
                credentials,
            },
            (false, false) => {
                return Err(ConfigError::InvalidValue {
                    receiver: WEBHOOK,
                    field: "authorization_credentials",
                    value: "both HTTP basic auth and authorization header are set".to_string(),
                })
            }
        };

        Ok(Self {
            url: raw.url,
            http_method,
            auth,
            max_alerts: raw.max_alerts,
            title: if raw.title.is_empty() {
                "{{ default.title }}".to_string()
            } else {
                raw.title
            },
            message: if raw.message.is_empty() {
                "{{ default.message }}".to_string()
            } else {
                raw.message
            },
        })
    }
}

/// One alert as sent to the endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAlert<'a> {
    pub status: &'static str,
    pub labels: &'a LabelSet,
    pub annotations: &'a LabelSet,
    pub starts_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<&'a str>,
    pub fingerprint: String,
}

/// Body posted to the endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMessage<'a> {
    pub receiver: &'a str,
    pub status: &'static str,
    pub alerts: Vec<ExtendedAlert<'a>>,
    pub common_labels: &'a LabelSet,
    pub common_annotations: &'a LabelSet,
    #[serde(rename = "externalURL")]
    pub external_url: &'a str,
    pub version: &'static str,
    pub truncated_alerts: usize,
    pub title: String,
    pub message: String,
}

/// Build the JSON body, keeping at most `max_alerts` alerts when non-zero
pub fn build_body(data: &TemplateData, max_alerts: usize, title: String, message: String) -> serde_json::Result<String> {
    let limit = if max_alerts == 0 {
        data.alerts.len()
    } else {
        max_alerts.min(data.alerts.len())
    };

    let alerts = data.alerts[..limit]
        .iter()
        .map(|alert| ExtendedAlert {
            status: alert.status_at(data.now).as_str(),
            labels: &alert.labels,
            annotations: &alert.annotations,
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url.as_deref(),
            fingerprint: alert.fingerprint(),
        })
        .collect();

    serde_json::to_string(&WebhookMessage {
        receiver: &data.receiver,
        status: data.status.as_str(),
        alerts,
        common_labels: &data.common_labels,
        common_annotations: &data.common_annotations,
        external_url: &data.external_url,
        version: "1",
        truncated_alerts: data.alerts.len() - limit,
        title,
        message,
    })
}

/// Sends alert notifications to a generic HTTP endpoint
pub struct WebhookNotifier {
    base: Base,
    sender: Arc<dyn WebhookSender>,
    tmpl: Arc<dyn TemplateEngine>,
    settings: Config,
}

impl WebhookNotifier {
    pub fn new(
        settings: Config,
        meta: Metadata,
        tmpl: Arc<dyn TemplateEngine>,
        sender: Arc<dyn WebhookSender>,
    ) -> Self {
        Self {
            base: Base::new(meta),
            sender,
            tmpl,
            settings,
        }
    }

    fn request(&self, url: String, body: String) -> SendWebhookSettings {
        let mut cmd = SendWebhookSettings::json(url, body);
        cmd.http_method = self.settings.http_method.clone();
        match &self.settings.auth {
            Auth::None => {}
            Auth::Basic { user, password } => {
                cmd.user = user.clone();
                cmd.password = password.clone();
            }
            Auth::Header {
                scheme,
                credentials,
            } => {
                cmd.http_header.insert(
                    "Authorization".to_string(),
                    format!("{} {}", scheme, credentials),
                );
            }
        }
        cmd
    }
}

pub fn build(fc: &FactoryConfig<'_>) -> std::result::Result<Box<dyn Notifier>, ConfigError> {
    let settings = Config::new(&fc.config.settings, &fc.secure_values())?;
    Ok(Box::new(WebhookNotifier::new(
        settings,
        fc.metadata(),
        Arc::clone(&fc.template),
        Arc::clone(&fc.sender),
    )))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<bool> {
        tracing::info!(receiver = WEBHOOK, uid = self.base.uid(), alerts = alerts.len(), "sending webhook");

        let (body, url) = {
            let mut tmpl = tmpl_text(self.tmpl.as_ref(), self.base.name(), alerts);
            let title = tmpl.render(&self.settings.title);
            let message = tmpl.render(&self.settings.message);
            let body = build_body(tmpl.data(), self.settings.max_alerts, title, message)?;

            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = WEBHOOK, error = %e, "failed to template webhook message");
            }

            let mut url = tmpl.render(&self.settings.url);
            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = WEBHOOK, error = %e, fallback = %self.settings.url, "failed to template webhook URL");
                url = self.settings.url.clone();
            }
            (body, url)
        };

        let cmd = self.request(url, body);
        send_webhook(self.sender.as_ref(), cancel, WEBHOOK, &cmd).await?;

        Ok(true)
    }

    fn send_resolved(&self) -> bool {
        self.base.send_resolved()
    }
}
