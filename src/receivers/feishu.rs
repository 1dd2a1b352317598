//! Feishu (Lark) bot webhook receiver
//!
//! Sends the rendered title and message as a single text message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::error::{ConfigError, Result};
use crate::receivers::r#trait::{Base, Metadata, Notifier};
use crate::receivers::{parse_settings, send_webhook, FactoryConfig};
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::{tmpl_text, TemplateEngine};

pub const FEISHU: &str = "feishu";

pub const FULL_VALID_CONFIG_FOR_TESTING: &str = r#"{
    "url": "http://localhost",
    "title": "{{ default.title }}",
    "message": "{{ default.message }}"
}"#;

/// Feishu settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_title() -> String {
    "{{ default.title }}".to_string()
}

fn default_message() -> String {
    "{{ default.message }}".to_string()
}

impl Config {
    pub fn new(settings: &serde_json::Value) -> std::result::Result<Self, ConfigError> {
        let config: Config = parse_settings(FEISHU, settings)?;
        if config.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                receiver: FEISHU,
                field: "url",
            });
        }
        Ok(config)
    }
}

/// Feishu message format
#[derive(Debug, Serialize)]
struct FeishuMessage {
    msg_type: &'static str,
    content: FeishuContent,
}

/// Feishu text message content
#[derive(Debug, Serialize)]
struct FeishuContent {
    text: String,
}

/// Sends alert notifications to a Feishu bot
pub struct FeishuNotifier {
    base: Base,
    sender: Arc<dyn WebhookSender>,
    tmpl: Arc<dyn TemplateEngine>,
    settings: Config,
}

impl FeishuNotifier {
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
}

pub fn build(fc: &FactoryConfig<'_>) -> std::result::Result<Box<dyn Notifier>, ConfigError> {
    let settings = Config::new(&fc.config.settings)?;
    Ok(Box::new(FeishuNotifier::new(
        settings,
        fc.metadata(),
        Arc::clone(&fc.template),
        Arc::clone(&fc.sender),
    )))
}

/// Build the JSON body of a Feishu text message
pub fn build_body(title: &str, message: &str) -> serde_json::Result<String> {
    let text = if title.is_empty() {
        message.to_string()
    } else {
        format!("{}\n{}", title, message)
    };
    serde_json::to_string(&FeishuMessage {
        msg_type: "text",
        content: FeishuContent { text },
    })
}

#[async_trait]
impl Notifier for FeishuNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<bool> {
        tracing::info!(receiver = FEISHU, uid = self.base.uid(), "sending feishu");

        let (body, url) = {
            let mut tmpl = tmpl_text(self.tmpl.as_ref(), self.base.name(), alerts);
            let title = tmpl.render(&self.settings.title);
            let message = tmpl.render(&self.settings.message);
            let body = build_body(&title, &message)?;

            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = FEISHU, error = %e, "failed to template Feishu message");
            }

            let mut url = tmpl.render(&self.settings.url);
            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = FEISHU, error = %e, fallback = %self.settings.url, "failed to template Feishu URL");
                url = self.settings.url.clone();
            }
            (body, url)
        };

        let cmd = SendWebhookSettings::json(url, body);
        send_webhook(self.sender.as_ref(), cancel, FEISHU, &cmd).await?;

        Ok(true)
    }

    fn send_resolved(&self) -> bool {
        self.base.send_resolved()
    }
}
