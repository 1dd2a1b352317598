//! WeCom (WeChat Work) group robot receiver
//!
//! The robot webhook URL embeds its access key, so it is read from the
//! secure settings first and only then from the plain settings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::error::{ConfigError, Result};
use crate::receivers::r#trait::{Base, Metadata, Notifier};
use crate::receivers::{parse_settings, send_webhook, FactoryConfig};
use crate::secrets::SecureValues;
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::{tmpl_text, TemplateEngine};

pub const WECOM: &str = "wecom";

pub const FULL_VALID_CONFIG_FOR_TESTING: &str = r#"{
    "msgtype": "text",
    "title": "{{ default.title }}",
    "message": "{{ default.message }}",
    "touser": "zhangsan,lisi"
}"#;

pub const FULL_VALID_SECRETS_FOR_TESTING: &str = r#"{
    "url": "http://localhost"
}"#;

/// WeCom robot message type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Text,
    #[default]
    Markdown,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    url: String,
    #[serde(default)]
    msgtype: MsgType,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    touser: String,
}

/// Resolved WeCom settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub msg_type: MsgType,
    pub title: String,
    pub message: String,
    pub to_user: String,
}

impl Config {
    pub fn new(settings: &serde_json::Value, secrets: &SecureValues<'_>) -> std::result::Result<Self, ConfigError> {
        let raw: RawSettings = parse_settings(WECOM, settings)?;
        let url = secrets.get("url", &raw.url);
        if url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                receiver: WECOM,
                field: "url",
            });
        }

        Ok(Self {
            url,
            msg_type: raw.msgtype,
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
            to_user: raw.touser,
        })
    }
}

/// WeCom text message content
#[derive(Debug, Serialize)]
struct WeComText {
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    mentioned_list: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WeComMarkdown {
    content: String,
}

/// WeCom message format
#[derive(Debug, Serialize)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
enum WeComMessage {
    Text { text: WeComText },
    Markdown { markdown: WeComMarkdown },
}

/// Build the JSON body for the configured message type
pub fn build_body(msg_type: MsgType, title: &str, message: &str, to_user: &str) -> serde_json::Result<String> {
    let body = match msg_type {
        MsgType::Text => WeComMessage::Text {
            text: WeComText {
                content: format!("{}\n{}", title, message),
                mentioned_list: to_user
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
        },
        MsgType::Markdown => WeComMessage::Markdown {
            markdown: WeComMarkdown {
                content: format!("# {}\n{}", title, message),
            },
        },
    };
    serde_json::to_string(&body)
}

/// Sends alert notifications to a WeCom group robot
pub struct WeComNotifier {
    base: Base,
    sender: Arc<dyn WebhookSender>,
    tmpl: Arc<dyn TemplateEngine>,
    settings: Config,
}

impl WeComNotifier {
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
    let settings = Config::new(&fc.config.settings, &fc.secure_values())?;
    Ok(Box::new(WeComNotifier::new(
        settings,
        fc.metadata(),
        Arc::clone(&fc.template),
        Arc::clone(&fc.sender),
    )))
}

#[async_trait]
impl Notifier for WeComNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<bool> {
        tracing::info!(receiver = WECOM, uid = self.base.uid(), "sending wecom");

        let body = {
            let mut tmpl = tmpl_text(self.tmpl.as_ref(), self.base.name(), alerts);
            let title = tmpl.render(&self.settings.title);
            let message = tmpl.render(&self.settings.message);
            let to_user = tmpl.render(&self.settings.to_user);
            let body = build_body(self.settings.msg_type, &title, &message, &to_user)?;

            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = WECOM, error = %e, "failed to template WeCom message");
            }
            body
        };

        let cmd = SendWebhookSettings::json(self.settings.url.clone(), body);
        send_webhook(self.sender.as_ref(), cancel, WECOM, &cmd).await?;

        Ok(true)
    }

    fn send_resolved(&self) -> bool {
        self.base.send_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{encode_for_storage, PlaintextDecrypter, SecureSettings};
    use serde_json::{json, Value};

    fn values(secure: &SecureSettings) -> SecureValues<'_> {
        SecureValues::new(Arc::new(PlaintextDecrypter), secure)
    }

    #[test]
    fn test_url_prefers_secure_settings() {
        let mut secure = SecureSettings::new();
        secure.insert("url".to_string(), encode_for_storage("https://qyapi.weixin.qq.com/secret"));
        let cfg = Config::new(&json!({"url": "https://plain"}), &values(&secure)).unwrap();
        assert_eq!(cfg.url, "https://qyapi.weixin.qq.com/secret");
        assert_eq!(cfg.msg_type, MsgType::Markdown);

        let empty = SecureSettings::new();
        let cfg = Config::new(&json!({"url": "https://plain"}), &values(&empty)).unwrap();
        assert_eq!(cfg.url, "https://plain");

        assert!(matches!(
            Config::new(&json!({}), &values(&empty)),
            Err(ConfigError::MissingField { field: "url", .. })
        ));
        assert!(matches!(
            Config::new(&json!({"url": "x", "msgtype": "card"}), &values(&empty)),
            Err(ConfigError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn test_text_body_mentions_users() {
        let body: Value =
            serde_json::from_str(&build_body(MsgType::Text, "T", "M", "zhangsan, lisi").unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "msgtype": "text",
                "text": {"content": "T\nM", "mentioned_list": ["zhangsan", "lisi"]}
            })
        );
    }

    #[test]
    fn test_markdown_body() {
        let body: Value =
            serde_json::from_str(&build_body(MsgType::Markdown, "T", "M", "").unwrap()).unwrap();
        assert_eq!(body, json!({"msgtype": "markdown", "markdown": {"content": "# T\nM"}}));
    }
}
