//! DingDing (DingTalk) group robot receiver
//!
//! Renders the configured title, message, message type and recipients,
//! builds one of the four robot message shapes and posts it to the robot
//! webhook. A robot secret, when configured, signs the delivery URL.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::alert::Alert;
use crate::error::{ConfigError, Result};
use crate::receivers::r#trait::{Base, Metadata, Notifier};
use crate::receivers::{join_url_path, parse_settings, send_webhook, FactoryConfig};
use crate::secrets::SecureValues;
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::{tmpl_text, TemplateEngine};

pub const DINGDING: &str = "dingding";

/// Recipient token that mentions the whole group
pub const AT_ALL: &str = "all";

pub const DEFAULT_TITLE: &str = "{{ default.title }}";
pub const DEFAULT_MESSAGE: &str = "{{ default.message }}";

pub const FULL_VALID_CONFIG_FOR_TESTING: &str = r#"{
    "url": "http://localhost",
    "msgType": "actionCard",
    "title": "{{ default.title }}",
    "message": "{{ default.message }}",
    "toUser": "111,222"
}"#;

pub const FULL_VALID_SECRETS_FOR_TESTING: &str = r#"{
    "secret": "SEC-test-secret"
}"#;

type HmacSha256 = Hmac<Sha256>;

/// Robot message type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    ActionCard,
    Link,
    Text,
    Markdown,
    /// Anything else. Builds an empty (`null`) body instead of failing.
    Unknown(String),
}

impl MessageType {
    pub fn parse(value: &str) -> Self {
        match value {
            "actionCard" => Self::ActionCard,
            "link" => Self::Link,
            "text" => Self::Text,
            "markdown" => Self::Markdown,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ActionCard => "actionCard",
            Self::Link => "link",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    #[serde(default)]
    url: String,
    #[serde(default)]
    msg_type: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    to_user: String,
}

/// Resolved DingDing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub msg_type: String,
    pub title: String,
    pub message: String,
    pub to_user: String,
    /// Robot signing secret, empty when the robot is unsigned
    pub secret: String,
}

impl Config {
    pub fn new(settings: &serde_json::Value, secrets: &SecureValues<'_>) -> std::result::Result<Self, ConfigError> {
        let raw: RawSettings = parse_settings(DINGDING, settings)?;

        if raw.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                receiver: DINGDING,
                field: "url",
            });
        }

        let msg_type = if raw.msg_type.is_empty() {
            MessageType::Link.as_str().to_string()
        } else {
            raw.msg_type
        };
        // Templated types can only be checked per batch.
        if !msg_type.contains("{{") {
            if let MessageType::Unknown(value) = MessageType::parse(&msg_type) {
                return Err(ConfigError::InvalidValue {
                    receiver: DINGDING,
                    field: "msgType",
                    value,
                });
            }
        }

        Ok(Self {
            url: raw.url,
            msg_type,
            title: non_empty_or(raw.title, DEFAULT_TITLE),
            message: non_empty_or(raw.message, DEFAULT_MESSAGE),
            to_user: raw.to_user,
            secret: secrets.get("secret", ""),
        })
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Sends alert notifications to a DingDing group robot
pub struct DingDingNotifier {
    base: Base,
    sender: Arc<dyn WebhookSender>,
    tmpl: Arc<dyn TemplateEngine>,
    settings: Config,
}

impl DingDingNotifier {
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

    /// Append `timestamp` and `sign` when a robot secret is configured
    fn sign_url(&self, url: &str, timestamp: i64) -> String {
        if self.settings.secret.is_empty() {
            return url.to_string();
        }
        let sign = generate_signature(&self.settings.secret, timestamp);
        let sign: String = form_urlencoded::byte_serialize(sign.as_bytes()).collect();
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}timestamp={}&sign={}", url, separator, timestamp, sign)
    }
}

/// Registry constructor
pub fn build(fc: &FactoryConfig<'_>) -> std::result::Result<Box<dyn Notifier>, ConfigError> {
    let settings = Config::new(&fc.config.settings, &fc.secure_values())?;
    Ok(Box::new(DingDingNotifier::new(
        settings,
        fc.metadata(),
        Arc::clone(&fc.template),
        Arc::clone(&fc.sender),
    )))
}

#[async_trait]
impl Notifier for DingDingNotifier {
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<bool> {
        tracing::info!(receiver = DINGDING, uid = self.base.uid(), "sending dingding");

        let link = build_dingding_url(self.tmpl.as_ref());

        let (body, url) = {
            let mut tmpl = tmpl_text(self.tmpl.as_ref(), self.base.name(), alerts);

            let message = tmpl.render(&self.settings.message);
            let title = tmpl.render(&self.settings.title);
            let msg_type = MessageType::parse(&tmpl.render(&self.settings.msg_type));
            let to_user = tmpl.render(&self.settings.to_user);

            let body = build_body(&link, &msg_type, &title, &message, &to_user)?;

            if let Some(e) = tmpl.take_error() {
                tracing::warn!(receiver = DINGDING, uid = self.base.uid(), error = %e, "failed to template DingDing message");
            }

            let mut url = tmpl.render(&self.settings.url);
            if let Some(e) = tmpl.take_error() {
                tracing::warn!(
                    receiver = DINGDING,
                    uid = self.base.uid(),
                    error = %e,
                    fallback = %self.settings.url,
                    "failed to template DingDing URL"
                );
                url = self.settings.url.clone();
            }

            (body, url)
        };

        let url = self.sign_url(&url, chrono::Utc::now().timestamp_millis());
        let cmd = SendWebhookSettings::json(url, body);
        send_webhook(self.sender.as_ref(), cancel, DINGDING, &cmd).await?;

        Ok(true)
    }

    fn send_resolved(&self) -> bool {
        self.base.send_resolved()
    }
}

/// Link that opens the alert list outside the DingDing client
pub fn build_dingding_url(tmpl: &dyn TemplateEngine) -> String {
    let list_url = join_url_path(tmpl.external_url().as_str(), "/alerting/list");
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("pc_slide", "false")
        .append_pair("url", &list_url)
        .finish();
    format!("dingtalk://dingtalkclient/page/link?{}", query)
}

/// Generate the robot signature: base64(hmac_sha256(secret, timestamp + "\n" + secret))
pub fn generate_signature(secret: &str, timestamp: i64) -> String {
    let string_to_sign = format!("{}\n{}", timestamp, secret);

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Mentioned recipients of a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct At {
    #[serde(rename = "atMobiles", skip_serializing_if = "Vec::is_empty")]
    pub at_mobiles: Vec<String>,
    #[serde(rename = "isAtAll")]
    pub is_at_all: bool,
}

impl At {
    /// `all` mentions everyone; otherwise a comma separated mobile list
    pub fn parse(to_user: &str) -> Self {
        if to_user == AT_ALL {
            return Self {
                at_mobiles: Vec::new(),
                is_at_all: true,
            };
        }

        let mut seen = HashSet::new();
        let at_mobiles = to_user
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .filter(|m| seen.insert(m.to_string()))
            .map(str::to_string)
            .collect();

        Self {
            at_mobiles,
            is_at_all: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ActionCardContent<'a> {
    text: &'a str,
    title: &'a str,
    #[serde(rename = "singleTitle")]
    single_title: &'a str,
    #[serde(rename = "singleURL")]
    single_url: &'a str,
}

#[derive(Debug, Serialize)]
struct LinkContent<'a> {
    text: &'a str,
    title: &'a str,
    #[serde(rename = "messageUrl")]
    message_url: &'a str,
}

#[derive(Debug, Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MarkdownContent<'a> {
    text: &'a str,
    title: &'a str,
}

/// Robot message body, tagged by `msgtype`
#[derive(Debug, Serialize)]
#[serde(tag = "msgtype")]
enum DingDingMessage<'a> {
    #[serde(rename = "actionCard")]
    ActionCard {
        #[serde(rename = "actionCard")]
        action_card: ActionCardContent<'a>,
    },
    #[serde(rename = "link")]
    Link { link: LinkContent<'a> },
    #[serde(rename = "text")]
    Text { text: TextContent<'a>, at: At },
    #[serde(rename = "markdown")]
    Markdown {
        markdown: MarkdownContent<'a>,
        at: At,
    },
}

/// Build the JSON body for `msg_type`
///
/// An unknown type serializes to `null` rather than failing the call.
pub fn build_body(
    url: &str,
    msg_type: &MessageType,
    title: &str,
    msg: &str,
    to_user: &str,
) -> serde_json::Result<String> {
    let message = match msg_type {
        MessageType::ActionCard => Some(DingDingMessage::ActionCard {
            action_card: ActionCardContent {
                text: msg,
                title,
                single_title: "More",
                single_url: url,
            },
        }),
        MessageType::Link => Some(DingDingMessage::Link {
            link: LinkContent {
                text: msg,
                title,
                message_url: url,
            },
        }),
        MessageType::Text => Some(DingDingMessage::Text {
            text: TextContent { content: msg },
            at: At::parse(to_user),
        }),
        MessageType::Markdown => Some(DingDingMessage::Markdown {
            markdown: MarkdownContent { text: msg, title },
            at: At::parse(to_user),
        }),
        MessageType::Unknown(other) => {
            tracing::warn!(receiver = DINGDING, msg_type = %other, "unknown DingDing message type, sending empty body");
            None
        }
    };

    serde_json::to_string(&message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{encode_for_storage, PlaintextDecrypter, SecureSettings};
    use crate::testing::{fixture_alerts, FailingSender, FailingTemplate, RecordingSender};
    use crate::templates::TextTemplate;
    use serde_json::{json, Value};
    use tracing_test::traced_test;
    use url::Url;

    fn engine() -> Arc<dyn TemplateEngine> {
        Arc::new(TextTemplate::new(Url::parse("http://localhost:3000/").unwrap()))
    }

    fn meta() -> Metadata {
        Metadata {
            uid: "dd-uid".to_string(),
            name: "dd".to_string(),
            receiver_type: DINGDING.to_string(),
            disable_resolve_message: false,
        }
    }

    fn config(settings: Value) -> Config {
        let secure = SecureSettings::new();
        Config::new(&settings, &SecureValues::new(Arc::new(PlaintextDecrypter), &secure)).unwrap()
    }

    fn body_json(msg_type: &str, to_user: &str) -> Value {
        let body = build_body(
            "dingtalk://link",
            &MessageType::parse(msg_type),
            "Title",
            "Message",
            to_user,
        )
        .unwrap();
        serde_json::from_str(&body).unwrap()
    }

    #[test]
    fn test_text_mentions_mobiles() {
        let body = body_json("text", "111,222");
        assert_eq!(
            body,
            json!({
                "msgtype": "text",
                "text": {"content": "Message"},
                "at": {"atMobiles": ["111", "222"], "isAtAll": false}
            })
        );
    }

    #[test]
    fn test_text_mentions_all() {
        let body = body_json("text", "all");
        assert_eq!(body["at"]["isAtAll"], json!(true));
        assert!(body["at"].get("atMobiles").is_none());
    }

    #[test]
    fn test_recipient_parsing() {
        assert_eq!(At::parse("111, 222,,111").at_mobiles, vec!["111", "222"]);
        assert_eq!(At::parse(""), At::default());
        assert!(!At::parse("All").is_at_all);
    }

    #[test]
    fn test_action_card_body() {
        let body = body_json("actionCard", "");
        assert_eq!(
            body,
            json!({
                "msgtype": "actionCard",
                "actionCard": {
                    "text": "Message",
                    "title": "Title",
                    "singleTitle": "More",
                    "singleURL": "dingtalk://link"
                }
            })
        );
    }

    #[test]
    fn test_link_body() {
        let body = body_json("link", "111");
        assert_eq!(
            body,
            json!({
                "msgtype": "link",
                "link": {"text": "Message", "title": "Title", "messageUrl": "dingtalk://link"}
            })
        );
    }

    #[test]
    fn test_markdown_body() {
        let body = body_json("markdown", "111");
        assert_eq!(body["msgtype"], "markdown");
        assert_eq!(body["markdown"], json!({"text": "Message", "title": "Title"}));
        assert_eq!(body["at"], json!({"atMobiles": ["111"], "isAtAll": false}));
    }

    #[test]
    fn test_unknown_type_builds_null_body() {
        let body = build_body("u", &MessageType::parse("card"), "t", "m", "").unwrap();
        assert_eq!(body, "null");
    }

    #[test]
    fn test_dingding_url() {
        let url = build_dingding_url(engine().as_ref());
        assert_eq!(
            url,
            "dingtalk://dingtalkclient/page/link?pc_slide=false&url=http%3A%2F%2Flocalhost%3A3000%2Falerting%2Flist"
        );
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let cfg = config(json!({"url": "http://localhost"}));
        assert_eq!(cfg.msg_type, "link");
        assert_eq!(cfg.title, DEFAULT_TITLE);
        assert_eq!(cfg.message, DEFAULT_MESSAGE);
        assert!(cfg.secret.is_empty());

        let secure = SecureSettings::new();
        let values = SecureValues::new(Arc::new(PlaintextDecrypter), &secure);
        assert!(matches!(
            Config::new(&json!({}), &values),
            Err(ConfigError::MissingField { field: "url", .. })
        ));
        assert!(matches!(
            Config::new(&json!({"url": "http://x", "msgType": "card"}), &values),
            Err(ConfigError::InvalidValue { field: "msgType", .. })
        ));
        assert!(Config::new(&json!({"url": "http://x", "msgType": "{{ labels.type }}"}), &values).is_ok());
    }

    #[test]
    fn test_config_resolves_secret() {
        let mut secure = SecureSettings::new();
        secure.insert("secret".to_string(), encode_for_storage("SEC123"));
        let values = SecureValues::new(Arc::new(PlaintextDecrypter), &secure);
        let cfg = Config::new(&json!({"url": "http://x"}), &values).unwrap();
        assert_eq!(cfg.secret, "SEC123");
    }

    #[test]
    fn test_generate_signature() {
        let signature = generate_signature("SEC1234567890", 1_600_000_000_000);
        assert_eq!(signature, generate_signature("SEC1234567890", 1_600_000_000_000));
        assert_ne!(signature, generate_signature("SEC1234567890", 1_600_000_000_001));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&signature)
            .unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_sign_url() {
        let sender = Arc::new(RecordingSender::default());
        let mut cfg = config(json!({"url": "https://oapi.dingtalk.com/robot/send?access_token=t"}));
        let unsigned = DingDingNotifier::new(cfg.clone(), meta(), engine(), sender.clone());
        assert_eq!(unsigned.sign_url(&cfg.url, 1), cfg.url);

        cfg.secret = "SEC123".to_string();
        let signed = DingDingNotifier::new(cfg.clone(), meta(), engine(), sender);
        let url = signed.sign_url(&cfg.url, 1_600_000_000_000);
        assert!(url.starts_with("https://oapi.dingtalk.com/robot/send?access_token=t&timestamp=1600000000000&sign="));
        assert!(!url["https://".len()..].contains('+'));
        assert!(signed.sign_url("http://x", 1).starts_with("http://x?timestamp=1&sign="));
    }

    #[tokio::test]
    async fn test_notify_sends_rendered_body() {
        let sender = Arc::new(RecordingSender::default());
        let cfg = config(json!({
            "url": "http://localhost/robot",
            "msgType": "text",
            "message": "{{ labels.alertname }} is {{ status }}",
            "toUser": "111,222"
        }));
        let notifier = DingDingNotifier::new(cfg, meta(), engine(), sender.clone());

        let ok = notifier
            .notify(&CancellationToken::new(), &fixture_alerts())
            .await
            .unwrap();
        assert!(ok);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://localhost/robot");
        let body: Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(body["text"]["content"], "TestAlert is firing");
        assert_eq!(body["at"]["atMobiles"], json!(["111", "222"]));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_notify_url_template_failure_falls_back_to_raw_url() {
        let sender = Arc::new(RecordingSender::default());
        let raw_url = "http://localhost/{{ broken_url }}";
        let cfg = config(json!({"url": raw_url, "msgType": "link", "title": "{{ broken_title }}"}));
        let tmpl: Arc<dyn TemplateEngine> = Arc::new(FailingTemplate::new("broken"));
        let notifier = DingDingNotifier::new(cfg, meta(), tmpl, sender.clone());

        let ok = notifier
            .notify(&CancellationToken::new(), &fixture_alerts())
            .await
            .unwrap();
        assert!(ok);

        let sent = sender.sent();
        assert_eq!(sent[0].url, raw_url);
        let body: Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(body["link"]["title"], "{{ broken_title }}");
        assert!(logs_contain("failed to template DingDing message"));
        assert!(logs_contain("failed to template DingDing URL"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_notify_templated_unknown_type_sends_null_body() {
        let sender = Arc::new(RecordingSender::default());
        let cfg = config(json!({"url": "http://localhost/robot", "msgType": "{{ labels.alertname }}"}));
        let notifier = DingDingNotifier::new(cfg, meta(), engine(), sender.clone());

        let ok = notifier
            .notify(&CancellationToken::new(), &fixture_alerts())
            .await
            .unwrap();
        assert!(ok);

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "null");
        assert!(logs_contain("unknown DingDing message type"));
    }

    #[tokio::test]
    async fn test_notify_transport_error_names_receiver() {
        let cfg = config(json!({"url": "http://localhost"}));
        let notifier = DingDingNotifier::new(cfg, meta(), engine(), Arc::new(FailingSender));

        let err = notifier
            .notify(&CancellationToken::new(), &fixture_alerts())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dingding"));
    }

    #[tokio::test]
    async fn test_notify_cancelled_before_send() {
        let sender = Arc::new(RecordingSender::default());
        let cfg = config(json!({"url": "http://localhost"}));
        let notifier = DingDingNotifier::new(cfg, meta(), engine(), sender.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = notifier.notify(&cancel, &fixture_alerts()).await;
        assert!(matches!(result, Err(crate::error::NotifyError::Cancelled)));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_notify_signs_url() {
        let sender = Arc::new(RecordingSender::default());
        let mut cfg = config(json!({"url": "http://localhost/robot?access_token=t"}));
        cfg.secret = "SEC123".to_string();
        let notifier = DingDingNotifier::new(cfg, meta(), engine(), sender.clone());

        notifier
            .notify(&CancellationToken::new(), &fixture_alerts())
            .await
            .unwrap();
        let sent = sender.sent();
        assert!(sent[0].url.contains("&timestamp="));
        assert!(sent[0].url.contains("&sign="));
    }
}
