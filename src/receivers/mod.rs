//! Receiver implementations
//!
//! Each receiver type turns rendered configuration into its vendor payload
//! and hands it to the webhook transport. [`NotifierRegistry`] maps type tags
//! to their constructors.

pub mod dingding;
pub mod feishu;
pub mod r#trait;
pub mod webhook;
pub mod wecom;

pub use dingding::DingDingNotifier;
pub use feishu::FeishuNotifier;
pub use r#trait::{Base, Metadata, Notifier};
pub use webhook::WebhookNotifier;
pub use wecom::WeComNotifier;

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::IntegrationConfig;
use crate::error::{ConfigError, NotifyError};
use crate::secrets::{SecretDecrypter, SecureValues};
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::TemplateEngine;

/// Everything a constructor needs to build a notifier
pub struct FactoryConfig<'a> {
    pub config: &'a IntegrationConfig,
    pub template: Arc<dyn TemplateEngine>,
    pub sender: Arc<dyn WebhookSender>,
    pub decrypter: Arc<dyn SecretDecrypter>,
}

impl<'a> FactoryConfig<'a> {
    pub fn metadata(&self) -> Metadata {
        self.config.metadata()
    }

    pub fn secure_values(&self) -> SecureValues<'a> {
        SecureValues::new(Arc::clone(&self.decrypter), &self.config.secure_settings)
    }
}

/// Deserialize a receiver settings document
pub(crate) fn parse_settings<T: DeserializeOwned>(
    receiver: &'static str,
    settings: &serde_json::Value,
) -> Result<T, ConfigError> {
    let settings = if settings.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        settings.clone()
    };
    serde_json::from_value(settings).map_err(|source| ConfigError::InvalidSettings { receiver, source })
}

/// Join `relative` onto the path of `base`, keeping a trailing slash of
/// `relative`. An unparsable base is returned unchanged.
pub fn join_url_path(base: &str, relative: &str) -> String {
    let mut url = match Url::parse(base) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(url = base, error = %e, "failed to parse URL while joining path");
            return base.to_string();
        }
    };

    let mut joined = url.path().trim_end_matches('/').to_string();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        joined.push('/');
        joined.push_str(segment);
    }
    if joined.is_empty() || relative.ends_with('/') {
        joined.push('/');
    }
    url.set_path(&joined);
    url.to_string()
}

/// Send through the transport unless `cancel` fires first
pub(crate) async fn send_webhook(
    sender: &dyn WebhookSender,
    cancel: &CancellationToken,
    receiver: &'static str,
    cmd: &SendWebhookSettings,
) -> Result<(), NotifyError> {
    if cancel.is_cancelled() {
        return Err(NotifyError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NotifyError::Cancelled),
        result = sender.send_webhook(cmd) => {
            result.map_err(|source| NotifyError::Send { receiver, source })
        }
    }
}

/// Constructor for one receiver type
pub type NotifierFactory =
    Box<dyn Fn(&FactoryConfig<'_>) -> Result<Box<dyn Notifier>, ConfigError> + Send + Sync>;

/// Registry of receiver constructors keyed by type tag
pub struct NotifierRegistry {
    factories: HashMap<String, NotifierFactory>,
}

impl NotifierRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with all built-in receivers registered
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(dingding::DINGDING, Box::new(dingding::build));
        registry.register(feishu::FEISHU, Box::new(feishu::build));
        registry.register(webhook::WEBHOOK, Box::new(webhook::build));
        registry.register(wecom::WECOM, Box::new(wecom::build));
        registry
    }

    /// Register a constructor, replacing any previous one for the tag
    pub fn register(&mut self, receiver_type: &str, factory: NotifierFactory) {
        self.factories.insert(receiver_type.to_string(), factory);
    }

    /// Build the notifier for an integration config
    pub fn build(&self, fc: &FactoryConfig<'_>) -> Result<Box<dyn Notifier>, ConfigError> {
        let factory = self
            .factories
            .get(&fc.config.receiver_type)
            .ok_or_else(|| ConfigError::UnknownType(fc.config.receiver_type.clone()))?;
        let notifier = factory(fc)?;
        tracing::debug!(
            receiver = %fc.config.receiver_type,
            uid = %fc.config.uid,
            hash = %fc.config.hash_hex(),
            "notifier built"
        );
        Ok(notifier)
    }

    pub fn has_type(&self, receiver_type: &str) -> bool {
        self.factories.contains_key(receiver_type)
    }

    /// List all registered type tags
    pub fn types(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process wide registry of the built-in receivers
pub fn global() -> &'static NotifierRegistry {
    static REGISTRY: OnceLock<NotifierRegistry> = OnceLock::new();
    REGISTRY.get_or_init(NotifierRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::secrets::PlaintextDecrypter;
    use crate::templates::TextTemplate;
    use async_trait::async_trait;

    struct SlowSender;

    #[async_trait]
    impl WebhookSender for SlowSender {
        async fn send_webhook(&self, _cmd: &SendWebhookSettings) -> Result<(), TransportError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[test]
    fn test_registry() {
        let registry = NotifierRegistry::new();
        let mut types = registry.types();
        types.sort();
        assert_eq!(types, vec!["dingding", "feishu", "webhook", "wecom"]);
        assert!(registry.has_type("dingding"));
        assert!(!registry.has_type("nonexistent"));
        assert!(global().has_type("webhook"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let registry = NotifierRegistry::new();
        let config = IntegrationConfig {
            uid: "x".to_string(),
            name: "x".to_string(),
            receiver_type: "nonexistent".to_string(),
            disable_resolve_message: false,
            settings: serde_json::json!({}),
            secure_settings: Default::default(),
        };
        let fc = FactoryConfig {
            config: &config,
            template: Arc::new(TextTemplate::new(Url::parse("http://localhost/").unwrap())),
            sender: Arc::new(SlowSender),
            decrypter: Arc::new(PlaintextDecrypter),
        };
        let err = registry.build(&fc).err().expect("unknown type must fail");
        assert!(matches!(err, ConfigError::UnknownType(t) if t == "nonexistent"));
    }

    #[test]
    fn test_join_url_path() {
        assert_eq!(
            join_url_path("http://localhost:3000/", "/alerting/list"),
            "http://localhost:3000/alerting/list"
        );
        assert_eq!(
            join_url_path("http://localhost:3000", "alerting/list"),
            "http://localhost:3000/alerting/list"
        );
        assert_eq!(
            join_url_path("https://example.com/sub/", "/alerting/list/"),
            "https://example.com/sub/alerting/list/"
        );
        assert_eq!(join_url_path("not a url", "/alerting"), "not a url");
    }

    #[test]
    fn test_parse_settings_null_is_empty() {
        #[derive(serde::Deserialize)]
        struct S {
            #[serde(default)]
            url: String,
        }
        let s: S = parse_settings("test", &serde_json::Value::Null).unwrap();
        assert!(s.url.is_empty());
        let err = parse_settings::<S>("test", &serde_json::json!({"url": 5}));
        assert!(matches!(err, Err(ConfigError::InvalidSettings { .. })));
    }

    #[tokio::test]
    async fn test_send_webhook_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cmd = SendWebhookSettings::json("http://localhost", "{}");
        let result = send_webhook(&SlowSender, &cancel, "test", &cmd).await;
        assert!(matches!(result, Err(NotifyError::Cancelled)));
    }

    #[tokio::test]
    async fn test_send_webhook_cancelled_in_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let cmd = SendWebhookSettings::json("http://localhost", "{}");
        let result = send_webhook(&SlowSender, &cancel, "test", &cmd).await;
        assert!(matches!(result, Err(NotifyError::Cancelled)));
    }
}
