//! Conformance fixtures and stub collaborators
//!
//! Every receiver type registers one canonical valid configuration here.
//! The conformance tests build each notifier from its fixture and check it
//! against the shared contract, so adding a receiver only takes a fixture.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::alert::{Alert, LabelSet};
use crate::config::IntegrationConfig;
use crate::error::{TemplateError, TransportError};
use crate::receivers::{dingding, feishu, webhook, wecom, FactoryConfig};
use crate::secrets::{encode_for_storage, resolve, PlaintextDecrypter, SecureSettings};
use crate::sender::{SendWebhookSettings, WebhookSender};
use crate::templates::{TemplateData, TemplateEngine, TextTemplate};

/// Canonical fixture of one receiver type
#[derive(Debug, Clone, Copy)]
pub struct NotifierConfigTest {
    pub notifier_type: &'static str,
    pub config: &'static str,
    pub secrets: &'static str,
}

impl NotifierConfigTest {
    /// Integration config for this fixture, with secrets stored as at rest
    ///
    /// # Panics
    ///
    /// Panics if the fixture JSON is malformed.
    pub fn raw_notifier_config(&self, name: &str) -> IntegrationConfig {
        let mut secure_settings = SecureSettings::new();
        if !self.secrets.is_empty() {
            let secrets: BTreeMap<String, String> =
                serde_json::from_str(self.secrets).expect("fixture secrets must be valid JSON");
            for (key, value) in secrets {
                secure_settings.insert(key, encode_for_storage(&value));
            }
        }

        IntegrationConfig {
            uid: format!("{}-uid", name),
            name: name.to_string(),
            receiver_type: self.notifier_type.to_string(),
            disable_resolve_message: true,
            settings: serde_json::from_str(self.config).expect("fixture config must be valid JSON"),
            secure_settings,
        }
    }
}

/// Fixtures of every built-in receiver type
pub fn all_known_configs_for_testing() -> BTreeMap<&'static str, NotifierConfigTest> {
    [
        NotifierConfigTest {
            notifier_type: dingding::DINGDING,
            config: dingding::FULL_VALID_CONFIG_FOR_TESTING,
            secrets: dingding::FULL_VALID_SECRETS_FOR_TESTING,
        },
        NotifierConfigTest {
            notifier_type: feishu::FEISHU,
            config: feishu::FULL_VALID_CONFIG_FOR_TESTING,
            secrets: "",
        },
        NotifierConfigTest {
            notifier_type: webhook::WEBHOOK,
            config: webhook::FULL_VALID_CONFIG_FOR_TESTING,
            secrets: webhook::FULL_VALID_SECRETS_FOR_TESTING,
        },
        NotifierConfigTest {
            notifier_type: wecom::WECOM,
            config: wecom::FULL_VALID_CONFIG_FOR_TESTING,
            secrets: wecom::FULL_VALID_SECRETS_FOR_TESTING,
        },
    ]
    .into_iter()
    .map(|fixture| (fixture.notifier_type, fixture))
    .collect()
}

/// Resolver over secrets stored by [`NotifierConfigTest::raw_notifier_config`]
pub fn decrypt_for_testing(secure_settings: &SecureSettings, key: &str, fallback: &str) -> String {
    resolve(&PlaintextDecrypter, secure_settings, key, fallback)
}

/// Factory inputs wired to test collaborators
pub fn factory_config_for_testing<'a>(
    config: &'a IntegrationConfig,
    template: Arc<dyn TemplateEngine>,
    sender: Arc<dyn WebhookSender>,
) -> FactoryConfig<'a> {
    FactoryConfig {
        config,
        template,
        sender,
        decrypter: Arc::new(PlaintextDecrypter),
    }
}

pub fn template_for_testing() -> Arc<dyn TemplateEngine> {
    Arc::new(TextTemplate::new(
        Url::parse("http://localhost/").expect("static URL"),
    ))
}

/// A small firing batch sharing the `TestAlert` alertname
pub fn fixture_alerts() -> Vec<Alert> {
    let starts_at = Utc::now() - Duration::minutes(5);
    ["host-a", "host-b"]
        .iter()
        .map(|host| {
            let mut labels = LabelSet::new();
            labels.insert("alertname".to_string(), "TestAlert".to_string());
            labels.insert("instance".to_string(), host.to_string());
            let mut annotations = LabelSet::new();
            annotations.insert("summary".to_string(), "Test summary".to_string());
            let mut alert = Alert::firing(labels, annotations, starts_at);
            alert.generator_url = Some("http://localhost/alerting/grafana/rule".to_string());
            alert
        })
        .collect()
}

/// Sender that records every request and succeeds
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SendWebhookSettings>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SendWebhookSettings> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send_webhook(&self, cmd: &SendWebhookSettings) -> Result<(), TransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(cmd.clone());
        }
        Ok(())
    }
}

/// Sender that always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSender;

#[async_trait]
impl WebhookSender for FailingSender {
    async fn send_webhook(&self, _cmd: &SendWebhookSettings) -> Result<(), TransportError> {
        Err(TransportError::Status {
            status: 500,
            body: "internal error".to_string(),
        })
    }
}

/// Template engine that fails on any text containing `marker`
pub struct FailingTemplate {
    inner: TextTemplate,
    marker: String,
}

impl FailingTemplate {
    pub fn new(marker: &str) -> Self {
        Self {
            inner: TextTemplate::new(Url::parse("http://localhost/").expect("static URL")),
            marker: marker.to_string(),
        }
    }
}

impl TemplateEngine for FailingTemplate {
    fn external_url(&self) -> &Url {
        self.inner.external_url()
    }

    fn render(&self, text: &str, data: &TemplateData) -> Result<String, TemplateError> {
        if text.contains(&self.marker) {
            return Err(TemplateError::Other(format!("forced failure on '{}'", self.marker)));
        }
        self.inner.render(text, data)
    }
}
