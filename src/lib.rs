//! Core notifier logic for alert-receivers
//!
//! Every receiver type implements [`Notifier`]: it takes a batch of alerts,
//! renders its configured templates against them, builds the vendor payload
//! and posts it through a [`WebhookSender`]. Template failures degrade the
//! message instead of failing the call; transport failures and cancellation
//! are reported to the caller.
//!
//! Receivers are built from an [`IntegrationConfig`] through the
//! [`NotifierRegistry`], which maps type tags such as `dingding` to their
//! constructors.

pub mod alert;
pub mod config;
pub mod error;
pub mod logging;
pub mod receivers;
pub mod secrets;
pub mod sender;
pub mod templates;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use alert::{Alert, AlertStatus, LabelSet};
pub use config::{load_config, AppConfig, IntegrationConfig};
pub use error::{
    AppConfigError, ConfigError, DecryptError, NotifyError, Result, TemplateError, TransportError,
};
pub use logging::{init_logging, LoggingConfig};
pub use receivers::{FactoryConfig, Metadata, Notifier, NotifierRegistry};
pub use secrets::{PlaintextDecrypter, SecretDecrypter, SecureSettings};
pub use sender::{HttpWebhookSender, SendWebhookSettings, WebhookSender};
pub use templates::{TemplateEngine, TextTemplate};
