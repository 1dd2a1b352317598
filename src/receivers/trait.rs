//! Notifier trait definition
//!
//! This module defines the contract every receiver type satisfies. The
//! dispatch pipeline only ever calls [`Notifier::notify`] and
//! [`Notifier::send_resolved`], whatever the vendor behind the receiver.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::error::Result;

/// Uniform receiver contract
///
/// A notifier is built once per integration config version and holds no
/// mutable state, so one instance may serve concurrent calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one batch of alerts
    ///
    /// Returns `Ok(true)` once the transport accepted the payload. Template
    /// failures are logged and degraded; payload and transport failures are
    /// returned. The call stops early with [`NotifyError::Cancelled`] when
    /// `cancel` fires before the send completes.
    ///
    /// [`NotifyError::Cancelled`]: crate::error::NotifyError::Cancelled
    async fn notify(&self, cancel: &CancellationToken, alerts: &[Alert]) -> Result<bool>;

    /// Whether this receiver wants to hear about resolved alerts
    fn send_resolved(&self) -> bool;
}

/// Identity of the integration a notifier was built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub uid: String,
    pub name: String,
    pub receiver_type: String,
    pub disable_resolve_message: bool,
}

/// State shared by every notifier implementation
#[derive(Debug, Clone)]
pub struct Base {
    meta: Metadata,
}

impl Base {
    pub fn new(meta: Metadata) -> Self {
        Self { meta }
    }

    pub fn uid(&self) -> &str {
        &self.meta.uid
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// `send_resolved` shared by every receiver
    pub fn send_resolved(&self) -> bool {
        !self.meta.disable_resolve_message
    }
}
