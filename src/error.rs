//! Error types for alert-receivers
//!
//! This module defines structured error types using the `thiserror` crate.
//! Template and secret failures are recovered where they happen, so only
//! construction, payload and transport failures ever reach a caller.

use std::io;
use thiserror::Error;

/// Error returned by a [`Notifier`](crate::Notifier) call
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The vendor payload could not be serialized
    #[error("build payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The webhook transport rejected or failed the delivery
    #[error("send notification to {receiver}: {source}")]
    Send {
        receiver: &'static str,
        #[source]
        source: TransportError,
    },

    /// The caller cancelled the call before the send completed
    #[error("notification cancelled")]
    Cancelled,
}

/// Error raised by a webhook transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request could not be performed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The request timed out
    #[error("request timed out")]
    Timeout,

    /// The remote endpoint answered with a non-success status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured URL or method is unusable
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Error raised while rendering a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template variable '{0}'")]
    UnknownVariable(String),

    #[error("unterminated template action at byte {0}")]
    Unterminated(usize),

    #[error("template error: {0}")]
    Other(String),
}

/// Error raised by a secret store when decrypting a value
#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("invalid base64 encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("decryption failed: {0}")]
    Cipher(String),
}

/// Error raised while turning an integration config into a notifier
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No constructor is registered for the type tag
    #[error("unknown receiver type '{0}'")]
    UnknownType(String),

    /// The settings document does not match the receiver schema
    #[error("invalid settings for {receiver}: {source}")]
    InvalidSettings {
        receiver: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A required field is missing or empty
    #[error("could not find {field} property in settings of {receiver}")]
    MissingField {
        receiver: &'static str,
        field: &'static str,
    },

    /// A field holds a value outside its allowed set
    #[error("invalid {field} for {receiver}: {value}")]
    InvalidValue {
        receiver: &'static str,
        field: &'static str,
        value: String,
    },
}

/// Error raised while loading or saving the application config file
#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("I/O error on config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid external URL: {0}")]
    ExternalUrl(#[from] url::ParseError),

    #[error("unable to determine home directory")]
    NoHomeDir,

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type alias for notifier calls
pub type Result<T> = std::result::Result<T, NotifyError>;
