//! Message template rendering
//!
//! [`TemplateEngine`] is the seam to whatever engine renders notification
//! text. [`tmpl_text`] binds an engine to one alert batch and produces a
//! [`TmplText`] renderer that never fails: a template that cannot be rendered
//! yields its literal text, and the first such failure is kept so the caller
//! can log one warning for the whole batch.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;
use url::Url;

use crate::alert::{batch_status, common_pairs, Alert, AlertStatus, LabelSet};
use crate::error::TemplateError;

/// A template engine able to render text against a batch of alerts
pub trait TemplateEngine: Send + Sync {
    /// Public base URL of the alerting system, used to build links
    fn external_url(&self) -> &Url;

    /// Render `text` against `data`
    fn render(&self, text: &str, data: &TemplateData) -> Result<String, TemplateError>;
}

/// Data a template is rendered against
#[derive(Debug, Clone)]
pub struct TemplateData {
    pub receiver: String,
    pub status: AlertStatus,
    pub alerts: Vec<Alert>,
    pub common_labels: LabelSet,
    pub common_annotations: LabelSet,
    pub external_url: String,
    /// Instant every status in this batch is judged against
    pub now: DateTime<Utc>,
}

impl TemplateData {
    pub fn new(receiver: &str, alerts: &[Alert], external_url: &Url) -> Self {
        let now = Utc::now();
        Self {
            receiver: receiver.to_string(),
            status: batch_status(alerts, now),
            alerts: alerts.to_vec(),
            common_labels: common_pairs(alerts.iter().map(|a| &a.labels)),
            common_annotations: common_pairs(alerts.iter().map(|a| &a.annotations)),
            external_url: external_url.to_string(),
            now,
        }
    }

    pub fn firing(&self) -> impl Iterator<Item = &Alert> {
        let now = self.now;
        self.alerts
            .iter()
            .filter(move |a| a.status_at(now) == AlertStatus::Firing)
    }

    pub fn resolved(&self) -> impl Iterator<Item = &Alert> {
        let now = self.now;
        self.alerts
            .iter()
            .filter(move |a| a.status_at(now) == AlertStatus::Resolved)
    }

    /// `[FIRING:2] HighCPU prod`
    pub fn default_title(&self) -> String {
        let mut title = format!("[{}", self.status.as_str().to_uppercase());
        if self.status == AlertStatus::Firing {
            let _ = write!(title, ":{}", self.firing().count());
        }
        title.push(']');
        let values: Vec<&str> = self.common_labels.values().map(String::as_str).collect();
        if !values.is_empty() {
            title.push(' ');
            title.push_str(&values.join(" "));
        }
        title
    }

    /// Plain text listing of firing and resolved alerts
    pub fn default_message(&self) -> String {
        let mut message = String::new();
        let firing: Vec<&Alert> = self.firing().collect();
        let resolved: Vec<&Alert> = self.resolved().collect();

        if !firing.is_empty() {
            let _ = writeln!(message, "**Firing**");
            for alert in firing {
                write_alert(&mut message, alert);
            }
        }
        if !resolved.is_empty() {
            if !message.is_empty() {
                message.push('\n');
            }
            let _ = writeln!(message, "**Resolved**");
            for alert in resolved {
                write_alert(&mut message, alert);
            }
        }
        message.trim_end().to_string()
    }

    /// Value of a template variable, `None` when the name is unknown
    pub fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "receiver" => Some(self.receiver.clone()),
            "status" => Some(self.status.as_str().to_string()),
            "external_url" => Some(self.external_url.clone()),
            "alerts.count" => Some(self.alerts.len().to_string()),
            "alerts.firing" => Some(self.firing().count().to_string()),
            "alerts.resolved" => Some(self.resolved().count().to_string()),
            "default.title" => Some(self.default_title()),
            "default.message" => Some(self.default_message()),
            _ => {
                if let Some(key) = name.strip_prefix("labels.") {
                    self.common_labels.get(key).cloned()
                } else if let Some(key) = name.strip_prefix("annotations.") {
                    self.common_annotations.get(key).cloned()
                } else {
                    None
                }
            }
        }
    }
}

fn write_alert(out: &mut String, alert: &Alert) {
    let _ = writeln!(out, "\nLabels:");
    for (k, v) in &alert.labels {
        let _ = writeln!(out, " - {} = {}", k, v);
    }
    if !alert.annotations.is_empty() {
        let _ = writeln!(out, "Annotations:");
        for (k, v) in &alert.annotations {
            let _ = writeln!(out, " - {} = {}", k, v);
        }
    }
    if let Some(source) = &alert.generator_url {
        let _ = writeln!(out, "Source: {}", source);
    }
}

/// Default engine: `{{ variable }}` substitution over [`TemplateData::lookup`]
///
/// Unlike a lenient replace, every action must name a known variable;
/// anything else is a render error so the caller can fall back.
#[derive(Debug, Clone)]
pub struct TextTemplate {
    external_url: Url,
}

impl TextTemplate {
    pub fn new(external_url: Url) -> Self {
        Self { external_url }
    }
}

fn variable_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(\.[A-Za-z0-9_\-]+)*$").expect("variable name regex is valid"))
}

impl TemplateEngine for TextTemplate {
    fn external_url(&self) -> &Url {
        &self.external_url
    }

    fn render(&self, text: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::Unterminated(offset + start))?;

            let name = after[..end].trim();
            if !variable_name().is_match(name) {
                return Err(TemplateError::Other(format!(
                    "unsupported action '{}'",
                    name
                )));
            }
            let value = data
                .lookup(name)
                .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
            result.push_str(&value);

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        result.push_str(rest);

        Ok(result)
    }
}

/// Renderer bound to one alert batch
///
/// Rendering never fails. The first failure is stored in a write-once slot;
/// later failures are dropped.
pub struct TmplText<'a> {
    engine: &'a dyn TemplateEngine,
    data: TemplateData,
    error: OnceLock<TemplateError>,
}

impl<'a> TmplText<'a> {
    /// Render `text`, or return it unchanged if rendering fails
    pub fn render(&self, text: &str) -> String {
        match self.engine.render(text, &self.data) {
            Ok(rendered) => rendered,
            Err(e) => {
                let _ = self.error.set(e);
                text.to_string()
            }
        }
    }

    /// First render failure since the slot was last cleared
    pub fn error(&self) -> Option<&TemplateError> {
        self.error.get()
    }

    /// Take the first render failure and clear the slot
    pub fn take_error(&mut self) -> Option<TemplateError> {
        self.error.take()
    }

    pub fn data(&self) -> &TemplateData {
        &self.data
    }
}

/// Bind `engine` to a batch of alerts delivered to `receiver`
pub fn tmpl_text<'a>(engine: &'a dyn TemplateEngine, receiver: &str, alerts: &[Alert]) -> TmplText<'a> {
    TmplText {
        engine,
        data: TemplateData::new(receiver, alerts, engine.external_url()),
        error: OnceLock::new(),
    }
}
