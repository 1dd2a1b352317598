//! Alert model consumed by notifiers
//!
//! Alerts are produced by the evaluation engine and handed to a notifier
//! as an ordered batch. Notifiers only read them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::Xxh3;

/// Label or annotation set, ordered by key
pub type LabelSet = BTreeMap<String, String>;

/// Firing state of an alert at a point in time
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

/// One firing or resolved alert instance
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub labels: LabelSet,

    #[serde(default)]
    pub annotations: LabelSet,

    pub starts_at: DateTime<Utc>,

    /// Set once the alert stopped firing; a past value means resolved
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,

    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
}

impl Alert {
    /// Create a firing alert that started at `starts_at`
    pub fn firing(labels: LabelSet, annotations: LabelSet, starts_at: DateTime<Utc>) -> Self {
        Self {
            labels,
            annotations,
            starts_at,
            ends_at: None,
            generator_url: None,
        }
    }

    /// Status of the alert relative to `now`
    pub fn status_at(&self, now: DateTime<Utc>) -> AlertStatus {
        match self.ends_at {
            Some(ends_at) if ends_at <= now => AlertStatus::Resolved,
            _ => AlertStatus::Firing,
        }
    }

    /// Stable identifier derived from the label set
    pub fn fingerprint(&self) -> String {
        let mut hasher = Xxh3::new();
        for (key, value) in &self.labels {
            hasher.update(key.as_bytes());
            hasher.update(&[0xff]);
            hasher.update(value.as_bytes());
            hasher.update(&[0xff]);
        }
        format!("{:016x}", hasher.digest())
    }
}

/// Aggregated status of a batch: firing if any member is still firing
pub fn batch_status(alerts: &[Alert], now: DateTime<Utc>) -> AlertStatus {
    if alerts
        .iter()
        .any(|a| a.status_at(now) == AlertStatus::Firing)
    {
        AlertStatus::Firing
    } else {
        AlertStatus::Resolved
    }
}

/// Key/value pairs shared by every member of the set
pub(crate) fn common_pairs<'a, I>(sets: I) -> LabelSet
where
    I: IntoIterator<Item = &'a LabelSet>,
{
    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return LabelSet::new();
    };
    let mut common = first.clone();
    for set in iter {
        common.retain(|k, v| set.get(k) == Some(v));
    }
    common
}
