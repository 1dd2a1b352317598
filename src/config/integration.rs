//! Integration config model
//!
//! An [`IntegrationConfig`] is the stored identity and configuration of one
//! configured receiver. Its [`hash`](IntegrationConfig::hash) lets a
//! reconciliation loop tell when a notifier must be rebuilt.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xxhash_rust::xxh3::Xxh3;

use crate::receivers::Metadata;
use crate::secrets::SecureSettings;

/// Configuration record of one receiver instance
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    /// Unique within a configuration set
    pub uid: String,

    /// Display name, not required to be unique
    pub name: String,

    /// Receiver type tag, e.g. `dingding`
    #[serde(rename = "type")]
    pub receiver_type: String,

    /// Suppresses notify calls for resolved batches
    #[serde(default)]
    pub disable_resolve_message: bool,

    /// Plain settings matching the receiver schema
    #[serde(default)]
    pub settings: Value,

    /// Secret settings, base64 of the encrypted bytes
    #[serde(default)]
    pub secure_settings: SecureSettings,
}

impl IntegrationConfig {
    /// 128-bit digest over every field of the record
    ///
    /// Fields are length-prefixed and objects are serialized with sorted
    /// keys, so equal records always hash equal.
    pub fn hash(&self) -> [u8; 16] {
        let mut hasher = Xxh3::new();
        self.write_hash(&mut hasher);
        hasher.digest128().to_be_bytes()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash())
    }

    fn write_hash(&self, hasher: &mut Xxh3) {
        write_field(hasher, self.uid.as_bytes());
        write_field(hasher, self.name.as_bytes());
        write_field(hasher, self.receiver_type.as_bytes());
        write_field(hasher, &[u8::from(self.disable_resolve_message)]);
        write_field(hasher, self.settings.to_string().as_bytes());
        hasher.update(&(self.secure_settings.len() as u64).to_le_bytes());
        for (key, value) in &self.secure_settings {
            write_field(hasher, key.as_bytes());
            write_field(hasher, value.as_bytes());
        }
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            uid: self.uid.clone(),
            name: self.name.clone(),
            receiver_type: self.receiver_type.clone(),
            disable_resolve_message: self.disable_resolve_message,
        }
    }
}

fn write_field(hasher: &mut Xxh3, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Digest over an ordered set of integrations
pub fn hash_integrations(configs: &[IntegrationConfig]) -> [u8; 16] {
    let mut hasher = Xxh3::new();
    hasher.update(&(configs.len() as u64).to_le_bytes());
    for config in configs {
        config.write_hash(&mut hasher);
    }
    hasher.digest128().to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> IntegrationConfig {
        let mut secure_settings = SecureSettings::new();
        secure_settings.insert("secret".to_string(), "U0VDMTIz".to_string());
        IntegrationConfig {
            uid: "dd-uid".to_string(),
            name: "dd".to_string(),
            receiver_type: "dingding".to_string(),
            disable_resolve_message: false,
            settings: json!({"url": "http://localhost", "msgType": "link"}),
            secure_settings,
        }
    }

    #[test]
    fn test_hash_is_stable() {
        let config = sample();
        assert_eq!(config.hash(), config.hash());
        assert_eq!(config.hash(), config.clone().hash());
        assert_eq!(config.hash_hex().len(), 32);
    }

    #[test]
    fn test_hash_ignores_settings_key_order() {
        let a = sample();
        let mut b = sample();
        b.settings = serde_json::from_str(r#"{"msgType":"link","url":"http://localhost"}"#).unwrap();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_changes_with_every_field() {
        let base = sample().hash();

        let mut c = sample();
        c.uid.push('x');
        assert_ne!(base, c.hash());

        let mut c = sample();
        c.name.push('x');
        assert_ne!(base, c.hash());

        let mut c = sample();
        c.receiver_type = "webhook".to_string();
        assert_ne!(base, c.hash());

        let mut c = sample();
        c.disable_resolve_message = true;
        assert_ne!(base, c.hash());

        let mut c = sample();
        c.settings["msgType"] = json!("text");
        assert_ne!(base, c.hash());

        let mut c = sample();
        c.secure_settings
            .insert("secret".to_string(), "U0VDMTI0".to_string());
        assert_ne!(base, c.hash());
    }

    #[test]
    fn test_field_boundaries_matter() {
        let mut a = sample();
        a.uid = "ab".to_string();
        a.name = "c".to_string();
        let mut b = sample();
        b.uid = "a".to_string();
        b.name = "bc".to_string();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_integrations_order_sensitive() {
        let a = sample();
        let mut b = sample();
        b.uid = "other".to_string();
        let forward = hash_integrations(&[a.clone(), b.clone()]);
        assert_eq!(forward, hash_integrations(&[a.clone(), b.clone()]));
        assert_ne!(forward, hash_integrations(&[b, a]));
    }

    #[test]
    fn test_deserialize_document() {
        let config: IntegrationConfig = serde_json::from_value(json!({
            "uid": "abc",
            "name": "ops",
            "type": "dingding",
            "settings": {"url": "http://localhost"},
            "secureSettings": {"secret": "U0VD"}
        }))
        .unwrap();
        assert_eq!(config.receiver_type, "dingding");
        assert!(!config.disable_resolve_message);
        assert_eq!(config.secure_settings["secret"], "U0VD");

        let meta = config.metadata();
        assert_eq!(meta.uid, "abc");
        assert_eq!(meta.receiver_type, "dingding");
    }
}
