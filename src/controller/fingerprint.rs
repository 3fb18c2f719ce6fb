//! # Rollout Fingerprints
//!
//! A workload that must restart when its configuration changes registers the
//! Secrets and ConfigMaps it reads. Their content is hashed into a fingerprint
//! that is written to the pod template, so any content change produces a new
//! pod template and the workload controller rolls the pods.
//!
//! The hash is taken over sorted `(key, value)` pairs with length-prefixed
//! encoding: insertion order never matters and no two distinct pair sets can
//! produce the same byte stream.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use sha2::{Digest, Sha256};

/// Number of hash bytes kept in the fingerprint (hex encoded)
const FINGERPRINT_BYTES: usize = 8;

/// Fingerprint over arbitrary `(key, value)` pairs, independent of their order
pub fn fingerprint<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut sorted: Vec<(K, V)> = pairs.into_iter().collect();
    sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()).then_with(|| a.1.as_ref().cmp(b.1.as_ref())));

    let mut hasher = Sha256::new();
    for (key, value) in &sorted {
        let key = key.as_ref().as_bytes();
        let value = value.as_ref();
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    hasher
        .finalize()
        .iter()
        .take(FINGERPRINT_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Content of every configuration source a workload rolls out on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutSources {
    entries: BTreeMap<String, Vec<u8>>,
}

impl RolloutSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add one entry of a named source
    pub fn insert(&mut self, kind: &str, name: &str, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.insert(format!("{kind}/{name}/{key}"), value.into());
    }

    /// Add every `data` and `stringData` entry of a Secret
    pub fn add_secret(&mut self, secret: &Secret) {
        let name = secret.metadata.name.as_deref().unwrap_or_default();
        for (key, value) in secret.data.iter().flatten() {
            self.insert("Secret", name, key, value.0.clone());
        }
        for (key, value) in secret.string_data.iter().flatten() {
            self.insert("Secret", name, key, value.as_bytes());
        }
    }

    /// Add every `data` and `binaryData` entry of a ConfigMap
    pub fn add_config_map(&mut self, config_map: &ConfigMap) {
        let name = config_map.metadata.name.as_deref().unwrap_or_default();
        for (key, value) in config_map.data.iter().flatten() {
            self.insert("ConfigMap", name, key, value.as_bytes());
        }
        for (key, value) in config_map.binary_data.iter().flatten() {
            self.insert("ConfigMap", name, key, value.0.clone());
        }
    }

    /// Fingerprint of the collected content
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.entries)
    }
}
