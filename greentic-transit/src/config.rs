//! Static per-key configuration and the effective parameter set for a call.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::SignVerifyOptions;

/// Static configuration attached to a key alias.
///
/// `name` lets an alias point at a differently named transit key; the other
/// fields provide defaults for every call made through the alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitKeyConfig {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub key_type: Option<String>,
    pub convergent_encryption: Option<bool>,
    pub hash_algorithm: Option<String>,
    pub signature_algorithm: Option<String>,
    pub prehashed: Option<bool>,
}

/// Read-only lookup of static key configuration.
pub trait KeyConfigStore: Send + Sync {
    fn key_config(&self, key_name: &str) -> Option<TransitKeyConfig>;
}

impl KeyConfigStore for HashMap<String, TransitKeyConfig> {
    fn key_config(&self, key_name: &str) -> Option<TransitKeyConfig> {
        self.get(key_name).cloned()
    }
}

impl KeyConfigStore for BTreeMap<String, TransitKeyConfig> {
    fn key_config(&self, key_name: &str) -> Option<TransitKeyConfig> {
        self.get(key_name).cloned()
    }
}

/// Parameters actually sent for one remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub key_name: String,
    pub key_type: Option<String>,
    pub convergent_encryption: Option<bool>,
    pub hash_algorithm: Option<String>,
    pub signature_algorithm: Option<String>,
    pub prehashed: Option<bool>,
    pub marshaling_algorithm: Option<String>,
    pub key_version: Option<u32>,
}

impl EffectiveConfig {
    /// Merge call options over static key config. Anything neither provides
    /// stays unset and is left to the transit engine's own defaults.
    pub fn resolve(
        key_name: &str,
        configured: Option<&TransitKeyConfig>,
        options: Option<&SignVerifyOptions>,
        key_version: Option<u32>,
    ) -> Self {
        let configured = configured.cloned().unwrap_or_default();
        let options = options.cloned().unwrap_or_default();

        Self {
            key_name: configured.name.unwrap_or_else(|| key_name.to_string()),
            key_type: configured.key_type,
            convergent_encryption: configured.convergent_encryption,
            hash_algorithm: tiered(options.hash_algorithm, configured.hash_algorithm),
            signature_algorithm: tiered(
                options.signature_algorithm,
                configured.signature_algorithm,
            ),
            prehashed: tiered(options.prehashed, configured.prehashed),
            marshaling_algorithm: tiered(options.marshaling_algorithm, None),
            key_version,
        }
    }
}

/// Call option, then static config, then unset.
fn tiered<T>(call: Option<T>, configured: Option<T>) -> Option<T> {
    call.or(configured)
}
