//! Key descriptors returned by the read-key endpoint.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::{Error, Result};
use crate::wire::{KeyVersionData, ReadKeyData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricKeyVersion {
    pub creation_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricKeyVersion {
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub creation_time: Option<String>,
}

/// Versions of a key, shaped by whether the key carries public material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyVersions {
    Symmetric(BTreeMap<String, SymmetricKeyVersion>),
    Asymmetric(BTreeMap<String, AsymmetricKeyVersion>),
}

impl KeyVersions {
    pub fn len(&self) -> usize {
        match self {
            KeyVersions::Symmetric(versions) => versions.len(),
            KeyVersions::Asymmetric(versions) => versions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of a transit key's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitKeyDetail {
    pub name: String,
    pub key_type: String,
    pub detail: BTreeMap<String, Value>,
    pub deletion_allowed: bool,
    pub derived: bool,
    pub exportable: bool,
    pub allow_plaintext_backup: bool,
    pub latest_version: u32,
    pub min_available_version: u32,
    pub min_decryption_version: u32,
    pub min_encryption_version: u32,
    pub supports_encryption: bool,
    pub supports_decryption: bool,
    pub supports_derivation: bool,
    pub supports_signing: bool,
    pub versions: KeyVersions,
}

impl TransitKeyDetail {
    pub fn is_asymmetric(&self) -> bool {
        matches!(self.versions, KeyVersions::Asymmetric(_))
    }
}

impl TryFrom<ReadKeyData> for TransitKeyDetail {
    type Error = Error;

    fn try_from(data: ReadKeyData) -> Result<Self> {
        let latest_label = data.latest_version.to_string();
        let latest = data.keys.get(&latest_label).ok_or_else(|| {
            Error::MalformedResponse(format!(
                "key {} declares latest version {latest_label} but has no such entry",
                data.name
            ))
        })?;

        let versions = if latest.public_key.is_some() {
            KeyVersions::Asymmetric(
                data.keys
                    .into_iter()
                    .map(|(label, version)| (label, asymmetric_version(version)))
                    .collect(),
            )
        } else {
            KeyVersions::Symmetric(
                data.keys
                    .into_iter()
                    .map(|(label, version)| {
                        (
                            label,
                            SymmetricKeyVersion {
                                creation_time: version.creation_time,
                            },
                        )
                    })
                    .collect(),
            )
        };

        Ok(Self {
            name: data.name,
            key_type: data.key_type,
            detail: data.detail,
            deletion_allowed: data.deletion_allowed,
            derived: data.derived,
            exportable: data.exportable,
            allow_plaintext_backup: data.allow_plaintext_backup,
            latest_version: data.latest_version,
            min_available_version: data.min_available_version,
            min_decryption_version: data.min_decryption_version,
            min_encryption_version: data.min_encryption_version,
            supports_encryption: data.supports_encryption,
            supports_decryption: data.supports_decryption,
            supports_derivation: data.supports_derivation,
            supports_signing: data.supports_signing,
            versions,
        })
    }
}

fn asymmetric_version(version: KeyVersionData) -> AsymmetricKeyVersion {
    AsymmetricKeyVersion {
        name: version.name,
        public_key: version.public_key,
        creation_time: version.creation_time,
    }
}
