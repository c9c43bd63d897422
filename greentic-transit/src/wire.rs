//! JSON bodies and response payloads of the transit HTTP API.
//!
//! Binary values travel as standard base64. Optional request fields are
//! omitted when unset so the engine applies its own defaults.

use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    BatchOutcome, ClearData, DecryptionRequest, DecryptionResult, EncryptionRequest,
    EncryptionResult, KeyConfigRequestDetail, KeyCreationRequestDetail, RewrappingRequest,
    SigningRequest, SigningResult, TransitContext, VerificationRequest, VerificationResult,
};

/// Vault wraps every payload in a `data` field.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

fn encode_context(context: Option<&TransitContext>) -> Option<String> {
    context.map(|context| STANDARD.encode(context.as_bytes()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptBatchInput {
    pub plaintext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
}

impl From<&EncryptionRequest> for EncryptBatchInput {
    fn from(request: &EncryptionRequest) -> Self {
        Self {
            plaintext: STANDARD.encode(request.data().as_bytes()),
            context: encode_context(request.context()),
            key_version: request.key_version(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergent_encryption: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_input: Option<Vec<EncryptBatchInput>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptBatchResult {
    #[serde(default)]
    pub ciphertext: Option<String>,
    #[serde(default)]
    pub key_version: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EncryptBatchResult {
    pub fn into_outcome(self) -> EncryptionResult {
        BatchOutcome::from_remote(self.ciphertext, self.error, "missing ciphertext")
    }
}

/// Response of the encrypt and rewrap endpoints. Single calls fill the top
/// level fields, batch calls fill `batch_results`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptData {
    #[serde(default)]
    pub ciphertext: Option<String>,
    #[serde(default)]
    pub key_version: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub batch_results: Vec<EncryptBatchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptBatchInput {
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&DecryptionRequest> for DecryptBatchInput {
    fn from(request: &DecryptionRequest) -> Self {
        Self {
            ciphertext: request.ciphertext().to_string(),
            context: encode_context(request.context()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptBody {
    pub batch_input: Vec<DecryptBatchInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptBatchResult {
    #[serde(default)]
    pub plaintext: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DecryptBatchResult {
    pub fn into_outcome(self) -> DecryptionResult {
        if let Some(message) = self.error.filter(|message| !message.is_empty()) {
            return BatchOutcome::Error(message);
        }
        // The engine omits the field for an empty plaintext.
        let encoded = self.plaintext.unwrap_or_default();
        match STANDARD.decode(encoded.as_bytes()) {
            Ok(bytes) => BatchOutcome::Value(ClearData::new(bytes)),
            Err(err) => BatchOutcome::Error(format!("failed to decode plaintext: {err}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptData {
    #[serde(default)]
    pub batch_results: Vec<DecryptBatchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrapBatchInput {
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
}

impl From<&RewrappingRequest> for RewrapBatchInput {
    fn from(request: &RewrappingRequest) -> Self {
        Self {
            ciphertext: request.ciphertext().to_string(),
            context: encode_context(request.context()),
            key_version: request.key_version(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrapBody {
    pub batch_input: Vec<RewrapBatchInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignBatchInput {
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&SigningRequest> for SignBatchInput {
    fn from(request: &SigningRequest) -> Self {
        Self {
            input: STANDARD.encode(request.input().as_bytes()),
            context: encode_context(request.context()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prehashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marshaling_algorithm: Option<String>,
    pub batch_input: Vec<SignBatchInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignBatchResult {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub key_version: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SignBatchResult {
    pub fn into_outcome(self) -> SigningResult {
        BatchOutcome::from_remote(self.signature, self.error, "missing signature")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignData {
    #[serde(default)]
    pub batch_results: Vec<SignBatchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyBatchInput {
    pub input: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&VerificationRequest> for VerifyBatchInput {
    fn from(request: &VerificationRequest) -> Self {
        Self {
            input: STANDARD.encode(request.input().as_bytes()),
            signature: request.signature().to_string(),
            context: encode_context(request.context()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prehashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marshaling_algorithm: Option<String>,
    pub batch_input: Vec<VerifyBatchInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyBatchResult {
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VerifyBatchResult {
    pub fn into_outcome(self) -> VerificationResult {
        VerificationResult::from_remote(self.valid, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyData {
    #[serde(default)]
    pub batch_results: Vec<VerifyBatchResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKeyBody {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exportable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergent_encryption: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_plaintext_backup: Option<bool>,
}

impl From<&KeyCreationRequestDetail> for CreateKeyBody {
    fn from(detail: &KeyCreationRequestDetail) -> Self {
        Self {
            key_type: detail.key_type.clone(),
            exportable: detail.exportable,
            derived: detail.derived,
            convergent_encryption: detail.convergent_encryption,
            allow_plaintext_backup: detail.allow_plaintext_backup,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfigBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_decryption_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_encryption_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exportable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_plaintext_backup: Option<bool>,
}

impl From<&KeyConfigRequestDetail> for KeyConfigBody {
    fn from(detail: &KeyConfigRequestDetail) -> Self {
        Self {
            min_decryption_version: detail.min_decryption_version,
            min_encryption_version: detail.min_encryption_version,
            deletion_allowed: detail.deletion_allowed,
            exportable: detail.exportable,
            allow_plaintext_backup: detail.allow_plaintext_backup,
        }
    }
}

/// One entry of the `keys` map of a key descriptor.
///
/// Symmetric keys report a bare creation timestamp, asymmetric keys an object
/// carrying the public key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawKeyVersion")]
pub struct KeyVersionData {
    pub name: Option<String>,
    pub public_key: Option<String>,
    pub creation_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeyVersion {
    Timestamp(i64),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        public_key: Option<String>,
        #[serde(default)]
        creation_time: Option<String>,
    },
}

impl From<RawKeyVersion> for KeyVersionData {
    fn from(raw: RawKeyVersion) -> Self {
        match raw {
            RawKeyVersion::Timestamp(seconds) => Self {
                name: None,
                public_key: None,
                creation_time: Some(seconds.to_string()),
            },
            RawKeyVersion::Detailed {
                name,
                public_key,
                creation_time,
            } => Self {
                name,
                public_key,
                creation_time,
            },
        }
    }
}

/// Payload of the read-key endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadKeyData {
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub detail: BTreeMap<String, Value>,
    pub deletion_allowed: bool,
    pub derived: bool,
    pub exportable: bool,
    pub allow_plaintext_backup: bool,
    pub keys: BTreeMap<String, KeyVersionData>,
    pub latest_version: u32,
    pub min_available_version: u32,
    pub min_decryption_version: u32,
    pub min_encryption_version: u32,
    pub supports_encryption: bool,
    pub supports_decryption: bool,
    pub supports_derivation: bool,
    pub supports_signing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListKeysData {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportKeyData {
    pub name: String,
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}
