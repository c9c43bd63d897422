use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Error message attached to a verification that the remote service reported
/// as not valid without giving a reason.
pub const INVALID_SIGNATURE: &str = "invalid signature";

/// Raw bytes handed to or recovered from the transit engine.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ClearData(Vec<u8>);

impl ClearData {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Interpret the payload as UTF-8, replacing invalid sequences.
    pub fn to_utf8_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Clear data is sensitive; keep it out of logs and panics.
impl fmt::Debug for ClearData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClearData({} bytes)", self.0.len())
    }
}

impl From<&str> for ClearData {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for ClearData {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for ClearData {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for ClearData {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

/// Derivation context for derived keys and convergent encryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransitContext(Vec<u8>);

impl TransitContext {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for TransitContext {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for TransitContext {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/// Payload to be signed or verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SigningInput(Vec<u8>);

impl SigningInput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SigningInput {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SigningInput {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/// One plaintext to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionRequest {
    data: ClearData,
    context: Option<TransitContext>,
    key_version: Option<u32>,
}

impl EncryptionRequest {
    pub fn new(data: impl Into<ClearData>) -> Self {
        Self {
            data: data.into(),
            context: None,
            key_version: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<TransitContext>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Encrypt with a specific key version instead of the latest one.
    pub fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub fn data(&self) -> &ClearData {
        &self.data
    }

    pub fn context(&self) -> Option<&TransitContext> {
        self.context.as_ref()
    }

    pub fn key_version(&self) -> Option<u32> {
        self.key_version
    }
}

/// One ciphertext to decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionRequest {
    ciphertext: String,
    context: Option<TransitContext>,
}

impl DecryptionRequest {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<TransitContext>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    pub fn context(&self) -> Option<&TransitContext> {
        self.context.as_ref()
    }
}

/// One ciphertext to re-encrypt under the latest (or a given) key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrappingRequest {
    ciphertext: String,
    context: Option<TransitContext>,
    key_version: Option<u32>,
}

impl RewrappingRequest {
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            context: None,
            key_version: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<TransitContext>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    pub fn context(&self) -> Option<&TransitContext> {
        self.context.as_ref()
    }

    pub fn key_version(&self) -> Option<u32> {
        self.key_version
    }
}

/// One input to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    input: SigningInput,
    context: Option<TransitContext>,
    key_version: Option<u32>,
}

impl SigningRequest {
    pub fn new(input: impl Into<SigningInput>) -> Self {
        Self {
            input: input.into(),
            context: None,
            key_version: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<TransitContext>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub fn input(&self) -> &SigningInput {
        &self.input
    }

    pub fn context(&self) -> Option<&TransitContext> {
        self.context.as_ref()
    }

    pub fn key_version(&self) -> Option<u32> {
        self.key_version
    }
}

/// One signature to check against its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    signature: String,
    input: SigningInput,
    context: Option<TransitContext>,
    key_version: Option<u32>,
}

impl VerificationRequest {
    pub fn new(signature: impl Into<String>, input: impl Into<SigningInput>) -> Self {
        Self {
            signature: signature.into(),
            input: input.into(),
            context: None,
            key_version: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<TransitContext>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn input(&self) -> &SigningInput {
        &self.input
    }

    pub fn context(&self) -> Option<&TransitContext> {
        self.context.as_ref()
    }

    pub fn key_version(&self) -> Option<u32> {
        self.key_version
    }
}

/// Common view over per-item outcomes.
pub trait ItemResult {
    /// Error reported for the item, if any.
    fn error(&self) -> Option<&str>;

    fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

/// Outcome of one batch item: a value or the error the remote service
/// reported for that item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome<T> {
    Value(T),
    Error(String),
}

impl<T> BatchOutcome<T> {
    /// Build an outcome from the remote `(value, error)` pair. A non-empty
    /// error wins over any value.
    pub fn from_remote(value: Option<T>, error: Option<String>, missing: &str) -> Self {
        match (value, error.filter(|message| !message.is_empty())) {
            (_, Some(message)) => Self::Error(message),
            (Some(value), None) => Self::Value(value),
            (None, None) => Self::Error(missing.to_string()),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(message) => Err(message),
        }
    }
}

impl<T> ItemResult for BatchOutcome<T> {
    fn error(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Error(message) => Some(message),
        }
    }
}

pub type EncryptionResult = BatchOutcome<String>;
pub type DecryptionResult = BatchOutcome<ClearData>;
pub type SigningResult = BatchOutcome<String>;

/// Outcome of one verification. Either valid with no error, or not valid with
/// an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    valid: bool,
    error: Option<String>,
}

impl VerificationResult {
    pub fn from_remote(valid: Option<bool>, error: Option<String>) -> Self {
        if valid == Some(true) {
            return Self {
                valid: true,
                error: None,
            };
        }
        let error = error
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| INVALID_SIGNATURE.to_string());
        Self {
            valid: false,
            error: Some(error),
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }
}

impl ItemResult for VerificationResult {
    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Per-call overrides for signing and verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignVerifyOptions {
    pub hash_algorithm: Option<String>,
    pub signature_algorithm: Option<String>,
    pub prehashed: Option<bool>,
    pub marshaling_algorithm: Option<String>,
}

impl SignVerifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_algorithm(mut self, value: impl Into<String>) -> Self {
        self.hash_algorithm = Some(value.into());
        self
    }

    pub fn signature_algorithm(mut self, value: impl Into<String>) -> Self {
        self.signature_algorithm = Some(value.into());
        self
    }

    pub fn prehashed(mut self, on: bool) -> Self {
        self.prehashed = Some(on);
        self
    }

    pub fn marshaling_algorithm(mut self, value: impl Into<String>) -> Self {
        self.marshaling_algorithm = Some(value.into());
        self
    }
}

/// Parameters for creating a transit key. Unset fields use the engine's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCreationRequestDetail {
    pub key_type: Option<String>,
    pub exportable: Option<bool>,
    pub derived: Option<bool>,
    pub convergent_encryption: Option<bool>,
    pub allow_plaintext_backup: Option<bool>,
}

/// Mutable settings of an existing transit key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyConfigRequestDetail {
    pub min_decryption_version: Option<u32>,
    pub min_encryption_version: Option<u32>,
    pub deletion_allowed: Option<bool>,
    pub exportable: Option<bool>,
    pub allow_plaintext_backup: Option<bool>,
}

/// Kind of key material to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportKeyType {
    Encryption,
    Signing,
    Hmac,
}

impl ExportKeyType {
    /// Path segment used by the export endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKeyType::Encryption => "encryption-key",
            ExportKeyType::Signing => "signing-key",
            ExportKeyType::Hmac => "hmac-key",
        }
    }
}

impl fmt::Display for ExportKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exported key material keyed by version label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExportDetail {
    pub name: String,
    pub keys: BTreeMap<String, String>,
}
