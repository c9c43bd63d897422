//! Collaborators the coordinator talks to: credentials and the remote engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::wire::{
    CreateKeyBody, DecryptBody, DecryptData, EncryptBody, EncryptData, ExportKeyData,
    KeyConfigBody, ListKeysData, ReadKeyData, RewrapBody, SignBody, SignData, VerifyBody,
    VerifyData,
};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failure of a remote call, classified by status category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{path} not found")]
    NotFound { path: String },
    #[error("permission denied for {path}")]
    PermissionDenied { path: String },
    #[error("vault returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
    #[error("vault request failed: {0}")]
    Request(String),
    #[error("failed to decode vault response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no vault token configured")]
    MissingToken,
    #[error("vault rejected the credentials: {0}")]
    Rejected(String),
    #[error("failed to obtain a vault token: {0}")]
    Request(String),
}

/// Source of client tokens. Implementations may refresh behind the call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

/// One method per transit endpoint. Implementations must not retry.
#[async_trait]
pub trait TransitTransport: Send + Sync {
    async fn encrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &EncryptBody,
    ) -> TransportResult<EncryptData>;

    async fn decrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &DecryptBody,
    ) -> TransportResult<DecryptData>;

    async fn rewrap(
        &self,
        token: &str,
        key_name: &str,
        body: &RewrapBody,
    ) -> TransportResult<EncryptData>;

    async fn sign(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &SignBody,
    ) -> TransportResult<SignData>;

    async fn verify(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &VerifyBody,
    ) -> TransportResult<VerifyData>;

    async fn create_key(
        &self,
        token: &str,
        key_name: &str,
        body: &CreateKeyBody,
    ) -> TransportResult<()>;

    async fn update_key_config(
        &self,
        token: &str,
        key_name: &str,
        body: &KeyConfigBody,
    ) -> TransportResult<()>;

    async fn delete_key(&self, token: &str, key_name: &str) -> TransportResult<()>;

    /// `export_type` is the path segment (`encryption-key`, ...); `version`
    /// defaults to every version when unset.
    async fn export_key(
        &self,
        token: &str,
        export_type: &str,
        key_name: &str,
        version: Option<&str>,
    ) -> TransportResult<ExportKeyData>;

    async fn read_key(&self, token: &str, key_name: &str) -> TransportResult<ReadKeyData>;

    async fn list_keys(&self, token: &str) -> TransportResult<ListKeysData>;
}
