//! In-memory transit engine used by the coordinator tests.
//!
//! Ciphertexts are `vault:v{version}:{base64 plaintext}:{base64 context}` and
//! signatures `vault:v{version}:{base64 input}`, which is enough to check
//! routing, ordering and correlation without real cryptography.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use greentic_transit::wire::{
    CreateKeyBody, DecryptBatchResult, DecryptBody, DecryptData, EncryptBatchResult, EncryptBody,
    EncryptData, ExportKeyData, KeyConfigBody, KeyVersionData, ListKeysData, ReadKeyData,
    RewrapBody, SignBatchResult, SignBody, SignData, VerifyBatchResult, VerifyBody, VerifyData,
};
use greentic_transit::{
    AuthError, TokenProvider, TransitManager, TransitTransport, TransportError, TransportResult,
};
use serde_json::Value;

pub const TOKEN: &str = "s.test-token";
pub const FAILING_PLAINTEXT: &str = "fail";

/// One remote call as the engine saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub op: &'static str,
    pub key: String,
    pub hash_algorithm: Option<String>,
    pub body: Value,
}

impl RecordedCall {
    pub fn batch_len(&self) -> usize {
        self.body
            .get("batch_input")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn key_version(&self) -> Option<u64> {
        self.body.get("key_version").and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone)]
struct FakeKey {
    key_type: String,
    latest_version: u32,
    exportable: bool,
    deletion_allowed: bool,
}

#[derive(Default)]
pub struct FakeTransit {
    calls: Mutex<Vec<RecordedCall>>,
    keys: Mutex<BTreeMap<String, FakeKey>>,
    drop_last_result: AtomicBool,
    failing_version: Mutex<Option<u32>>,
    delays: Mutex<BTreeMap<Option<u32>, Duration>>,
}

impl FakeTransit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == op)
            .collect()
    }

    /// Return one result fewer than requested from batch endpoints.
    pub fn drop_last_result(&self) {
        self.drop_last_result.store(true, Ordering::SeqCst);
    }

    /// Fail sign/verify calls for this key version with a server error.
    pub fn fail_version(&self, version: u32) {
        *self.failing_version.lock().unwrap() = Some(version);
    }

    /// Hold sign/verify calls for this key version before answering.
    pub fn delay_version(&self, version: Option<u32>, delay: Duration) {
        self.delays.lock().unwrap().insert(version, delay);
    }

    pub fn add_key(&self, name: &str, key_type: &str, latest_version: u32) {
        self.keys.lock().unwrap().insert(
            name.to_string(),
            FakeKey {
                key_type: key_type.to_string(),
                latest_version,
                exportable: false,
                deletion_allowed: false,
            },
        );
    }

    fn record(
        &self,
        op: &'static str,
        token: &str,
        key: &str,
        hash_algorithm: Option<&str>,
        body: Value,
    ) -> TransportResult<()> {
        self.calls.lock().unwrap().push(RecordedCall {
            op,
            key: key.to_string(),
            hash_algorithm: hash_algorithm.map(str::to_string),
            body,
        });
        if token != TOKEN {
            return Err(TransportError::PermissionDenied {
                path: format!("transit/{op}/{key}"),
            });
        }
        Ok(())
    }

    fn latest_version(&self, key: &str) -> u32 {
        self.keys
            .lock()
            .unwrap()
            .get(key)
            .map(|key| key.latest_version)
            .unwrap_or(1)
    }

    fn truncate<T>(&self, mut results: Vec<T>) -> Vec<T> {
        if self.drop_last_result.load(Ordering::SeqCst) {
            results.pop();
        }
        results
    }

    async fn hold(&self, version: Option<u32>) -> TransportResult<()> {
        let delay = self.delays.lock().unwrap().get(&version).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if version.is_some() && *self.failing_version.lock().unwrap() == version {
            return Err(TransportError::Status {
                status: 500,
                path: "transit/sign".into(),
                body: "internal error".into(),
            });
        }
        Ok(())
    }

    fn seal(version: u32, plaintext: &str, context: Option<&str>) -> EncryptBatchResult {
        let clear = STANDARD.decode(plaintext).unwrap_or_default();
        if clear == FAILING_PLAINTEXT.as_bytes() {
            return EncryptBatchResult {
                error: Some("encryption refused".into()),
                ..Default::default()
            };
        }
        EncryptBatchResult {
            ciphertext: Some(format!(
                "vault:v{version}:{plaintext}:{}",
                context.unwrap_or_default()
            )),
            key_version: Some(version),
            error: None,
        }
    }

    fn open(ciphertext: &str, context: Option<&str>) -> Result<(String, String), String> {
        let mut parts = ciphertext.splitn(4, ':');
        let (Some("vault"), Some(version), Some(plaintext), Some(sealed_context)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err("invalid ciphertext".into());
        };
        if sealed_context != context.unwrap_or_default() {
            return Err("context mismatch".into());
        }
        Ok((version.to_string(), plaintext.to_string()))
    }
}

fn to_value<T: serde::Serialize>(body: &T) -> Value {
    serde_json::to_value(body).expect("serialize body")
}

#[async_trait]
impl TransitTransport for FakeTransit {
    async fn encrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &EncryptBody,
    ) -> TransportResult<EncryptData> {
        self.record("encrypt", token, key_name, None, to_value(body))?;
        let version = self.latest_version(key_name);
        match &body.batch_input {
            Some(inputs) => {
                let results = inputs
                    .iter()
                    .map(|input| {
                        let version = input.key_version.unwrap_or(version);
                        Self::seal(version, &input.plaintext, input.context.as_deref())
                    })
                    .collect();
                Ok(EncryptData {
                    batch_results: self.truncate(results),
                    ..Default::default()
                })
            }
            None => {
                let version = body.key_version.unwrap_or(version);
                let sealed = Self::seal(
                    version,
                    body.plaintext.as_deref().unwrap_or_default(),
                    body.context.as_deref(),
                );
                Ok(EncryptData {
                    ciphertext: sealed.ciphertext,
                    key_version: sealed.key_version,
                    error: sealed.error,
                    batch_results: Vec::new(),
                })
            }
        }
    }

    async fn decrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &DecryptBody,
    ) -> TransportResult<DecryptData> {
        self.record("decrypt", token, key_name, None, to_value(body))?;
        let results = body
            .batch_input
            .iter()
            .map(
                |input| match Self::open(&input.ciphertext, input.context.as_deref()) {
                    Ok((_, plaintext)) => DecryptBatchResult {
                        plaintext: Some(plaintext),
                        error: None,
                    },
                    Err(message) => DecryptBatchResult {
                        plaintext: None,
                        error: Some(message),
                    },
                },
            )
            .collect();
        Ok(DecryptData {
            batch_results: self.truncate(results),
        })
    }

    async fn rewrap(
        &self,
        token: &str,
        key_name: &str,
        body: &RewrapBody,
    ) -> TransportResult<EncryptData> {
        self.record("rewrap", token, key_name, None, to_value(body))?;
        let latest = self.latest_version(key_name);
        let results = body
            .batch_input
            .iter()
            .map(
                |input| match Self::open(&input.ciphertext, input.context.as_deref()) {
                    Ok((_, plaintext)) => Self::seal(
                        input.key_version.unwrap_or(latest),
                        &plaintext,
                        input.context.as_deref(),
                    ),
                    Err(message) => EncryptBatchResult {
                        error: Some(message),
                        ..Default::default()
                    },
                },
            )
            .collect();
        Ok(EncryptData {
            batch_results: self.truncate(results),
            ..Default::default()
        })
    }

    async fn sign(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &SignBody,
    ) -> TransportResult<SignData> {
        self.record("sign", token, key_name, hash_algorithm, to_value(body))?;
        self.hold(body.key_version).await?;
        let version = body
            .key_version
            .unwrap_or_else(|| self.latest_version(key_name));
        let results = body
            .batch_input
            .iter()
            .map(|input| {
                let clear = STANDARD.decode(&input.input).unwrap_or_default();
                if clear == FAILING_PLAINTEXT.as_bytes() {
                    SignBatchResult {
                        error: Some("signing refused".into()),
                        ..Default::default()
                    }
                } else {
                    SignBatchResult {
                        signature: Some(format!("vault:v{version}:{}", input.input)),
                        key_version: Some(version),
                        error: None,
                    }
                }
            })
            .collect();
        Ok(SignData {
            batch_results: self.truncate(results),
        })
    }

    async fn verify(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &VerifyBody,
    ) -> TransportResult<VerifyData> {
        self.record("verify", token, key_name, hash_algorithm, to_value(body))?;
        self.hold(body.key_version).await?;
        let results = body
            .batch_input
            .iter()
            .map(|input| {
                if !input.signature.starts_with("vault:v") {
                    return VerifyBatchResult {
                        valid: None,
                        error: Some("invalid signature format".into()),
                    };
                }
                let expected_suffix = format!(":{}", input.input);
                VerifyBatchResult {
                    valid: Some(input.signature.ends_with(&expected_suffix)),
                    error: None,
                }
            })
            .collect();
        Ok(VerifyData {
            batch_results: self.truncate(results),
        })
    }

    async fn create_key(
        &self,
        token: &str,
        key_name: &str,
        body: &CreateKeyBody,
    ) -> TransportResult<()> {
        self.record("create_key", token, key_name, None, to_value(body))?;
        self.keys.lock().unwrap().insert(
            key_name.to_string(),
            FakeKey {
                key_type: body
                    .key_type
                    .clone()
                    .unwrap_or_else(|| "aes256-gcm96".into()),
                latest_version: 1,
                exportable: body.exportable.unwrap_or(false),
                deletion_allowed: false,
            },
        );
        Ok(())
    }

    async fn update_key_config(
        &self,
        token: &str,
        key_name: &str,
        body: &KeyConfigBody,
    ) -> TransportResult<()> {
        self.record("update_key_config", token, key_name, None, to_value(body))?;
        let mut keys = self.keys.lock().unwrap();
        let key = keys.get_mut(key_name).ok_or_else(|| TransportError::NotFound {
            path: format!("transit/keys/{key_name}/config"),
        })?;
        if let Some(allowed) = body.deletion_allowed {
            key.deletion_allowed = allowed;
        }
        if let Some(exportable) = body.exportable {
            key.exportable = exportable;
        }
        Ok(())
    }

    async fn delete_key(&self, token: &str, key_name: &str) -> TransportResult<()> {
        self.record("delete_key", token, key_name, None, Value::Null)?;
        let mut keys = self.keys.lock().unwrap();
        let refused = keys
            .get(key_name)
            .is_some_and(|key| !key.deletion_allowed);
        if refused {
            return Err(TransportError::Status {
                status: 400,
                path: format!("transit/keys/{key_name}"),
                body: "deletion is not allowed for this key".into(),
            });
        }
        keys.remove(key_name);
        Ok(())
    }

    async fn export_key(
        &self,
        token: &str,
        export_type: &str,
        key_name: &str,
        version: Option<&str>,
    ) -> TransportResult<ExportKeyData> {
        self.record(
            "export_key",
            token,
            key_name,
            None,
            serde_json::json!({ "type": export_type, "version": version }),
        )?;
        let keys = self.keys.lock().unwrap();
        let key = keys.get(key_name).ok_or_else(|| TransportError::NotFound {
            path: format!("transit/export/{export_type}/{key_name}"),
        })?;
        if !key.exportable {
            return Err(TransportError::Status {
                status: 400,
                path: format!("transit/export/{export_type}/{key_name}"),
                body: "key is not exportable".into(),
            });
        }
        let label = version.unwrap_or("1").to_string();
        Ok(ExportKeyData {
            name: key_name.to_string(),
            keys: BTreeMap::from([(label, STANDARD.encode(key_name))]),
        })
    }

    async fn read_key(&self, token: &str, key_name: &str) -> TransportResult<ReadKeyData> {
        self.record("read_key", token, key_name, None, Value::Null)?;
        let keys = self.keys.lock().unwrap();
        let key = keys.get(key_name).ok_or_else(|| TransportError::NotFound {
            path: format!("transit/keys/{key_name}"),
        })?;
        let asymmetric = key.key_type.starts_with("ecdsa") || key.key_type.starts_with("ed25519");
        let versions = (1..=key.latest_version)
            .map(|version| {
                let data = if asymmetric {
                    KeyVersionData {
                        name: Some(key.key_type.clone()),
                        public_key: Some(format!("public-{version}")),
                        creation_time: Some("2024-01-01T00:00:00Z".into()),
                    }
                } else {
                    KeyVersionData {
                        creation_time: Some("1700000000".into()),
                        ..Default::default()
                    }
                };
                (version.to_string(), data)
            })
            .collect();
        Ok(ReadKeyData {
            name: key_name.to_string(),
            key_type: key.key_type.clone(),
            deletion_allowed: key.deletion_allowed,
            exportable: key.exportable,
            keys: versions,
            latest_version: key.latest_version,
            min_decryption_version: 1,
            supports_encryption: !asymmetric,
            supports_decryption: !asymmetric,
            supports_signing: asymmetric,
            ..Default::default()
        })
    }

    async fn list_keys(&self, token: &str) -> TransportResult<ListKeysData> {
        self.record("list_keys", token, "", None, Value::Null)?;
        Ok(ListKeysData {
            keys: self.keys.lock().unwrap().keys().cloned().collect(),
        })
    }
}

pub struct StaticToken(pub &'static str);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.0.to_string())
    }
}

pub struct RejectingAuth;

#[async_trait]
impl TokenProvider for RejectingAuth {
    async fn token(&self) -> Result<String, AuthError> {
        Err(AuthError::Rejected("approle secret expired".into()))
    }
}

pub fn manager(transit: &Arc<FakeTransit>) -> TransitManager {
    TransitManager::new(transit.clone(), Arc::new(StaticToken(TOKEN)))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("greentic_transit=debug")
        .try_init();
}
