use anyhow::{Context, Result};
use async_trait::async_trait;
use greentic_transit::wire::{
    CreateKeyBody, DataEnvelope, DecryptBody, DecryptData, EncryptBody, EncryptData,
    ExportKeyData, KeyConfigBody, ListKeysData, ReadKeyData, RewrapBody, SignBody, SignData,
    VerifyBody, VerifyData,
};
use greentic_transit::{TransitTransport, TransportError, TransportResult};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::VaultTransitConfig;

/// Transit endpoints over the Vault HTTP API. Calls are made once; retrying is
/// left to the caller.
#[derive(Clone)]
pub struct VaultHttpTransport {
    client: Client,
    base: Url,
    namespace: Option<String>,
    mount: Vec<String>,
}

impl VaultHttpTransport {
    pub fn new(config: &VaultTransitConfig, client: Client) -> Result<Self> {
        let base = Url::parse(&config.addr)
            .with_context(|| format!("invalid VAULT_ADDR: {}", config.addr))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("VAULT_ADDR must be an http(s) URL: {}", config.addr);
        }
        let mount = config
            .transit_mount
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            client,
            base,
            namespace: config.namespace.clone(),
            mount,
        })
    }

    /// `v1/{mount}/{segments..}` under the server address. Each segment is
    /// percent-encoded, so key names cannot escape into the query or fragment.
    fn endpoint(&self, segments: &[&str]) -> TransportResult<Url> {
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(TransportError::Request(format!(
                "empty path segment in {}",
                segments.join("/")
            )));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Request(format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .push("v1")
            .extend(&self.mount)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, token: &str, url: Url) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("X-Vault-Token", token);
        if let Some(namespace) = &self.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        builder
    }

    async fn execute(builder: RequestBuilder, path: &str) -> TransportResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        debug!(%path, status = response.status().as_u16(), "vault transit response");
        Ok(response)
    }

    async fn send(builder: RequestBuilder, path: &str) -> TransportResult<Response> {
        let response = Self::execute(builder, path).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, path, body))
    }

    async fn read_data<T: DeserializeOwned>(response: Response) -> TransportResult<T> {
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        decode_data(&body)
    }

    /// Crypto endpoints answer 400 (or 500) when any batch item failed, but
    /// still return every item's outcome. Those bodies are handed back so the
    /// caller can tell which items failed.
    async fn post_crypto<B, T>(
        &self,
        token: &str,
        segments: &[&str],
        body: &B,
        single: bool,
    ) -> TransportResult<T>
    where
        B: Serialize + Sync,
        T: CryptoPayload,
    {
        let url = self.endpoint(segments)?;
        let path = path_of(&url);
        let builder = self.request(Method::POST, token, url).json(body);
        let response = Self::execute(builder, &path).await?;
        let status = response.status();
        if status.is_success() {
            return Self::read_data(response).await;
        }

        let text = response.text().await.unwrap_or_default();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR
        ) {
            if let Ok(envelope) = serde_json::from_str::<DataEnvelope<T>>(&text) {
                if envelope.data.carries_items() {
                    debug!(%path, status = status.as_u16(), "vault transit reported item failures");
                    return Ok(envelope.data);
                }
            }
            if single && status == StatusCode::BAD_REQUEST {
                let rejected = serde_json::from_str::<VaultErrors>(&text)
                    .ok()
                    .filter(|errors| !errors.errors.is_empty())
                    .and_then(|errors| T::rejected(errors.errors.join("; ")));
                if let Some(data) = rejected {
                    return Ok(data);
                }
            }
        }
        Err(classify(status, &path, text))
    }

    /// Write endpoints answer 204 or a warnings-only envelope; the body is
    /// not inspected.
    async fn write<B>(
        &self,
        method: Method,
        token: &str,
        segments: &[&str],
        body: Option<&B>,
    ) -> TransportResult<()>
    where
        B: Serialize + Sync,
    {
        let url = self.endpoint(segments)?;
        let path = path_of(&url);
        let mut builder = self.request(method, token, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Self::send(builder, &path).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: Method,
        token: &str,
        segments: &[&str],
    ) -> TransportResult<T> {
        let url = self.endpoint(segments)?;
        let path = path_of(&url);
        let builder = self.request(method, token, url);
        let response = Self::send(builder, &path).await?;
        Self::read_data(response).await
    }
}

/// Error body of a rejected request.
#[derive(Deserialize)]
struct VaultErrors {
    #[serde(default)]
    errors: Vec<String>,
}

/// Response payloads of the encrypt, decrypt, rewrap, sign and verify
/// endpoints.
trait CryptoPayload: DeserializeOwned {
    /// Whether the payload reports per-item outcomes.
    fn carries_items(&self) -> bool;

    /// Payload standing in for a single-item request the engine rejected.
    fn rejected(_message: String) -> Option<Self> {
        None
    }
}

impl CryptoPayload for EncryptData {
    fn carries_items(&self) -> bool {
        !self.batch_results.is_empty() || self.error.is_some()
    }

    fn rejected(message: String) -> Option<Self> {
        Some(Self {
            error: Some(message),
            ..Default::default()
        })
    }
}

impl CryptoPayload for DecryptData {
    fn carries_items(&self) -> bool {
        !self.batch_results.is_empty()
    }
}

impl CryptoPayload for SignData {
    fn carries_items(&self) -> bool {
        !self.batch_results.is_empty()
    }
}

impl CryptoPayload for VerifyData {
    fn carries_items(&self) -> bool {
        !self.batch_results.is_empty()
    }
}

fn classify(status: StatusCode, path: &str, body: String) -> TransportError {
    let path = path.to_string();
    match status {
        StatusCode::NOT_FOUND => TransportError::NotFound { path },
        StatusCode::FORBIDDEN => TransportError::PermissionDenied { path },
        status => TransportError::Status {
            status: status.as_u16(),
            path,
            body,
        },
    }
}

fn decode_data<T: DeserializeOwned>(body: &str) -> TransportResult<T> {
    let envelope: DataEnvelope<T> = serde_json::from_str(body)
        .map_err(|err| TransportError::Decode(format!("{err}; body={body}")))?;
    Ok(envelope.data)
}

fn path_of(url: &Url) -> String {
    url.path().trim_start_matches('/').to_string()
}

fn with_optional<'a>(mut segments: Vec<&'a str>, last: Option<&'a str>) -> Vec<&'a str> {
    segments.extend(last);
    segments
}

#[async_trait]
impl TransitTransport for VaultHttpTransport {
    async fn encrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &EncryptBody,
    ) -> TransportResult<EncryptData> {
        let single = body.batch_input.is_none();
        self.post_crypto(token, &["encrypt", key_name], body, single)
            .await
    }

    async fn decrypt(
        &self,
        token: &str,
        key_name: &str,
        body: &DecryptBody,
    ) -> TransportResult<DecryptData> {
        self.post_crypto(token, &["decrypt", key_name], body, false)
            .await
    }

    async fn rewrap(
        &self,
        token: &str,
        key_name: &str,
        body: &RewrapBody,
    ) -> TransportResult<EncryptData> {
        self.post_crypto(token, &["rewrap", key_name], body, false)
            .await
    }

    async fn sign(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &SignBody,
    ) -> TransportResult<SignData> {
        let segments = with_optional(vec!["sign", key_name], hash_algorithm);
        self.post_crypto(token, &segments, body, false).await
    }

    async fn verify(
        &self,
        token: &str,
        key_name: &str,
        hash_algorithm: Option<&str>,
        body: &VerifyBody,
    ) -> TransportResult<VerifyData> {
        let segments = with_optional(vec!["verify", key_name], hash_algorithm);
        self.post_crypto(token, &segments, body, false).await
    }

    async fn create_key(
        &self,
        token: &str,
        key_name: &str,
        body: &CreateKeyBody,
    ) -> TransportResult<()> {
        self.write(Method::POST, token, &["keys", key_name], Some(body))
            .await
    }

    async fn update_key_config(
        &self,
        token: &str,
        key_name: &str,
        body: &KeyConfigBody,
    ) -> TransportResult<()> {
        self.write(Method::POST, token, &["keys", key_name, "config"], Some(body))
            .await
    }

    async fn delete_key(&self, token: &str, key_name: &str) -> TransportResult<()> {
        self.write::<()>(Method::DELETE, token, &["keys", key_name], None)
            .await
    }

    async fn export_key(
        &self,
        token: &str,
        export_type: &str,
        key_name: &str,
        version: Option<&str>,
    ) -> TransportResult<ExportKeyData> {
        let segments = with_optional(vec!["export", export_type, key_name], version);
        self.get(Method::GET, token, &segments).await
    }

    async fn read_key(&self, token: &str, key_name: &str) -> TransportResult<ReadKeyData> {
        self.get(Method::GET, token, &["keys", key_name]).await
    }

    async fn list_keys(&self, token: &str) -> TransportResult<ListKeysData> {
        let method =
            Method::from_bytes(b"LIST").map_err(|err| TransportError::Request(err.to_string()))?;
        match self.get(method, token, &["keys"]).await {
            // An empty mount answers LIST with 404.
            Err(err) if err.is_not_found() => Ok(ListKeysData::default()),
            other => other,
        }
    }
}
