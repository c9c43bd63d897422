//! Batch coordination over the transit engine.
//!
//! Every crypto operation comes in three shapes: a scalar convenience call, an
//! explicit-context call and a list call returning a [`Correlation`]. List
//! calls never fail on the first bad item; once every item is demultiplexed a
//! single batch error reports the failure count together with all outcomes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::config::{EffectiveConfig, KeyConfigStore, TransitKeyConfig};
use crate::correlation::{Correlation, ensure_count};
use crate::errors::{BatchError, Error, Result};
use crate::grouping::{BatchGroup, group_by_key_version, scatter};
use crate::keys::TransitKeyDetail;
use crate::transport::{TokenProvider, TransitTransport};
use crate::types::{
    BatchOutcome, ClearData, DecryptionRequest, DecryptionResult, EncryptionRequest,
    EncryptionResult, ExportKeyType, INVALID_SIGNATURE, ItemResult, KeyConfigRequestDetail,
    KeyCreationRequestDetail, KeyExportDetail, RewrappingRequest, SignVerifyOptions, SigningInput,
    SigningRequest, SigningResult, TransitContext, VerificationRequest, VerificationResult,
};
use crate::wire::{
    CreateKeyBody, DecryptBatchInput, DecryptBody, EncryptBatchInput, EncryptBody,
    KeyConfigBody, RewrapBatchInput, RewrapBody, SignBatchInput, SignBody, VerifyBatchInput,
    VerifyBody,
};

/// Client-side coordinator for one transit mount.
#[derive(Clone)]
pub struct TransitManager {
    transport: Arc<dyn TransitTransport>,
    auth: Arc<dyn TokenProvider>,
    keys: Arc<dyn KeyConfigStore>,
}

impl TransitManager {
    pub fn new(transport: Arc<dyn TransitTransport>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            transport,
            auth,
            keys: Arc::new(HashMap::<String, TransitKeyConfig>::new()),
        }
    }

    /// Use `keys` to resolve static per-key configuration.
    pub fn with_key_configs(mut self, keys: Arc<dyn KeyConfigStore>) -> Self {
        self.keys = keys;
        self
    }

    fn effective_config(
        &self,
        key_name: &str,
        options: Option<&SignVerifyOptions>,
        key_version: Option<u32>,
    ) -> EffectiveConfig {
        let configured = self.keys.key_config(key_name);
        EffectiveConfig::resolve(key_name, configured.as_ref(), options, key_version)
    }

    async fn token(&self) -> Result<String> {
        Ok(self.auth.token().await?)
    }

    // --- encryption

    pub async fn encrypt(&self, key_name: &str, clear: &str) -> Result<String> {
        self.encrypt_with_context(key_name, ClearData::from(clear), None)
            .await
    }

    pub async fn encrypt_with_context(
        &self,
        key_name: &str,
        data: ClearData,
        context: Option<TransitContext>,
    ) -> Result<String> {
        let mut request = EncryptionRequest::new(data);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let results = self
            .encrypt_results(key_name, std::slice::from_ref(&request))
            .await?;
        single_value(results)
    }

    /// Encrypt every request, returning the ciphertext of each.
    pub async fn encrypt_batch(
        &self,
        key_name: &str,
        requests: Vec<EncryptionRequest>,
    ) -> Result<Correlation<EncryptionRequest, String>> {
        let results = match requests.as_slice() {
            [request] => vec![self.encrypt_single(key_name, request).await?],
            _ => self.encrypt_results(key_name, &requests).await?,
        };
        let correlation = Correlation::zip(requests, results)?;
        settle(key_name, "encryption", correlation, Error::EncryptionBatch)
    }

    async fn encrypt_results(
        &self,
        key_name: &str,
        requests: &[EncryptionRequest],
    ) -> Result<Vec<EncryptionResult>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let config = self.effective_config(key_name, None, None);
        let body = EncryptBody {
            key_type: config.key_type.clone(),
            convergent_encryption: config.convergent_encryption,
            batch_input: Some(requests.iter().map(EncryptBatchInput::from).collect()),
            ..Default::default()
        };
        let token = self.token().await?;
        debug!(key = %config.key_name, items = requests.len(), "transit encrypt batch");
        let data = self
            .transport
            .encrypt(&token, &config.key_name, &body)
            .await?;
        let results: Vec<_> = data
            .batch_results
            .into_iter()
            .map(|result| result.into_outcome())
            .collect();
        ensure_count(requests.len(), results.len())?;
        Ok(results)
    }

    // A batch of one rejects parameter combinations the plain endpoint accepts
    // (hashicorp/vault#10232). Only a one-element list reaches this; the scalar
    // calls keep sending a batch of one.
    async fn encrypt_single(
        &self,
        key_name: &str,
        request: &EncryptionRequest,
    ) -> Result<EncryptionResult> {
        let config = self.effective_config(key_name, None, None);
        let input = EncryptBatchInput::from(request);
        let body = EncryptBody {
            plaintext: Some(input.plaintext),
            context: input.context,
            key_version: input.key_version,
            key_type: config.key_type.clone(),
            convergent_encryption: config.convergent_encryption,
            batch_input: None,
        };
        let token = self.token().await?;
        debug!(key = %config.key_name, "transit encrypt");
        let data = self
            .transport
            .encrypt(&token, &config.key_name, &body)
            .await?;
        Ok(BatchOutcome::from_remote(
            data.ciphertext,
            data.error,
            "missing ciphertext",
        ))
    }

    // --- decryption

    pub async fn decrypt(&self, key_name: &str, ciphertext: &str) -> Result<ClearData> {
        self.decrypt_with_context(key_name, ciphertext, None).await
    }

    pub async fn decrypt_with_context(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: Option<TransitContext>,
    ) -> Result<ClearData> {
        let mut request = DecryptionRequest::new(ciphertext);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let results = self
            .decrypt_results(key_name, std::slice::from_ref(&request))
            .await?;
        single_value(results)
    }

    pub async fn decrypt_batch(
        &self,
        key_name: &str,
        requests: Vec<DecryptionRequest>,
    ) -> Result<Correlation<DecryptionRequest, ClearData>> {
        let results = self.decrypt_results(key_name, &requests).await?;
        let correlation = Correlation::zip(requests, results)?;
        settle(key_name, "decryption", correlation, Error::DecryptionBatch)
    }

    async fn decrypt_results(
        &self,
        key_name: &str,
        requests: &[DecryptionRequest],
    ) -> Result<Vec<DecryptionResult>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let config = self.effective_config(key_name, None, None);
        let body = DecryptBody {
            batch_input: requests.iter().map(DecryptBatchInput::from).collect(),
        };
        let token = self.token().await?;
        debug!(key = %config.key_name, items = requests.len(), "transit decrypt batch");
        let data = self
            .transport
            .decrypt(&token, &config.key_name, &body)
            .await?;
        let results: Vec<_> = data
            .batch_results
            .into_iter()
            .map(|result| result.into_outcome())
            .collect();
        ensure_count(requests.len(), results.len())?;
        Ok(results)
    }

    // --- rewrapping

    pub async fn rewrap(&self, key_name: &str, ciphertext: &str) -> Result<String> {
        self.rewrap_with_context(key_name, ciphertext, None).await
    }

    pub async fn rewrap_with_context(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: Option<TransitContext>,
    ) -> Result<String> {
        let mut request = RewrappingRequest::new(ciphertext);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let results = self
            .rewrap_results(key_name, std::slice::from_ref(&request))
            .await?;
        single_value(results)
    }

    /// Re-encrypt ciphertexts under the latest key version without exposing
    /// the plaintext.
    pub async fn rewrap_batch(
        &self,
        key_name: &str,
        requests: Vec<RewrappingRequest>,
    ) -> Result<Correlation<RewrappingRequest, String>> {
        let results = self.rewrap_results(key_name, &requests).await?;
        let correlation = Correlation::zip(requests, results)?;
        settle(key_name, "rewrapping", correlation, Error::RewrappingBatch)
    }

    async fn rewrap_results(
        &self,
        key_name: &str,
        requests: &[RewrappingRequest],
    ) -> Result<Vec<EncryptionResult>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let config = self.effective_config(key_name, None, None);
        let body = RewrapBody {
            batch_input: requests.iter().map(RewrapBatchInput::from).collect(),
        };
        let token = self.token().await?;
        debug!(key = %config.key_name, items = requests.len(), "transit rewrap batch");
        let data = self
            .transport
            .rewrap(&token, &config.key_name, &body)
            .await?;
        let results: Vec<_> = data
            .batch_results
            .into_iter()
            .map(|result| result.into_outcome())
            .collect();
        ensure_count(requests.len(), results.len())?;
        Ok(results)
    }

    // --- signing

    pub async fn sign(&self, key_name: &str, input: &str) -> Result<String> {
        self.sign_with_context(key_name, SigningInput::from(input), None, None)
            .await
    }

    pub async fn sign_with_context(
        &self,
        key_name: &str,
        input: SigningInput,
        context: Option<TransitContext>,
        options: Option<&SignVerifyOptions>,
    ) -> Result<String> {
        let mut request = SigningRequest::new(input);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let results = self
            .sign_results(key_name, std::slice::from_ref(&request), options)
            .await?;
        single_value(results)
    }

    /// Sign every request. Requests pinning different key versions are sent
    /// as separate concurrent calls; the result keeps submission order.
    pub async fn sign_batch(
        &self,
        key_name: &str,
        requests: Vec<SigningRequest>,
        options: Option<&SignVerifyOptions>,
    ) -> Result<Correlation<SigningRequest, String>> {
        let results = self.sign_results(key_name, &requests, options).await?;
        let correlation = Correlation::zip(requests, results)?;
        settle(key_name, "signing", correlation, Error::SigningBatch)
    }

    async fn sign_results(
        &self,
        key_name: &str,
        requests: &[SigningRequest],
        options: Option<&SignVerifyOptions>,
    ) -> Result<Vec<SigningResult>> {
        let groups = group_by_key_version(requests);
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.token().await?;
        let calls = groups
            .iter()
            .map(|group| self.sign_group(key_name, &token, requests, group, options));
        let completed = try_join_all(calls).await?;
        scatter(requests.len(), groups.iter().zip(completed))
    }

    async fn sign_group(
        &self,
        key_name: &str,
        token: &str,
        requests: &[SigningRequest],
        group: &BatchGroup,
        options: Option<&SignVerifyOptions>,
    ) -> Result<Vec<SigningResult>> {
        let config = self.effective_config(key_name, options, group.key_version());
        let body = SignBody {
            key_version: config.key_version,
            signature_algorithm: config.signature_algorithm.clone(),
            prehashed: config.prehashed,
            marshaling_algorithm: config.marshaling_algorithm.clone(),
            batch_input: group.select(requests).map(SignBatchInput::from).collect(),
        };
        debug!(
            key = %config.key_name,
            key_version = ?config.key_version,
            items = group.len(),
            "transit sign batch"
        );
        let data = self
            .transport
            .sign(
                token,
                &config.key_name,
                config.hash_algorithm.as_deref(),
                &body,
            )
            .await?;
        Ok(data
            .batch_results
            .into_iter()
            .map(|result| result.into_outcome())
            .collect())
    }

    // --- verification

    pub async fn verify_signature(
        &self,
        key_name: &str,
        signature: &str,
        input: &str,
    ) -> Result<()> {
        self.verify_signature_with_context(
            key_name,
            signature,
            SigningInput::from(input),
            None,
            None,
        )
        .await
    }

    /// Verify one signature. A signature the engine reports as not valid
    /// without an explanation fails with [`Error::InvalidSignature`].
    pub async fn verify_signature_with_context(
        &self,
        key_name: &str,
        signature: &str,
        input: SigningInput,
        context: Option<TransitContext>,
        options: Option<&SignVerifyOptions>,
    ) -> Result<()> {
        let mut request = VerificationRequest::new(signature, input);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let results = self
            .verify_results(key_name, std::slice::from_ref(&request), options)
            .await?;
        let result = results.into_iter().next().ok_or(Error::Protocol {
            requests: 1,
            results: 0,
        })?;
        if result.valid() {
            return Ok(());
        }
        match result.error() {
            Some(message) if message != INVALID_SIGNATURE => Err(Error::Item(message.to_string())),
            _ => Err(Error::InvalidSignature),
        }
    }

    /// Verify every request; succeeds only when all signatures are valid.
    pub async fn verify_signature_batch(
        &self,
        key_name: &str,
        requests: Vec<VerificationRequest>,
        options: Option<&SignVerifyOptions>,
    ) -> Result<()> {
        let results = self.verify_results(key_name, &requests, options).await?;
        let correlation = Correlation::zip(requests, results)?;
        if correlation.values().any(|result| result.is_error()) {
            return Err(batch_failure(
                key_name,
                "verification",
                correlation,
                Error::VerificationBatch,
            ));
        }
        Ok(())
    }

    async fn verify_results(
        &self,
        key_name: &str,
        requests: &[VerificationRequest],
        options: Option<&SignVerifyOptions>,
    ) -> Result<Vec<VerificationResult>> {
        let groups = group_by_key_version(requests);
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.token().await?;
        let calls = groups
            .iter()
            .map(|group| self.verify_group(key_name, &token, requests, group, options));
        let completed = try_join_all(calls).await?;
        scatter(requests.len(), groups.iter().zip(completed))
    }

    async fn verify_group(
        &self,
        key_name: &str,
        token: &str,
        requests: &[VerificationRequest],
        group: &BatchGroup,
        options: Option<&SignVerifyOptions>,
    ) -> Result<Vec<VerificationResult>> {
        let config = self.effective_config(key_name, options, group.key_version());
        let body = VerifyBody {
            key_version: config.key_version,
            signature_algorithm: config.signature_algorithm.clone(),
            prehashed: config.prehashed,
            marshaling_algorithm: config.marshaling_algorithm.clone(),
            batch_input: group.select(requests).map(VerifyBatchInput::from).collect(),
        };
        debug!(
            key = %config.key_name,
            key_version = ?config.key_version,
            items = group.len(),
            "transit verify batch"
        );
        let data = self
            .transport
            .verify(
                token,
                &config.key_name,
                config.hash_algorithm.as_deref(),
                &body,
            )
            .await?;
        Ok(data
            .batch_results
            .into_iter()
            .map(|result| result.into_outcome())
            .collect())
    }

    // --- key lifecycle

    pub async fn create_key(
        &self,
        key_name: &str,
        detail: Option<&KeyCreationRequestDetail>,
    ) -> Result<()> {
        let body = detail.map(CreateKeyBody::from).unwrap_or_default();
        let token = self.token().await?;
        debug!(key = %key_name, "transit create key");
        Ok(self.transport.create_key(&token, key_name, &body).await?)
    }

    pub async fn update_key_configuration(
        &self,
        key_name: &str,
        detail: &KeyConfigRequestDetail,
    ) -> Result<()> {
        let body = KeyConfigBody::from(detail);
        let token = self.token().await?;
        debug!(key = %key_name, "transit update key config");
        Ok(self
            .transport
            .update_key_config(&token, key_name, &body)
            .await?)
    }

    /// Delete a key. The engine refuses unless `deletion_allowed` was set.
    pub async fn delete_key(&self, key_name: &str) -> Result<()> {
        let token = self.token().await?;
        debug!(key = %key_name, "transit delete key");
        Ok(self.transport.delete_key(&token, key_name).await?)
    }

    pub async fn export_key(
        &self,
        key_name: &str,
        key_type: ExportKeyType,
        version: Option<&str>,
    ) -> Result<KeyExportDetail> {
        let token = self.token().await?;
        debug!(key = %key_name, export = %key_type, "transit export key");
        let data = self
            .transport
            .export_key(&token, key_type.as_str(), key_name, version)
            .await?;
        Ok(KeyExportDetail {
            name: data.name,
            keys: data.keys,
        })
    }

    /// Read key metadata. A key the engine does not know yields `Ok(None)`.
    pub async fn read_key(&self, key_name: &str) -> Result<Option<TransitKeyDetail>> {
        let token = self.token().await?;
        match self.transport.read_key(&token, key_name).await {
            Ok(data) => TransitKeyDetail::try_from(data).map(Some),
            Err(err) if err.is_not_found() => {
                debug!(key = %key_name, "transit key not found");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let token = self.token().await?;
        Ok(self.transport.list_keys(&token).await?.keys)
    }
}

/// Unwrap the outcome of a scalar call.
fn single_value<T>(results: Vec<BatchOutcome<T>>) -> Result<T> {
    match results.into_iter().next() {
        Some(BatchOutcome::Value(value)) => Ok(value),
        Some(BatchOutcome::Error(message)) => Err(Error::Item(message)),
        None => Err(Error::Protocol {
            requests: 1,
            results: 0,
        }),
    }
}

/// Success values when every item succeeded, otherwise one batch error.
fn settle<R, T>(
    key_name: &str,
    operation: &'static str,
    correlation: Correlation<R, BatchOutcome<T>>,
    wrap: fn(Box<BatchError<R, BatchOutcome<T>>>) -> Error,
) -> Result<Correlation<R, T>> {
    if correlation.values().any(|result| result.is_error()) {
        return Err(batch_failure(key_name, operation, correlation, wrap));
    }
    let (requests, values): (Vec<R>, Vec<T>) = correlation
        .into_iter()
        .filter_map(|(request, result)| result.into_value().map(|value| (request, value)))
        .unzip();
    Correlation::zip(requests, values)
}

fn batch_failure<R, V: ItemResult>(
    key_name: &str,
    operation: &'static str,
    correlation: Correlation<R, V>,
    wrap: fn(Box<BatchError<R, V>>) -> Error,
) -> Error {
    let batch = BatchError::new(operation, correlation);
    warn!(
        key = %key_name,
        failed = batch.error_count(),
        total = batch.results().len(),
        "transit {operation} batch had item failures"
    );
    wrap(Box::new(batch))
}
