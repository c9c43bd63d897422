use std::fmt;

use thiserror::Error;

use crate::correlation::Correlation;
use crate::transport::{AuthError, TransportError};
use crate::types::{
    DecryptionRequest, DecryptionResult, EncryptionRequest, EncryptionResult, ItemResult,
    RewrappingRequest, SigningRequest, SigningResult, VerificationRequest, VerificationResult,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Transit failures surfaced to callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    EncryptionBatch(Box<BatchError<EncryptionRequest, EncryptionResult>>),
    #[error("{0}")]
    DecryptionBatch(Box<BatchError<DecryptionRequest, DecryptionResult>>),
    #[error("{0}")]
    RewrappingBatch(Box<BatchError<RewrappingRequest, EncryptionResult>>),
    #[error("{0}")]
    SigningBatch(Box<BatchError<SigningRequest, SigningResult>>),
    #[error("{0}")]
    VerificationBatch(Box<BatchError<VerificationRequest, VerificationResult>>),
    /// The single item of a scalar call failed remotely.
    #[error("transit operation failed: {0}")]
    Item(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unable to correlate {requests} requests with {results} results")]
    Protocol { requests: usize, results: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Authentication(#[from] AuthError),
    #[error("malformed key descriptor: {0}")]
    MalformedResponse(String),
}

impl Error {
    /// Number of failed items when this is a batch error.
    pub fn failed_items(&self) -> Option<usize> {
        match self {
            Error::EncryptionBatch(batch) => Some(batch.error_count()),
            Error::DecryptionBatch(batch) => Some(batch.error_count()),
            Error::RewrappingBatch(batch) => Some(batch.error_count()),
            Error::SigningBatch(batch) => Some(batch.error_count()),
            Error::VerificationBatch(batch) => Some(batch.error_count()),
            _ => None,
        }
    }
}

/// A batch in which at least one item failed. Carries every outcome,
/// successes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError<R, V> {
    operation: &'static str,
    errors: usize,
    results: Correlation<R, V>,
}

impl<R, V: ItemResult> BatchError<R, V> {
    pub(crate) fn new(operation: &'static str, results: Correlation<R, V>) -> Self {
        let errors = results.values().filter(|result| result.is_error()).count();
        Self {
            operation,
            errors,
            results,
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn results(&self) -> &Correlation<R, V> {
        &self.results
    }

    pub fn into_results(self) -> Correlation<R, V> {
        self.results
    }

    /// Failed requests with their error messages, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = (&R, &str)> {
        self.results
            .iter()
            .filter_map(|(request, result)| result.error().map(|message| (request, message)))
    }
}

impl<R, V> fmt::Display for BatchError<R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} errors", self.errors, self.operation)
    }
}

impl<R: fmt::Debug, V: fmt::Debug> std::error::Error for BatchError<R, V> {}
