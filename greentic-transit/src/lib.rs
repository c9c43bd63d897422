//! Client-side coordination for the HashiCorp Vault transit engine.
//!
//! [`TransitManager`] turns scalar and list requests into transit batch calls,
//! routes signing and verification by key version, and correlates every
//! outcome back to the request that produced it. The HTTP binding, token
//! source and static key configuration are plugged in through
//! [`TransitTransport`], [`TokenProvider`] and [`KeyConfigStore`].

pub mod config;
pub mod correlation;
pub mod errors;
pub mod grouping;
pub mod keys;
pub mod manager;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{EffectiveConfig, KeyConfigStore, TransitKeyConfig};
pub use correlation::Correlation;
pub use errors::{BatchError, Error, Result};
pub use grouping::{BatchGroup, KeyVersioned, group_by_key_version};
pub use keys::{AsymmetricKeyVersion, KeyVersions, SymmetricKeyVersion, TransitKeyDetail};
pub use manager::TransitManager;
pub use transport::{AuthError, TokenProvider, TransitTransport, TransportError, TransportResult};
pub use types::{
    BatchOutcome, ClearData, DecryptionRequest, DecryptionResult, EncryptionRequest,
    EncryptionResult, ExportKeyType, INVALID_SIGNATURE, ItemResult, KeyConfigRequestDetail,
    KeyCreationRequestDetail, KeyExportDetail, RewrappingRequest, SignVerifyOptions, SigningInput,
    SigningRequest, SigningResult, TransitContext, VerificationRequest, VerificationResult,
};
