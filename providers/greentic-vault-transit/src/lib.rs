//! HashiCorp Vault transit provider for [`greentic_transit`].
//!
//! Talks to a live Vault server over its HTTP API using the async reqwest
//! client. Configuration comes from the usual `VAULT_*` environment
//! variables; static per-key settings can be supplied as a JSON file through
//! `VAULT_TRANSIT_KEY_CONFIG`.

use std::sync::Arc;

use anyhow::Result;
use greentic_transit::TransitManager;
use tracing::info;

mod auth;
mod config;
mod transport;

pub use auth::StaticTokenProvider;
pub use config::{VaultTransitConfig, load_key_configs};
pub use transport::VaultHttpTransport;

/// Construct a transit manager from environment configuration.
pub fn build_manager() -> Result<TransitManager> {
    build_manager_with(VaultTransitConfig::from_env()?)
}

pub fn build_manager_with(config: VaultTransitConfig) -> Result<TransitManager> {
    let client = config.build_http_client()?;
    let transport = VaultHttpTransport::new(&config, client)?;
    info!(
        addr = %config.addr,
        mount = %config.transit_mount,
        configured_keys = config.key_configs.len(),
        "vault transit provider ready"
    );
    Ok(
        TransitManager::new(
            Arc::new(transport),
            Arc::new(StaticTokenProvider::new(config.token)),
        )
        .with_key_configs(Arc::new(config.key_configs)),
    )
}
