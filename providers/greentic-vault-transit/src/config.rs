use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use greentic_transit::TransitKeyConfig;
use reqwest::Client;

const DEFAULT_TRANSIT_MOUNT: &str = "transit";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Connection settings for one Vault transit mount.
#[derive(Clone, Debug)]
pub struct VaultTransitConfig {
    pub addr: String,
    pub token: String,
    pub namespace: Option<String>,
    pub transit_mount: String,
    pub timeout: Duration,
    pub ca_bundle: Option<Vec<u8>>,
    pub insecure_skip_tls: bool,
    pub key_configs: HashMap<String, TransitKeyConfig>,
}

impl VaultTransitConfig {
    /// Settings for `addr` with every optional knob at its default.
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            namespace: None,
            transit_mount: DEFAULT_TRANSIT_MOUNT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ca_bundle: None,
            insecure_skip_tls: false,
            key_configs: HashMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.transit_mount = mount.into();
        self
    }

    pub fn with_key_config(mut self, alias: impl Into<String>, config: TransitKeyConfig) -> Self {
        self.key_configs.insert(alias.into(), config);
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from `lookup`, which resolves `VAULT_*`
    /// variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let addr = lookup("VAULT_ADDR").context("set VAULT_ADDR to the Vault server URL")?;
        let token = lookup("VAULT_TOKEN").context("set VAULT_TOKEN for Vault authentication")?;
        let namespace = lookup("VAULT_NAMESPACE").filter(|value| !value.is_empty());
        let transit_mount =
            lookup("VAULT_TRANSIT_MOUNT").unwrap_or_else(|| DEFAULT_TRANSIT_MOUNT.to_string());
        let timeout = lookup("VAULT_HTTP_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let ca_bundle = lookup("VAULT_CA_BUNDLE")
            .map(|path| fs::read(path).context("failed to read VAULT_CA_BUNDLE"))
            .transpose()?;
        let insecure_skip_tls = lookup("VAULT_INSECURE_SKIP_TLS")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);
        let key_configs = lookup("VAULT_TRANSIT_KEY_CONFIG")
            .map(load_key_configs)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            addr,
            token,
            namespace,
            transit_mount,
            timeout,
            ca_bundle,
            insecure_skip_tls,
            key_configs,
        })
    }

    pub fn build_http_client(&self) -> Result<Client> {
        let mut builder = Client::builder().use_rustls_tls().timeout(self.timeout);
        if let Some(ca) = self.ca_bundle.as_ref() {
            let cert = reqwest::Certificate::from_pem(ca)
                .or_else(|_| reqwest::Certificate::from_der(ca))
                .context("failed to parse VAULT_CA_BUNDLE")?;
            builder = builder.add_root_certificate(cert);
        }
        if self.insecure_skip_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build().context("failed to build Vault HTTP client")
    }
}

/// Read a JSON object mapping key aliases to their static configuration.
pub fn load_key_configs(path: impl AsRef<Path>) -> Result<HashMap<String, TransitKeyConfig>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read key config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse key config {}", path.display()))
}
