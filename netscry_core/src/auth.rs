//! Provider credential resolution.
//!
//! Credentials come from a YAML mapping of provider name to an ordered list
//! of secrets:
//!
//! ```yaml
//! shodan: [SHODAN_TOKEN]
//! google: [API_KEY, SEARCH_ENGINE_ID]
//! ```
//!
//! Each provider declares the field names it needs (see
//! [`crate::Provider::credential_fields`]); resolution fails naming the
//! first missing field, and the engine never issues a request for a
//! provider that failed to resolve.

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Ordered secret values for one provider, validated against its declared
/// field list.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    secrets: Vec<String>,
}

impl Credential {
    pub fn new(secrets: Vec<String>) -> Self {
        Self { secrets }
    }

    /// The secret at field position `idx`. Positions were validated at
    /// resolve time, so adapters index with confidence.
    pub fn secret(&self, idx: usize) -> &str {
        self.secrets.get(idx).map(String::as_str).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// Read-only store mapping provider names to their configured secrets.
///
/// Built once at run start and never mutated; the engine reads it without
/// locking.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<String, Vec<String>>,
}

impl CredentialStore {
    /// An empty store. Only arity-0 providers resolve against it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(entries: HashMap<String, Vec<String>>) -> Self {
        Self { entries }
    }

    /// Parse the `provider: [secret, ...]` YAML mapping.
    pub fn from_yaml(source: &str) -> Result<Self> {
        let entries: HashMap<String, Vec<String>> = serde_yaml::from_str(source)?;
        Ok(Self { entries })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&source)
    }

    /// Default provider-config location under the user config dir,
    /// `~/.config/netscry/provider-config.yaml` on Unix.
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("netscry").join("provider-config.yaml")
    }

    /// Resolve all of `fields` for `provider`, in order.
    ///
    /// Each field is taken from the config entry at the matching position,
    /// falling back to the `NETSCRY_<PROVIDER>_<FIELD>` environment
    /// variable. The first field that resolves to nothing (or to an empty
    /// string) fails the whole lookup, naming that field.
    pub fn resolve(
        &self,
        provider: &'static str,
        fields: &'static [&'static str],
    ) -> Result<Credential> {
        let configured = self.entries.get(provider);
        let mut secrets = Vec::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            let value = configured
                .and_then(|list| list.get(idx))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .or_else(|| std::env::var(env_key(provider, field)).ok())
                .filter(|s| !s.is_empty());
            match value {
                Some(v) => secrets.push(v),
                None => return Err(EngineError::Credential { provider, field }),
            }
        }
        Ok(Credential::new(secrets))
    }

    /// Whether `provider` would resolve without error. Used when expanding
    /// an unscoped query to "all providers with satisfied credentials".
    pub fn satisfies(&self, provider: &'static str, fields: &'static [&'static str]) -> bool {
        self.resolve(provider, fields).is_ok()
    }
}

fn env_key(provider: &str, field: &str) -> String {
    format!(
        "NETSCRY_{}_{}",
        provider.replace('-', "_").to_ascii_uppercase(),
        field.to_ascii_uppercase()
    )
}
