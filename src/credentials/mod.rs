//! Credential source selection
//!
//! Configuration names an ordered list of [`CredentialSource`]s. A
//! [`CredentialResolver`] walks that list and returns the first secret it
//! can find. Only the choice of source lives here; real key stores, SSM and
//! Vault backends are external and plug in through the trait.

mod secret;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::model::{ConfigModel, CredentialsConfig, DatabaseType};
use crate::error::{HegemonError, HegemonResult};

pub use secret::Secret;

/// Backend that may supply a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSource {
    Environment,
    File,
    KeyStore,
    ConfigFile,
    Ssm,
    Vault,
}

impl CredentialSource {
    /// Parse a `preferredSources` token
    pub fn parse(token: &str) -> HegemonResult<Self> {
        match token {
            "environment" => Ok(Self::Environment),
            "file" => Ok(Self::File),
            "keystore" => Ok(Self::KeyStore),
            "config" => Ok(Self::ConfigFile),
            "ssm" => Ok(Self::Ssm),
            "vault" => Ok(Self::Vault),
            other => Err(HegemonError::config(format!(
                "Invalid credential source: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::File => "file",
            Self::KeyStore => "keystore",
            Self::ConfigFile => "config",
            Self::Ssm => "ssm",
            Self::Vault => "vault",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a database password from an ordered list of sources
pub trait CredentialResolver {
    /// Return the first secret found, or `None` when no source has one
    fn resolve(
        &self,
        db_type: DatabaseType,
        username: &str,
        sources: &[CredentialSource],
    ) -> HegemonResult<Option<Secret>>;
}

/// Environment variable name for a password key:
/// `hegemon.postgres.admin.password` becomes `HEGEMON_POSTGRES_ADMIN_PASSWORD`
pub fn env_var_for_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolver for the sources this crate can read on its own
///
/// Handles `environment`, `config` and file-backed credential stores.
/// `keystore`, `ssm` and `vault` are skipped.
#[derive(Debug, Clone, Default)]
pub struct DefaultCredentialResolver {
    password_key: Option<String>,
    inline_password: Option<Secret>,
    store_file: Option<PathBuf>,
}

impl DefaultCredentialResolver {
    pub fn from_config(config: &ConfigModel) -> Self {
        let store = &config.security.credential_store;
        let store_file = if store.enabled && store.store_type == "file" {
            store.path.clone()
        } else {
            None
        };

        Self {
            password_key: Some(config.database.credentials.password_key.clone()),
            inline_password: config.database.password.clone(),
            store_file,
        }
    }

    fn key_for(&self, db_type: DatabaseType, username: &str) -> String {
        self.password_key
            .clone()
            .unwrap_or_else(|| CredentialsConfig::default_password_key(db_type, username))
    }

    fn from_environment(&self, key: &str) -> Option<Secret> {
        let var = env_var_for_key(key);
        std::env::var(&var).ok().map(Secret::from)
    }

    fn from_store_file(&self, key: &str) -> Option<Secret> {
        let path = self.store_file.as_ref()?;
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read credential file");
                return None;
            }
        };
        let entries: BTreeMap<String, String> = match serde_json::from_str(&contents) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse credential file");
                return None;
            }
        };
        entries.get(key).map(|v| Secret::new(v.as_str()))
    }
}

impl CredentialResolver for DefaultCredentialResolver {
    fn resolve(
        &self,
        db_type: DatabaseType,
        username: &str,
        sources: &[CredentialSource],
    ) -> HegemonResult<Option<Secret>> {
        const DEFAULT_ORDER: [CredentialSource; 2] =
            [CredentialSource::Environment, CredentialSource::ConfigFile];

        let order = if sources.is_empty() {
            &DEFAULT_ORDER[..]
        } else {
            sources
        };
        let key = self.key_for(db_type, username);

        for source in order {
            let found = match source {
                CredentialSource::Environment => self.from_environment(&key),
                CredentialSource::ConfigFile => self.inline_password.clone(),
                CredentialSource::File => self.from_store_file(&key),
                CredentialSource::KeyStore | CredentialSource::Ssm | CredentialSource::Vault => {
                    debug!(source = %source, "Credential source not available, skipping");
                    None
                }
            };
            match found {
                Some(secret) if secret.is_empty() => {
                    debug!(source = %source, "Empty password from credential source, skipping");
                }
                Some(secret) => {
                    debug!(source = %source, key = %key, "Resolved database password");
                    return Ok(Some(secret));
                }
                None => {}
            }
        }

        Ok(None)
    }
}
