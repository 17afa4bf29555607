//! Secret-store abstraction.
//!
//! The reconciliation core never talks to a secret backend directly; it
//! consumes this narrow capability: fetch a secret's decoded key/value data,
//! persist a generated secret, check existence, delete. Backends (Kubernetes
//! secrets, Vault, files) live with the embedding process.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemorySecretStore;

/// Decoded secret payload: string keys to string values.
pub type SecretData = BTreeMap<String, String>;

/// Errors returned by secret store operations.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The named secret does not exist.
    #[error("secret not found: '{name}'")]
    NotFound { name: String },

    /// The secret exists but does not carry the requested key. Kept
    /// distinct from [`SecretError::NotFound`] so callers can report a
    /// misconfigured reference precisely.
    #[error("key '{key}' not found in secret '{name}'")]
    FieldNotFound { name: String, key: String },

    /// The backend failed (network, auth, decode).
    #[error("secret provider error for '{name}': {detail}")]
    Provider {
        name: String,
        detail: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SecretError {
    pub fn not_found(name: impl Into<String>) -> Self {
        SecretError::NotFound { name: name.into() }
    }

    pub fn provider(name: impl Into<String>, detail: impl Into<String>) -> Self {
        SecretError::Provider {
            name: name.into(),
            detail: detail.into(),
            source: None,
        }
    }
}

/// Result type for secret store operations.
pub type SecretResult<T> = Result<T, SecretError>;

/// Narrow secret capability consumed by the engines and the reconciler.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the decoded data of a secret.
    async fn fetch(&self, name: &str) -> SecretResult<SecretData>;

    /// Persist a secret, overwriting any previous value.
    async fn save(&self, name: &str, data: SecretData) -> SecretResult<()>;

    /// Whether a secret with this name exists.
    async fn exists(&self, name: &str) -> SecretResult<bool>;

    /// Delete a secret. Deleting an absent secret is not an error.
    async fn delete(&self, name: &str) -> SecretResult<()>;

    /// Fetch a single key from a secret, distinguishing a missing secret
    /// from a missing key.
    async fn fetch_key(&self, name: &str, key: &str) -> SecretResult<String> {
        let data = self.fetch(name).await?;
        data.get(key)
            .cloned()
            .ok_or_else(|| SecretError::FieldNotFound {
                name: name.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_key_distinguishes_missing_secret_from_missing_key() {
        let store = MemorySecretStore::new();
        store
            .save("pg-admin", SecretData::from([("password".into(), "s3cr3t".into())]))
            .await
            .unwrap();

        assert_eq!(store.fetch_key("pg-admin", "password").await.unwrap(), "s3cr3t");

        let err = store.fetch_key("pg-admin", "passwrd").await.unwrap_err();
        assert!(matches!(err, SecretError::FieldNotFound { .. }));

        let err = store.fetch_key("absent", "password").await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound { .. }));
    }
}
