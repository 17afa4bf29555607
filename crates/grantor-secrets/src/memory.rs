//! In-memory secret store.
//!
//! Backs tests and single-process embeddings. All operations are infallible
//! apart from lookups of absent names.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{SecretData, SecretError, SecretResult, SecretStore};

/// Secret store holding everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: Arc<RwLock<BTreeMap<String, SecretData>>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a secret, for test setup.
    pub async fn insert(&self, name: impl Into<String>, data: SecretData) {
        self.secrets.write().await.insert(name.into(), data);
    }

    /// Names currently stored, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.secrets.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch(&self, name: &str) -> SecretResult<SecretData> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::not_found(name))
    }

    async fn save(&self, name: &str, data: SecretData) -> SecretResult<()> {
        self.secrets.write().await.insert(name.to_string(), data);
        Ok(())
    }

    async fn exists(&self, name: &str) -> SecretResult<bool> {
        Ok(self.secrets.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> SecretResult<()> {
        self.secrets.write().await.remove(name);
        Ok(())
    }
}
