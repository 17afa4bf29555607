//! Engine construction seam.
//!
//! The reconciler builds one engine per (target, pass) through this trait,
//! so tests can run the real dialect engines over a recording fake scope.

use std::sync::Arc;

use async_trait::async_trait;

use grantor_core::DatabaseTarget;
use grantor_db::{resolve_engine, DatabaseEngine, EngineError};
use grantor_secrets::SecretStore;

/// Builds an unconnected engine for a target.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn engine(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseEngine>, EngineError>;
}

/// Production factory: resolves targets over real connections.
pub struct SqlEngineFactory {
    secrets: Arc<dyn SecretStore>,
}

impl SqlEngineFactory {
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl EngineFactory for SqlEngineFactory {
    async fn engine(&self, target: &DatabaseTarget) -> Result<Box<dyn DatabaseEngine>, EngineError> {
        resolve_engine(target, self.secrets.as_ref()).await
    }
}
