//! The uniform engine capability and its per-dialect dispatch.
//!
//! The dialect set is closed: [`resolve_engine`] matches the target's
//! tagged configuration once, resolves referenced secrets, and returns the
//! concrete engine behind the single [`DatabaseEngine`] surface. Adding a
//! dialect adds a variant and an implementation without touching callers.

use async_trait::async_trait;

use grantor_core::{DatabaseTarget, PrivilegeEntry, TargetConfig};
use grantor_pki::CredentialBundle;
use grantor_secrets::SecretStore;

use crate::error::EngineError;
use crate::mysql::MysqlEngine;
use crate::postgres::PostgresEngine;
use crate::scope::{Scope, SqlxScope};

/// Uniform capability of one database engine instance.
///
/// Lifecycle: unconnected → connected → closed, no way back. `connect` must
/// be called exactly once before any other operation; the engine does not
/// guard against misuse, and callers must serialize calls to one instance.
#[async_trait]
pub trait DatabaseEngine: Send {
    /// Open the primary scope.
    async fn connect(&mut self) -> Result<(), EngineError>;

    /// Create the user. Idempotent: the dialect's "already exists"
    /// condition is absorbed and reported as a non-creation. A credential
    /// bundle is returned only on a genuinely new creation on a target
    /// whose TLS mode requires mutual authentication.
    async fn create_user(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<CredentialBundle>, EngineError>;

    /// Drop the user. Idempotency on "does not exist" is dialect-specific:
    /// PostgreSQL absorbs it, MySQL propagates it.
    async fn delete_user(&mut self, username: &str) -> Result<(), EngineError>;

    /// Apply privilege entries strictly in input order. The whole list is
    /// validated before the first statement executes; the first failing
    /// entry aborts the rest.
    async fn apply_privileges(
        &mut self,
        username: &str,
        privileges: &[PrivilegeEntry],
    ) -> Result<(), EngineError>;

    /// Revoke privilege entries strictly in input order, same contract as
    /// [`DatabaseEngine::apply_privileges`].
    async fn revoke_privileges(
        &mut self,
        username: &str,
        privileges: &[PrivilegeEntry],
    ) -> Result<(), EngineError>;

    /// Release the primary scope and its TLS material.
    async fn close(&mut self) -> Result<(), EngineError>;
}

/// Resolve a target into its engine, fetching referenced secrets, over the
/// production scope.
pub async fn resolve_engine(
    target: &DatabaseTarget,
    secrets: &dyn SecretStore,
) -> Result<Box<dyn DatabaseEngine>, EngineError> {
    resolve_engine_with_scope(target, secrets, Box::new(SqlxScope::new())).await
}

/// Resolve a target into its engine over a caller-supplied scope.
///
/// This is how tests drive the real engines over a recording fake scope.
pub async fn resolve_engine_with_scope(
    target: &DatabaseTarget,
    secrets: &dyn SecretStore,
    scope: Box<dyn Scope>,
) -> Result<Box<dyn DatabaseEngine>, EngineError> {
    match &target.config {
        TargetConfig::Postgres(config) => Ok(Box::new(
            PostgresEngine::resolve(config, secrets, scope).await?,
        )),
        TargetConfig::Mysql(config) => Ok(Box::new(
            MysqlEngine::resolve(config, secrets, scope).await?,
        )),
    }
}
