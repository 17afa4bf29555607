//! Apply and delete workflows.
//!
//! Per managed user, the apply workflow runs one worker per target:
//! resolve the engine → connect → create user → persist a returned
//! credential bundle (write-once) → apply privileges → close. The delete
//! workflow revokes before dropping on every target and removes the
//! persisted bundle. Workers for independent targets run concurrently; the
//! first failure aborts the remaining siblings and fails the pass.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use grantor_core::{ManagedUser, TargetBinding};
use grantor_pki::CredentialBundle;
use grantor_secrets::SecretStore;

use crate::error::ReconcileError;
use crate::factory::{EngineFactory, SqlEngineFactory};
use crate::status::StatusSink;

/// Lifecycle state of the managed object, as observed by its owner.
///
/// `Terminating` is entered when the object carries a deletion intent while
/// still holding its completion marker; the marker may be cleared only once
/// a terminating pass succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPhase {
    Active,
    Terminating,
}

/// Successful outcome of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every target was applied; readiness was raised.
    Applied,
    /// Every target was revoked and dropped; the caller may clear the
    /// completion marker and release the object.
    Deleted,
}

/// Reconciliation engine driving one managed user per invocation.
pub struct Reconciler {
    factory: Arc<dyn EngineFactory>,
    secrets: Arc<dyn SecretStore>,
    status: Arc<dyn StatusSink>,
}

impl Reconciler {
    /// Reconciler over real database connections.
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretStore>, status: Arc<dyn StatusSink>) -> Self {
        let factory = Arc::new(SqlEngineFactory::new(secrets.clone()));
        Self::with_factory(factory, secrets, status)
    }

    /// Reconciler with a custom engine factory.
    #[must_use]
    pub fn with_factory(
        factory: Arc<dyn EngineFactory>,
        secrets: Arc<dyn SecretStore>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            factory,
            secrets,
            status,
        }
    }

    /// Run one pass for `user`.
    ///
    /// At-least-once semantics: a failing pass reports not-ready and is
    /// expected to be retried wholesale by the caller. Two concurrent
    /// passes for the same user are not safe; the delivery mechanism must
    /// guarantee single-flight per object.
    pub async fn reconcile(
        &self,
        user: &ManagedUser,
        phase: UserPhase,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let result = match phase {
            UserPhase::Active => self.apply(user).await.map(|()| ReconcileOutcome::Applied),
            UserPhase::Terminating => self.delete(user).await.map(|()| ReconcileOutcome::Deleted),
        };

        match &result {
            Ok(ReconcileOutcome::Applied) => {
                info!(user = %user.name, "reconciled all targets");
                self.status.set_ready(&user.name, true, "").await;
            }
            Ok(ReconcileOutcome::Deleted) => {
                info!(user = %user.name, "deleted from all targets");
            }
            Err(e) => {
                self.status.set_ready(&user.name, false, &e.to_string()).await;
            }
        }
        result
    }

    async fn apply(&self, user: &ManagedUser) -> Result<(), ReconcileError> {
        let password = self.user_password(user).await?;

        let mut workers = JoinSet::new();
        for binding in user.bindings.clone() {
            let factory = self.factory.clone();
            let secrets = self.secrets.clone();
            let username = user.name.clone();
            let password = password.clone();
            let credential_secret = user.credential_secret_name(&binding.target.name);
            workers.spawn(async move {
                apply_binding(factory, secrets, username, password, credential_secret, binding)
                    .await
            });
        }
        drain(workers).await
    }

    async fn delete(&self, user: &ManagedUser) -> Result<(), ReconcileError> {
        let mut workers = JoinSet::new();
        for binding in user.bindings.clone() {
            let factory = self.factory.clone();
            let secrets = self.secrets.clone();
            let username = user.name.clone();
            let credential_secret = user.credential_secret_name(&binding.target.name);
            workers.spawn(async move {
                delete_binding(factory, secrets, username, credential_secret, binding).await
            });
        }
        drain(workers).await
    }

    async fn user_password(&self, user: &ManagedUser) -> Result<String, ReconcileError> {
        match &user.password_secret {
            Some(secret) => Ok(self.secrets.fetch_key(&secret.secret, &secret.key).await?),
            None => Ok(String::new()),
        }
    }
}

/// Join all workers, propagating the first failure and cancelling the
/// remaining siblings.
async fn drain(mut workers: JoinSet<Result<(), ReconcileError>>) -> Result<(), ReconcileError> {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                workers.abort_all();
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                workers.abort_all();
                return Err(ReconcileError::Worker {
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

async fn apply_binding(
    factory: Arc<dyn EngineFactory>,
    secrets: Arc<dyn SecretStore>,
    username: String,
    password: String,
    credential_secret: String,
    binding: TargetBinding,
) -> Result<(), ReconcileError> {
    info!(user = %username, target = %binding.target.name, "applying target");

    let mut engine = factory.engine(&binding.target).await?;
    engine.connect().await?;

    let applied = async {
        if let Some(bundle) = engine.create_user(&username, &password).await? {
            persist_bundle(secrets.as_ref(), &credential_secret, bundle).await?;
        }
        engine
            .apply_privileges(&username, &binding.privileges)
            .await?;
        Ok::<(), ReconcileError>(())
    }
    .await;

    // The scope is torn down even when the statement phase failed.
    let closed = engine.close().await.map_err(ReconcileError::from);
    applied.and(closed)
}

async fn delete_binding(
    factory: Arc<dyn EngineFactory>,
    secrets: Arc<dyn SecretStore>,
    username: String,
    credential_secret: String,
    binding: TargetBinding,
) -> Result<(), ReconcileError> {
    info!(user = %username, target = %binding.target.name, "deleting from target");

    let mut engine = factory.engine(&binding.target).await?;
    engine.connect().await?;

    let deleted = async {
        // Revoke strictly before drop: some engines refuse to drop a user
        // that still owns grants.
        engine
            .revoke_privileges(&username, &binding.privileges)
            .await?;
        engine.delete_user(&username).await?;
        Ok::<(), ReconcileError>(())
    }
    .await;

    let closed = engine.close().await.map_err(ReconcileError::from);
    deleted.and(closed)?;

    if secrets.exists(&credential_secret).await? {
        info!(secret = %credential_secret, "deleting persisted credential bundle");
        secrets.delete(&credential_secret).await?;
    }
    Ok(())
}

/// Persist a freshly issued bundle, write-once: an existing secret is left
/// untouched so a bundle is never regenerated over a live one.
async fn persist_bundle(
    secrets: &dyn SecretStore,
    name: &str,
    bundle: CredentialBundle,
) -> Result<(), ReconcileError> {
    if secrets.exists(name).await? {
        debug!(secret = %name, "credential bundle already persisted");
        return Ok(());
    }
    let fingerprint = bundle.fingerprint().unwrap_or_default();
    info!(secret = %name, fingerprint = %fingerprint, "persisting credential bundle");
    secrets.save(name, bundle.into_secret_data()).await?;
    Ok(())
}
