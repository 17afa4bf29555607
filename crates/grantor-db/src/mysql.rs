//! MySQL engine.
//!
//! Accounts are `'<user>'@'<host>'` pairs and every value is a positional
//! parameter. The object target of a privilege statement is rendered into
//! the statement itself (`?.?` / `?.*`), so all statements execute on the
//! primary scope; no derived scopes are needed.

use tracing::debug;

use grantor_core::{privilege, MysqlTarget, PrivilegeEntry, PrivilegeKind};
use grantor_pki::CredentialBundle;
use grantor_secrets::SecretStore;

use crate::config::MysqlConfig;
use crate::engine::DatabaseEngine;
use crate::error::EngineError;
use crate::scope::{Scope, StatementLog};
use crate::sql::{self, Verb};

/// Vendor error `ER_CANNOT_USER`: CREATE USER for an existing account.
const CANNOT_USER: &str = "1396";

/// Engine for MySQL targets.
pub struct MysqlEngine {
    scope: Box<dyn Scope>,
    config: MysqlConfig,
}

impl MysqlEngine {
    /// Resolve the target's secret references and build the engine over
    /// `scope`. Does not connect.
    pub async fn resolve(
        target: &MysqlTarget,
        secrets: &dyn SecretStore,
        scope: Box<dyn Scope>,
    ) -> Result<Self, EngineError> {
        let password = match &target.password_secret {
            Some(secret) => secrets.fetch_key(&secret.secret, &secret.key).await?,
            None => String::new(),
        };

        let config = MysqlConfig::new(&target.host, target.port, &target.user)
            .with_password(password)
            .with_database(target.database.clone().unwrap_or_default())
            .with_users_hostname(target.users_hostname.clone().unwrap_or_default());

        Ok(Self { scope, config })
    }

    async fn process(
        &mut self,
        username: &str,
        privileges: &[PrivilegeEntry],
        verb: Verb,
    ) -> Result<(), EngineError> {
        // Validate the whole list before the first statement executes.
        let scopes = privilege::classify_all(privileges)?;

        for (entry, scope) in privileges.iter().zip(scopes.iter()) {
            debug!(
                privilege = %entry.privilege,
                kind = ?PrivilegeKind::of(&entry.privilege),
                "routing privilege entry"
            );
            let (statement, args) =
                sql::mysql::privilege_statement(verb, username, &entry.privilege, scope);
            self.scope
                .execute(StatementLog::Enabled, &statement, &args)
                .await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabaseEngine for MysqlEngine {
    async fn connect(&mut self) -> Result<(), EngineError> {
        let spec = self.config.connect_spec();
        self.scope.connect(&spec).await
    }

    async fn create_user(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<CredentialBundle>, EngineError> {
        let (statement, args, log) =
            sql::mysql::create_user(username, self.config.effective_users_hostname(), password);
        match self.scope.execute(log, &statement, &args).await {
            // MySQL targets never issue credential bundles.
            Ok(()) => Ok(None),
            Err(e) if e.has_backend_code(CANNOT_USER) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_user(&mut self, username: &str) -> Result<(), EngineError> {
        // Unlike the PostgreSQL engine, a drop of an absent user is
        // propagated.
        let (statement, args) =
            sql::mysql::drop_user(username, self.config.effective_users_hostname());
        self.scope
            .execute(StatementLog::Enabled, &statement, &args)
            .await
    }

    async fn apply_privileges(
        &mut self,
        username: &str,
        privileges: &[PrivilegeEntry],
    ) -> Result<(), EngineError> {
        self.process(username, privileges, Verb::Grant).await
    }

    async fn revoke_privileges(
        &mut self,
        username: &str,
        privileges: &[PrivilegeEntry],
    ) -> Result<(), EngineError> {
        self.process(username, privileges, Verb::Revoke).await
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.scope.close().await
    }
}
