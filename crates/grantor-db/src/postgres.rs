//! PostgreSQL engine.
//!
//! Role-scoped statements run on the primary scope. Database- and
//! object-scoped privilege statements run on a scope derived from the
//! primary transport configuration, reconnected against the entry's
//! database and closed again. One derived scope per entry, opened and
//! closed sequentially, so an engine instance never runs two sessions at
//! once.

use tokio::sync::oneshot;
use tracing::debug;

use grantor_core::{privilege, PostgresTarget, PrivilegeEntry, PrivilegeKind, PrivilegeScope};
use grantor_pki::{issue_client_certificate, CredentialBundle};
use grantor_secrets::SecretStore;

use crate::config::PostgresConfig;
use crate::engine::DatabaseEngine;
use crate::error::EngineError;
use crate::scope::{Scope, StatementLog};
use crate::sql::{self, Verb};

/// SQLSTATE for `duplicate_object`: the user already exists.
const ALREADY_EXISTS: &str = "42710";
/// SQLSTATE for `undefined_object`: the user does not exist.
const UNDEFINED_OBJECT: &str = "42704";

/// Engine for PostgreSQL targets.
pub struct PostgresEngine {
    scope: Box<dyn Scope>,
    config: PostgresConfig,
    cleanup: Option<oneshot::Sender<()>>,
}

impl PostgresEngine {
    /// Resolve the target's secret references and build the engine over
    /// `scope`. Does not connect.
    pub async fn resolve(
        target: &PostgresTarget,
        secrets: &dyn SecretStore,
        scope: Box<dyn Scope>,
    ) -> Result<Self, EngineError> {
        let password = match &target.password_secret {
            Some(secret) => secrets.fetch_key(&secret.secret, &secret.key).await?,
            None => String::new(),
        };

        let mut config = PostgresConfig::new(&target.host, target.port, &target.user)
            .with_password(password)
            .with_database(target.database.clone().unwrap_or_default());
        if let Some(mode) = target.ssl_mode {
            config = config.with_ssl_mode(mode);
        }

        if target.mutual_tls() {
            let tls_secret = target.tls_secret.as_deref().ok_or_else(|| {
                EngineError::configuration(
                    "ssl mode requires TLS material but no tls secret is referenced",
                )
            })?;
            let tls = secrets.fetch(tls_secret).await?;

            let ca_key_ref = target.ca_key_secret.as_ref().ok_or_else(|| {
                EngineError::configuration(
                    "ssl mode requires client certificates but no CA key secret is referenced",
                )
            })?;
            let ca_key = secrets.fetch_key(&ca_key_ref.secret, &ca_key_ref.key).await?;

            config = config.with_tls_material(
                tls.get(grantor_pki::CA_CERTIFICATE_KEY).cloned().unwrap_or_default(),
                tls.get(grantor_pki::CERTIFICATE_KEY).cloned().unwrap_or_default(),
                tls.get(grantor_pki::PRIVATE_KEY_KEY).cloned().unwrap_or_default(),
                ca_key,
            );
        }

        Ok(Self::with_scope(scope, config))
    }

    pub(crate) fn with_scope(scope: Box<dyn Scope>, config: PostgresConfig) -> Self {
        Self {
            scope,
            config,
            cleanup: None,
        }
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
            match scope {
                PrivilegeScope::Role => {
                    let statement = sql::postgres::privilege_statement(
                        verb,
                        username,
                        &entry.privilege,
                        scope,
                    );
                    self.scope
                        .execute(StatementLog::Enabled, &statement, &[])
                        .await?;
                }
                PrivilegeScope::Database { database }
                | PrivilegeScope::Object { database, .. } => {
                    self.privilege_in_database(verb, username, &entry.privilege, scope, database)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Execute one privilege statement on a derived scope reconnected
    /// against `database`. The derived scope is closed before returning,
    /// also on failure.
    async fn privilege_in_database(
        &mut self,
        verb: Verb,
        username: &str,
        privilege: &str,
        scope: &PrivilegeScope<'_>,
        database: &str,
    ) -> Result<(), EngineError> {
        let config = self.config.copy_for_database(database);
        let mut derived = PostgresEngine::with_scope(self.scope.derive(), config);
        derived.connect().await?;

        let statement = sql::postgres::privilege_statement(verb, username, privilege, scope);
        let executed = derived
            .scope
            .execute(StatementLog::Enabled, &statement, &[])
            .await;
        let closed = derived.close().await;
        executed.and(closed)
    }
}

#[async_trait::async_trait]
impl DatabaseEngine for PostgresEngine {
    async fn connect(&mut self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let spec = self.config.connect_spec(rx)?;
        self.cleanup = Some(tx);
        self.scope.connect(&spec).await
    }

    async fn create_user(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<CredentialBundle>, EngineError> {
        let (statement, log) = sql::postgres::create_user(username, password);
        match self.scope.execute(log, &statement, &[]).await {
            Ok(()) => {
                if self.config.create_certificates() {
                    let bundle = issue_client_certificate(
                        username,
                        &self.config.ssl_ca_key,
                        &self.config.ssl_ca_cert,
                    )?;
                    Ok(Some(bundle))
                } else {
                    Ok(None)
                }
            }
            Err(e) if e.has_backend_code(ALREADY_EXISTS) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_user(&mut self, username: &str) -> Result<(), EngineError> {
        let statement = sql::postgres::drop_user(username);
        match self
            .scope
            .execute(StatementLog::Enabled, &statement, &[])
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.has_backend_code(UNDEFINED_OBJECT) => Ok(()),
            Err(e) => Err(e),
        }
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
        if let Some(cleanup) = self.cleanup.take() {
            let _ = cleanup.send(());
        }
        self.scope.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeScope;
    use grantor_core::{PostgresSslMode, SecretKeyRef};
    use grantor_secrets::{MemorySecretStore, SecretData};

    fn plain_target() -> PostgresTarget {
        PostgresTarget::new("test-postgres", 5432, "test-user")
            .with_password_secret(SecretKeyRef::new("pg-admin", "pass"))
    }

    async fn store_with_password() -> MemorySecretStore {
        let store = MemorySecretStore::new();
        store
            .insert(
                "pg-admin",
                SecretData::from([("pass".to_string(), "mysupersecretpass".to_string())]),
            )
            .await;
        store
    }

    async fn engine_over(
        target: &PostgresTarget,
        store: &MemorySecretStore,
        fake: &FakeScope,
    ) -> PostgresEngine {
        PostgresEngine::resolve(target, store, Box::new(fake.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_user_with_password_emits_the_exact_statement() {
        let fake = FakeScope::new();
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;

        engine.connect().await.unwrap();
        let bundle = engine.create_user("alice", "s3cr3t").await.unwrap();
        assert!(bundle.is_none());

        assert_eq!(
            fake.statement_texts(),
            vec!["CREATE USER \"alice\" WITH PASSWORD 's3cr3t'"]
        );
        assert_eq!(
            fake.connections(),
            vec!["host=test-postgres user=test-user port=5432 password=mysupersecretpass"]
        );
    }

    #[tokio::test]
    async fn create_user_absorbs_already_exists() {
        let fake = FakeScope::new();
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        engine.create_user("alice", "s3cr3t").await.unwrap();
        fake.fail_statements_matching("CREATE USER", ALREADY_EXISTS);
        let bundle = engine.create_user("alice", "s3cr3t").await.unwrap();
        assert!(bundle.is_none());
    }

    #[tokio::test]
    async fn create_user_propagates_other_backend_errors() {
        let fake = FakeScope::new();
        fake.fail_statements_matching("CREATE USER", "42501");
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        let err = engine.create_user("alice", "s3cr3t").await.unwrap_err();
        assert!(err.has_backend_code("42501"));
    }

    #[tokio::test]
    async fn delete_user_absorbs_does_not_exist() {
        let fake = FakeScope::new();
        fake.fail_statements_matching("DROP USER", UNDEFINED_OBJECT);
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        engine.delete_user("alice").await.unwrap();
    }

    #[tokio::test]
    async fn mutual_tls_create_returns_a_verifiable_bundle() {
        let (ca_cert, ca_key) = grantor_pki::generate_ca("test CA").unwrap();
        let store = MemorySecretStore::new();
        store
            .insert(
                "pg-tls",
                SecretData::from([
                    ("ca.crt".to_string(), ca_cert.clone()),
                    ("tls.crt".to_string(), "ADMIN CERT".to_string()),
                    ("tls.key".to_string(), "ADMIN KEY".to_string()),
                ]),
            )
            .await;
        store
            .insert(
                "pg-ca-key",
                SecretData::from([("ca.key".to_string(), ca_key)]),
            )
            .await;

        let target = PostgresTarget::new("tls-postgres", 5432, "postgres")
            .with_database("app")
            .with_ssl_mode(PostgresSslMode::VerifyFull)
            .with_tls_secret("pg-tls")
            .with_ca_key_secret(SecretKeyRef::new("pg-ca-key", "ca.key"));

        let fake = FakeScope::new();
        let mut engine = engine_over(&target, &store, &fake).await;
        engine.connect().await.unwrap();

        let bundle = engine.create_user("alice", "").await.unwrap().unwrap();
        grantor_pki::verify_client_certificate(&bundle.certificate, &ca_cert).unwrap();
        assert_eq!(bundle.ca_certificate, ca_cert);

        assert_eq!(fake.statement_texts(), vec!["CREATE USER \"alice\""]);
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn privileges_route_to_primary_and_derived_scopes() {
        let fake = FakeScope::new();
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        let privileges = vec![
            PrivilegeEntry::object("SELECT", "d", "t"),
            PrivilegeEntry::database("CONNECT", "d"),
            PrivilegeEntry::role("reader"),
        ];
        engine.apply_privileges("alice", &privileges).await.unwrap();

        assert_eq!(
            fake.statement_texts(),
            vec![
                "GRANT SELECT ON \"t\" TO \"alice\"",
                "GRANT CONNECT ON DATABASE \"d\" TO \"alice\"",
                "GRANT reader TO \"alice\"",
            ]
        );
        // Primary connection plus one derived connection per database- or
        // object-scoped entry, reconnected against the entry's database.
        assert_eq!(
            fake.connections(),
            vec![
                "host=test-postgres user=test-user port=5432 password=mysupersecretpass",
                "host=test-postgres user=test-user port=5432 dbname=d password=mysupersecretpass",
                "host=test-postgres user=test-user port=5432 dbname=d password=mysupersecretpass",
            ]
        );
        // Each derived scope was closed again.
        assert_eq!(fake.closes(), 2);
    }

    #[tokio::test]
    async fn malformed_entry_fails_before_any_statement() {
        let fake = FakeScope::new();
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        let privileges = vec![
            PrivilegeEntry::role("reader"),
            PrivilegeEntry {
                privilege: "SELECT".to_string(),
                on: Some("t".to_string()),
                database: None,
            },
        ];
        let err = engine
            .apply_privileges("alice", &privileges)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(fake.statements().is_empty());
    }

    #[tokio::test]
    async fn empty_privilege_list_emits_no_statements() {
        let fake = FakeScope::new();
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        engine.apply_privileges("alice", &[]).await.unwrap();
        engine.revoke_privileges("alice", &[]).await.unwrap();
        assert!(fake.statements().is_empty());
    }

    #[tokio::test]
    async fn revoke_then_apply_round_trips_the_statement_sequence() {
        let store = store_with_password().await;
        let privileges = vec![
            PrivilegeEntry::object("SELECT", "d", "t"),
            PrivilegeEntry::database("CONNECT", "d"),
            PrivilegeEntry::role("reader"),
        ];

        let granted = FakeScope::new();
        let mut engine = engine_over(&plain_target(), &store, &granted).await;
        engine.connect().await.unwrap();
        engine.apply_privileges("alice", &privileges).await.unwrap();

        let cycled = FakeScope::new();
        let mut engine = engine_over(&plain_target(), &store, &cycled).await;
        engine.connect().await.unwrap();
        engine
            .revoke_privileges("alice", &privileges)
            .await
            .unwrap();
        engine.apply_privileges("alice", &privileges).await.unwrap();

        let texts = cycled.statement_texts();
        assert_eq!(&texts[3..], granted.statement_texts().as_slice());
        assert!(texts[..3].iter().all(|s| s.starts_with("REVOKE")));
    }

    #[tokio::test]
    async fn first_failing_entry_aborts_the_remaining_list() {
        let fake = FakeScope::new();
        fake.fail_statements_matching("ON DATABASE", "42501");
        let store = store_with_password().await;
        let mut engine = engine_over(&plain_target(), &store, &fake).await;
        engine.connect().await.unwrap();

        let privileges = vec![
            PrivilegeEntry::role("reader"),
            PrivilegeEntry::database("CONNECT", "d"),
            PrivilegeEntry::role("writer"),
        ];
        let err = engine
            .apply_privileges("alice", &privileges)
            .await
            .unwrap_err();
        assert!(err.has_backend_code("42501"));
        assert_eq!(fake.statement_texts(), vec!["GRANT reader TO \"alice\""]);
    }
}
