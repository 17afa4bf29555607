//! Declarative record types.
//!
//! A [`ManagedUser`] names a database principal and the privilege sets it
//! holds on each [`DatabaseTarget`]. Targets carry everything needed to
//! reach the cluster with administrative credentials; secret material is
//! referenced by name and resolved through the secret store at
//! reconciliation time, never embedded.

use serde::{Deserialize, Serialize};

use crate::privilege::PrivilegeEntry;

/// Database dialects with an engine implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Mysql,
}

impl DialectKind {
    /// Driver identifier used in logs and scope keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
        }
    }

    /// Default server port for the dialect.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self {
            DialectKind::Postgres => 5432,
            DialectKind::Mysql => 3306,
        }
    }
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a single key inside a named secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    /// Secret name in the external store.
    pub secret: String,
    /// Key within the secret's data mapping.
    pub key: String,
}

impl SecretKeyRef {
    pub fn new(secret: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            key: key.into(),
        }
    }
}

/// SSL mode for PostgreSQL connections.
///
/// String forms match the libpq `sslmode` parameter. Modes from `require`
/// upward demand TLS material and trigger client-certificate issuance for
/// newly created users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PostgresSslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl PostgresSslMode {
    /// The libpq `sslmode` string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PostgresSslMode::Disable => "disable",
            PostgresSslMode::Allow => "allow",
            PostgresSslMode::Prefer => "prefer",
            PostgresSslMode::Require => "require",
            PostgresSslMode::VerifyCa => "verify-ca",
            PostgresSslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether this mode requires TLS material to connect.
    #[must_use]
    pub fn requires_tls_material(&self) -> bool {
        matches!(
            self,
            PostgresSslMode::Require | PostgresSslMode::VerifyCa | PostgresSslMode::VerifyFull
        )
    }
}

impl std::fmt::Display for PostgresSslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for a PostgreSQL target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresTarget {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Administrative user the engine connects as. Needs at least
    /// CREATEROLE.
    pub user: String,

    /// Database to connect to for role-scoped statements. Optional; the
    /// server default is used when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// SSL mode for the administrative connection. Unset means the server
    /// default; the mode is then omitted from the connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<PostgresSslMode>,

    /// Password for the administrative user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,

    /// Secret holding the TLS bundle (`ca.crt`, `tls.crt`, `tls.key`) for
    /// the administrative connection. Required by modes from `require`
    /// upward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,

    /// CA private key used to sign client certificates for newly created
    /// users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_key_secret: Option<SecretKeyRef>,
}

impl PostgresTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            database: None,
            ssl_mode: None,
            password_secret: None,
            tls_secret: None,
            ca_key_secret: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_ssl_mode(mut self, mode: PostgresSslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// Whether this target authenticates clients with certificates, so a
    /// credential bundle must be issued for newly created users.
    #[must_use]
    pub fn mutual_tls(&self) -> bool {
        self.ssl_mode.is_some_and(|m| m.requires_tls_material())
    }

    #[must_use]
    pub fn with_password_secret(mut self, secret: SecretKeyRef) -> Self {
        self.password_secret = Some(secret);
        self
    }

    pub fn with_tls_secret(mut self, secret: impl Into<String>) -> Self {
        self.tls_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_ca_key_secret(mut self, secret: SecretKeyRef) -> Self {
        self.ca_key_secret = Some(secret);
        self
    }
}

/// Connection settings for a MySQL target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysqlTarget {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Administrative user the engine connects as.
    pub user: String,

    /// Database to connect to. Optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Password for the administrative user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,

    /// Host part of created `'<user>'@'<host>'` accounts. Defaults to `*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_hostname: Option<String>,
}

impl MysqlTarget {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            database: None,
            password_secret: None,
            users_hostname: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_password_secret(mut self, secret: SecretKeyRef) -> Self {
        self.password_secret = Some(secret);
        self
    }

    pub fn with_users_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.users_hostname = Some(hostname.into());
        self
    }

    /// Host part for created accounts, `*` when unset.
    #[must_use]
    pub fn effective_users_hostname(&self) -> &str {
        self.users_hostname.as_deref().unwrap_or("*")
    }
}

/// Dialect-specific target configuration.
///
/// Closed variant set: adding a dialect adds a variant here and an engine
/// implementation, without touching callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dialect", rename_all = "lowercase")]
pub enum TargetConfig {
    Postgres(PostgresTarget),
    Mysql(MysqlTarget),
}

impl TargetConfig {
    /// The dialect this configuration belongs to.
    #[must_use]
    pub fn kind(&self) -> DialectKind {
        match self {
            TargetConfig::Postgres(_) => DialectKind::Postgres,
            TargetConfig::Mysql(_) => DialectKind::Mysql,
        }
    }
}

/// One database cluster a managed user is provisioned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    /// Target name, unique among the user's targets. Used in log context
    /// and in the default credential-secret name.
    pub name: String,

    /// Dialect-specific connection configuration.
    pub config: TargetConfig,
}

impl DatabaseTarget {
    pub fn new(name: impl Into<String>, config: TargetConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// A target together with the privilege set the user holds on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBinding {
    pub target: DatabaseTarget,

    /// Ordered privilege entries; applied and revoked strictly in this
    /// order.
    #[serde(default)]
    pub privileges: Vec<PrivilegeEntry>,
}

impl TargetBinding {
    pub fn new(target: DatabaseTarget, privileges: Vec<PrivilegeEntry>) -> Self {
        Self { target, privileges }
    }
}

/// Desired-state record for one database principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    /// Principal name created in every target.
    pub name: String,

    /// Password set for the principal at creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret: Option<SecretKeyRef>,

    /// Targets and per-target privilege sets, in declaration order.
    #[serde(default)]
    pub bindings: Vec<TargetBinding>,

    /// Name of the persisted credential-bundle secret, when one was
    /// generated. Unset means the default per-target name is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret: Option<String>,
}

impl ManagedUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password_secret: None,
            bindings: Vec::new(),
            credential_secret: None,
        }
    }

    #[must_use]
    pub fn with_password_secret(mut self, secret: SecretKeyRef) -> Self {
        self.password_secret = Some(secret);
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: TargetBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Name under which the credential bundle for `target` is persisted.
    #[must_use]
    pub fn credential_secret_name(&self, target: &str) -> String {
        match &self.credential_secret {
            Some(name) => name.clone(),
            None => format!("{}-{}-data", self.name, target),
        }
    }
}
