//! Resolved connection configuration per dialect.
//!
//! A config carries everything needed to open the primary scope, with
//! secret references already resolved to values. The PostgreSQL config also
//! owns the TLS material lifecycle: PEM material is written to
//! per-(host, database, user) files immediately before connecting, and a
//! one-shot cleanup task removes all three files when the scope is torn
//! down, whether or not the statement phase succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use tokio::sync::oneshot;
use tracing::debug;

use grantor_core::{DialectKind, PostgresSslMode};

use crate::error::EngineError;
use crate::scope::{ConnectSpec, SessionOptions};

/// Resolved configuration for a PostgreSQL scope.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Empty means no password in the connection string.
    pub password: String,
    /// Empty means the server default database.
    pub database: String,
    pub ssl_mode: Option<PostgresSslMode>,
    /// PEM material; empty strings mean absent.
    pub ssl_ca_cert: String,
    pub ssl_user_cert: String,
    pub ssl_user_key: String,
    /// CA private key used to sign client certificates for new users.
    pub(crate) ssl_ca_key: String,

    create_certificates: bool,
}

/// File locations for one scope's TLS material.
#[derive(Debug, Clone)]
pub(crate) struct TlsPaths {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl PostgresConfig {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: String::new(),
            database: String::new(),
            ssl_mode: None,
            ssl_ca_cert: String::new(),
            ssl_user_cert: String::new(),
            ssl_user_key: String::new(),
            ssl_ca_key: String::new(),
            create_certificates: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn with_ssl_mode(mut self, mode: PostgresSslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// Attach TLS material: CA certificate, user certificate/key for the
    /// administrative connection, and the CA private key for issuing client
    /// certificates. Empty strings mean absent.
    pub fn with_tls_material(
        mut self,
        ca_cert: impl Into<String>,
        user_cert: impl Into<String>,
        user_key: impl Into<String>,
        ca_key: impl Into<String>,
    ) -> Self {
        self.ssl_ca_cert = ca_cert.into();
        self.ssl_user_cert = user_cert.into();
        self.ssl_user_key = user_key.into();
        self.ssl_ca_key = ca_key.into();
        self
    }

    /// Whether this scope authenticates with a client certificate, in which
    /// case newly created users need an issued credential bundle. Valid
    /// after [`PostgresConfig::connect_spec`] has run.
    #[must_use]
    pub fn create_certificates(&self) -> bool {
        self.create_certificates
    }

    /// Same transport configuration, reconnected against another database.
    #[must_use]
    pub(crate) fn copy_for_database(&self, database: &str) -> Self {
        let mut copy = self.clone();
        copy.database = database.to_string();
        copy
    }

    pub(crate) fn tls_paths(&self) -> TlsPaths {
        let dir = std::env::temp_dir().join("postgres-certs").join(&self.host);
        let stem = format!("{}_{}", self.database, self.user);
        TlsPaths {
            ca: dir.join(format!("{stem}.ca")),
            cert: dir.join(format!("{stem}.crt")),
            key: dir.join(format!("{stem}.key")),
        }
    }

    /// Canonical connection string: `host=` `user=` `port=` then
    /// `sslmode=`, `dbname=`, `password=`, `sslrootcert=`, `sslcert=`,
    /// `sslkey=`, each present only when the corresponding value is
    /// non-empty.
    pub(crate) fn render_dsn(&self, paths: &TlsPaths) -> String {
        let mut parts = vec![
            format!("host={}", self.host),
            format!("user={}", self.user),
            format!("port={}", self.port),
        ];

        if let Some(mode) = self.ssl_mode {
            parts.push(format!("sslmode={mode}"));
        }
        if !self.database.is_empty() {
            parts.push(format!("dbname={}", self.database));
        }
        if !self.password.is_empty() {
            parts.push(format!("password={}", self.password));
        }
        if !self.ssl_ca_cert.is_empty() {
            parts.push(format!("sslrootcert={}", paths.ca.display()));
        }
        if !self.ssl_user_cert.is_empty() {
            parts.push(format!("sslcert={}", paths.cert.display()));
        }
        if !self.ssl_user_key.is_empty() {
            parts.push(format!("sslkey={}", paths.key.display()));
        }

        parts.join(" ")
    }

    /// Materialize TLS files, arm their cleanup, and build the connect
    /// spec.
    ///
    /// The cleanup task deletes all three files as soon as `cleanup`
    /// resolves, whether the scope owner signalled teardown or the sender
    /// was dropped, so the files never outlive the scope.
    pub(crate) fn connect_spec(
        &mut self,
        cleanup: oneshot::Receiver<()>,
    ) -> Result<ConnectSpec, EngineError> {
        let paths = self.tls_paths();
        let mut any_material = false;

        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user);

        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if !self.database.is_empty() {
            options = options.database(&self.database);
        }
        if let Some(mode) = self.ssl_mode {
            options = options.ssl_mode(pg_ssl_mode(mode));
        }

        if !self.ssl_ca_cert.is_empty() {
            write_material(&paths.ca, &self.ssl_ca_cert)?;
            any_material = true;
            options = options.ssl_root_cert(&paths.ca);
        }
        if !self.ssl_user_cert.is_empty() {
            write_material(&paths.cert, &self.ssl_user_cert)?;
            any_material = true;
            self.create_certificates = true;
            options = options.ssl_client_cert(&paths.cert);
        }
        if !self.ssl_user_key.is_empty() {
            write_material(&paths.key, &self.ssl_user_key)?;
            any_material = true;
            self.create_certificates = true;
            options = options.ssl_client_key(&paths.key);
        }

        if any_material {
            let to_remove = paths.clone();
            tokio::spawn(async move {
                let _ = cleanup.await;
                for path in [&to_remove.ca, &to_remove.cert, &to_remove.key] {
                    if let Err(e) = fs::remove_file(path) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            debug!(path = %path.display(), error = %e, "failed to remove TLS material");
                        }
                    }
                }
            });
        }

        Ok(ConnectSpec {
            dialect: DialectKind::Postgres,
            dsn: self.render_dsn(&paths),
            options: SessionOptions::Postgres(options),
        })
    }
}

fn pg_ssl_mode(mode: PostgresSslMode) -> PgSslMode {
    match mode {
        PostgresSslMode::Disable => PgSslMode::Disable,
        PostgresSslMode::Allow => PgSslMode::Allow,
        PostgresSslMode::Prefer => PgSslMode::Prefer,
        PostgresSslMode::Require => PgSslMode::Require,
        PostgresSslMode::VerifyCa => PgSslMode::VerifyCa,
        PostgresSslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn write_material(path: &Path, data: &str) -> Result<(), EngineError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            EngineError::tls_material(format!("failed to create {}", dir.display()), e)
        })?;
    }
    fs::write(path, data).map_err(|e| {
        EngineError::tls_material(format!("failed to write {}", path.display()), e)
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            EngineError::tls_material(format!("failed to chmod {}", path.display()), e)
        })?;
    }

    Ok(())
}

/// Resolved configuration for a MySQL scope.
#[derive(Debug, Clone)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Empty means no password in the connection string.
    pub password: String,
    /// Empty means no default database.
    pub database: String,
    /// Host part of created accounts; empty means `*`.
    pub users_hostname: String,
}

impl MysqlConfig {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: String::new(),
            database: String::new(),
            users_hostname: String::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_users_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.users_hostname = hostname.into();
        self
    }

    /// Host part for created accounts, `*` when unset.
    #[must_use]
    pub fn effective_users_hostname(&self) -> &str {
        if self.users_hostname.is_empty() {
            "*"
        } else {
            &self.users_hostname
        }
    }

    /// Canonical connection string:
    /// `<user>:<password>@tcp(<host>:<port>)/<dbname>?interpolateParams=true`,
    /// with the auth part elided when empty.
    #[must_use]
    pub fn render_dsn(&self) -> String {
        let auth = if self.user.is_empty() && self.password.is_empty() {
            String::new()
        } else if self.password.is_empty() {
            format!("{}@", self.user)
        } else {
            format!("{}:{}@", self.user, self.password)
        };

        format!(
            "{auth}tcp({}:{})/{}?interpolateParams=true",
            self.host, self.port, self.database
        )
    }

    pub(crate) fn connect_spec(&self) -> ConnectSpec {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user);

        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if !self.database.is_empty() {
            options = options.database(&self.database);
        }

        ConnectSpec {
            dialect: DialectKind::Mysql,
            dsn: self.render_dsn(),
            options: SessionOptions::Mysql(options),
        }
    }
}
