//! Exclusive connection scopes.
//!
//! A scope owns exactly one physical database session bound to one
//! (host, port, user, database) key. There is no pooling: DDL and GRANT
//! statements plus per-scope TLS material files are not safe to interleave
//! across pooled sessions, so a scope is a raw connection with idle reuse
//! disabled by construction.
//!
//! [`Scope::derive`] produces a fresh, unconnected scope sharing nothing
//! but the implementation, for statements that must run against another
//! database. Parent and derived scopes have independent lifetimes.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info};

use grantor_core::DialectKind;

use crate::error::EngineError;

/// Whether the statement text may be logged. Statements embedding password
/// material are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementLog {
    Enabled,
    Disabled,
}

/// Typed driver options for opening the session.
#[derive(Debug, Clone)]
pub enum SessionOptions {
    Postgres(PgConnectOptions),
    Mysql(MySqlConnectOptions),
}

/// Everything needed to open a scope.
///
/// `dsn` is the canonical connection string in the dialect's conventional
/// format; it identifies the scope in logs and test recordings. The
/// production session is opened from the equivalent typed `options`.
#[derive(Debug, Clone)]
pub struct ConnectSpec {
    pub dialect: DialectKind,
    pub dsn: String,
    pub options: SessionOptions,
}

/// One exclusive database session.
#[async_trait]
pub trait Scope: Send {
    /// A fresh, unconnected scope of the same implementation. The derived
    /// scope must be connected before use and closed by its owner.
    fn derive(&self) -> Box<dyn Scope>;

    /// Open the physical session. Called exactly once per scope.
    async fn connect(&mut self, spec: &ConnectSpec) -> Result<(), EngineError>;

    /// Execute one statement with positional arguments.
    async fn execute(
        &mut self,
        log: StatementLog,
        statement: &str,
        args: &[String],
    ) -> Result<(), EngineError>;

    /// Close the session. The scope cannot be reused afterwards.
    async fn close(&mut self) -> Result<(), EngineError>;
}

enum Session {
    Idle,
    Postgres(PgConnection),
    Mysql(MySqlConnection),
}

/// Production scope over a single `sqlx` connection.
pub struct SqlxScope {
    session: Session,
}

impl SqlxScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: Session::Idle,
        }
    }
}

impl Default for SqlxScope {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scope for SqlxScope {
    fn derive(&self) -> Box<dyn Scope> {
        Box::new(SqlxScope::new())
    }

    async fn connect(&mut self, spec: &ConnectSpec) -> Result<(), EngineError> {
        debug!(dialect = %spec.dialect, "opening scope");
        match &spec.options {
            SessionOptions::Postgres(options) => {
                let conn = options.connect().await.map_err(|e| {
                    EngineError::connect_with_source("failed to open postgres session", e)
                })?;
                self.session = Session::Postgres(conn);
            }
            SessionOptions::Mysql(options) => {
                let conn = options.connect().await.map_err(|e| {
                    EngineError::connect_with_source("failed to open mysql session", e)
                })?;
                self.session = Session::Mysql(conn);
            }
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        log: StatementLog,
        statement: &str,
        args: &[String],
    ) -> Result<(), EngineError> {
        match log {
            StatementLog::Enabled => {
                info!(statement = %statement, args = ?args, "executing statement");
            }
            StatementLog::Disabled => {
                info!("executing statement (text suppressed)");
            }
        }

        match &mut self.session {
            Session::Idle => Err(EngineError::NotConnected),
            Session::Postgres(conn) => {
                let mut query = sqlx::query(statement);
                for arg in args {
                    query = query.bind(arg.as_str());
                }
                query
                    .execute(&mut *conn)
                    .await
                    .map(|_| ())
                    .map_err(postgres_error)
            }
            Session::Mysql(conn) => {
                let mut query = sqlx::query(statement);
                for arg in args {
                    query = query.bind(arg.as_str());
                }
                query
                    .execute(&mut *conn)
                    .await
                    .map(|_| ())
                    .map_err(mysql_error)
            }
        }
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        match std::mem::replace(&mut self.session, Session::Idle) {
            Session::Idle => Ok(()),
            Session::Postgres(conn) => conn.close().await.map_err(|e| EngineError::Statement {
                code: None,
                message: format!("failed to close postgres session: {e}"),
            }),
            Session::Mysql(conn) => conn.close().await.map_err(|e| EngineError::Statement {
                code: None,
                message: format!("failed to close mysql session: {e}"),
            }),
        }
    }
}

/// Map a postgres execution error, preserving the SQLSTATE.
fn postgres_error(err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Database(db) => EngineError::Statement {
            code: db.code().map(|c| c.to_string()),
            message: db.to_string(),
        },
        other => EngineError::Statement {
            code: None,
            message: other.to_string(),
        },
    }
}

/// Map a mysql execution error, preserving the vendor error number.
fn mysql_error(err: sqlx::Error) -> EngineError {
    match err {
        sqlx::Error::Database(db) => {
            let code = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| e.number().to_string());
            EngineError::Statement {
                code,
                message: db.to_string(),
            }
        }
        other => EngineError::Statement {
            code: None,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_without_connect_reports_not_connected() {
        let mut scope = SqlxScope::new();
        let err = scope
            .execute(StatementLog::Enabled, "SELECT 1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotConnected));
    }

    #[tokio::test]
    async fn close_of_idle_scope_is_a_no_op() {
        let mut scope = SqlxScope::new();
        scope.close().await.unwrap();
    }

    #[test]
    fn derived_scope_starts_unconnected() {
        let scope = SqlxScope::new();
        let _derived = scope.derive();
    }
}
