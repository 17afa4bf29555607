//! Engine error taxonomy.
//!
//! Four classes matter to callers: connect failures (fatal to the unit of
//! work), validation failures (malformed privilege entries or misconfigured
//! targets, not retriable), statement failures carrying the backend's
//! error code (the engines absorb the idempotency-class codes and propagate
//! the rest), and secret/PKI failures surfaced from the collaborating
//! crates.

use thiserror::Error;

use grantor_core::PrivilegeError;
use grantor_pki::PkiError;
use grantor_secrets::SecretError;

/// Errors from scopes and database engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to open the physical connection.
    #[error("connect failed: {message}")]
    Connect {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A statement failed on the backend. `code` is the PostgreSQL SQLSTATE
    /// or the MySQL vendor error number, when the backend reported one.
    #[error("statement failed: {message}")]
    Statement {
        code: Option<String>,
        message: String,
    },

    /// An operation was attempted on a scope that is not connected.
    #[error("scope is not connected")]
    NotConnected,

    /// The target configuration is incomplete for the requested operation.
    #[error("invalid target configuration: {message}")]
    Configuration { message: String },

    /// A privilege entry matched none of the well-formed shapes.
    #[error("invalid privilege entry: {0}")]
    Validation(#[from] PrivilegeError),

    /// Failed to materialize or remove TLS material files.
    #[error("TLS material error: {message}")]
    TlsMaterial {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Pki(#[from] PkiError),
}

impl EngineError {
    pub fn connect(message: impl Into<String>) -> Self {
        EngineError::Connect {
            message: message.into(),
            source: None,
        }
    }

    pub fn connect_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngineError::Connect {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn statement(code: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Statement {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration {
            message: message.into(),
        }
    }

    pub fn tls_material(message: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::TlsMaterial {
            message: message.into(),
            source: Some(source),
        }
    }

    /// The backend error code, for statement failures that carried one.
    #[must_use]
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            EngineError::Statement { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a statement failure with the given backend code.
    #[must_use]
    pub fn has_backend_code(&self, code: &str) -> bool {
        self.backend_code() == Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_code_only_set_for_statement_failures() {
        let err = EngineError::statement("42710", "duplicate object");
        assert!(err.has_backend_code("42710"));
        assert!(!err.has_backend_code("42704"));

        assert_eq!(EngineError::connect("refused").backend_code(), None);
        assert_eq!(EngineError::NotConnected.backend_code(), None);
    }
}
