//! Reconciliation errors.
//!
//! The reconciler performs no partial recovery: every error fails the pass
//! as a whole and is reported through the status channel. Engine and secret
//! errors pass through unmodified so their classification survives.

use thiserror::Error;

use grantor_db::EngineError;
use grantor_secrets::SecretError;

/// Errors from a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    /// A per-target worker died without producing a result.
    #[error("target worker failed: {message}")]
    Worker { message: String },
}
