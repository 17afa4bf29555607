//! Readiness reporting.
//!
//! The reconciler never reports success silently and never raises readiness
//! optimistically: `ready = true` is set only after every target of an
//! apply pass succeeded, and any failing pass reports `ready = false` with
//! the error message.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

/// Readiness channel back to the owning object store.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_ready(&self, user: &str, ready: bool, message: &str);
}

/// Sink that only logs, for embeddings without a status channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn set_ready(&self, user: &str, ready: bool, message: &str) {
        info!(user = %user, ready, message = %message, "status update");
    }
}

/// One recorded readiness update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub user: String,
    pub ready: bool,
    pub message: String,
}

/// Recording sink for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusSink {
    updates: Arc<Mutex<Vec<StatusUpdate>>>,
}

impl MemoryStatusSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All updates, in arrival order.
    #[must_use]
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().expect("status lock").clone()
    }

    /// The most recent update for `user`.
    #[must_use]
    pub fn latest(&self, user: &str) -> Option<StatusUpdate> {
        self.updates()
            .into_iter()
            .rev()
            .find(|update| update.user == user)
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn set_ready(&self, user: &str, ready: bool, message: &str) {
        self.updates.lock().expect("status lock").push(StatusUpdate {
            user: user.to_string(),
            ready,
            message: message.to_string(),
        });
    }
}
