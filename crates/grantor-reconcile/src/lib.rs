//! Reconciliation engine for managed database users.
//!
//! Drives the create-or-update and delete workflows for one [`ManagedUser`]
//! snapshot at a time. Delivery (watching the object store, single-flight
//! per object, finalizer bookkeeping) belongs to the embedding process;
//! this crate assumes it is never invoked concurrently for the same user.
//!
//! A pass is all-or-nothing: any failing step fails the whole pass, nothing
//! is memoized, and the caller retries by re-invoking with a fresh snapshot
//! (at-least-once, eventually consistent).
//!
//! [`ManagedUser`]: grantor_core::ManagedUser

pub mod error;
pub mod factory;
pub mod reconciler;
pub mod status;

pub use error::ReconcileError;
pub use factory::{EngineFactory, SqlEngineFactory};
pub use reconciler::{ReconcileOutcome, Reconciler, UserPhase};
pub use status::{LogStatusSink, MemoryStatusSink, StatusSink, StatusUpdate};
