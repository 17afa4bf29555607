//! Desired-state model for database user provisioning.
//!
//! This crate defines the declarative records the reconciliation engine
//! consumes (managed users, database targets, privilege entries) and the
//! privilege resolver that classifies each entry into the connection scope
//! that must execute it. Records are immutable for the duration of one
//! reconciliation pass and are re-fetched by the caller on every pass.

pub mod model;
pub mod privilege;

pub use model::{
    DatabaseTarget, DialectKind, ManagedUser, MysqlTarget, PostgresSslMode, PostgresTarget,
    SecretKeyRef, TargetBinding, TargetConfig,
};
pub use privilege::{PrivilegeEntry, PrivilegeError, PrivilegeKind, PrivilegeScope};
