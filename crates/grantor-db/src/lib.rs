//! Database engines for user and privilege provisioning.
//!
//! One engine per dialect (PostgreSQL, MySQL) behind the uniform
//! [`DatabaseEngine`] capability: connect, create/delete user, apply/revoke
//! privileges, close. Engines compose three pieces:
//!
//! - dialect SQL builders ([`sql`]): pure statement generation,
//! - an exclusive connection scope ([`scope`]): exactly one physical
//!   session per scope, derived scopes for statements that must run against
//!   another database, per-scope TLS material with guaranteed cleanup,
//! - certificate issuance (`grantor-pki`) for mutual-TLS targets.
//!
//! Engines absorb only idempotency-class backend errors ("already exists"
//! on create, and "does not exist" on delete where the dialect implements
//! it); everything else propagates to the reconciler untouched.
//!
//! [`fake::FakeScope`] records connection strings and statements in arrival
//! order and is shipped as a public module so consumers can test their
//! workflows without a live server.

pub mod config;
pub mod engine;
pub mod error;
pub mod fake;
pub mod mysql;
pub mod postgres;
pub mod scope;
pub mod sql;

pub use engine::{resolve_engine, resolve_engine_with_scope, DatabaseEngine};
pub use error::EngineError;
pub use scope::{ConnectSpec, Scope, SessionOptions, SqlxScope, StatementLog};
