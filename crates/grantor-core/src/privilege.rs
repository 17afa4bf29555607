//! Privilege entries and scope classification.
//!
//! Every declarative privilege entry resolves to exactly one of three
//! connection scopes before any statement is generated:
//!
//! - **role**: `on` and `database` both empty; the privilege is a role name
//!   or a role-level keyword and executes on the primary scope.
//! - **database**: `database` set, `on` empty; the grant addresses the
//!   database as a whole.
//! - **object**: `database` and `on` both set; the grant addresses an
//!   object inside that database.
//!
//! Any other combination is malformed and rejected before execution.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One declarative privilege grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeEntry {
    /// Privilege keyword (e.g. `SELECT`, `ALL`) or role name.
    pub privilege: String,

    /// Object the privilege applies to, for object-scoped grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<String>,

    /// Database the privilege applies to, for database- and object-scoped
    /// grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl PrivilegeEntry {
    /// Role-scoped entry: grant of a role or role-level keyword.
    pub fn role(privilege: impl Into<String>) -> Self {
        Self {
            privilege: privilege.into(),
            on: None,
            database: None,
        }
    }

    /// Database-scoped entry.
    pub fn database(privilege: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            privilege: privilege.into(),
            on: None,
            database: Some(database.into()),
        }
    }

    /// Object-scoped entry.
    pub fn object(
        privilege: impl Into<String>,
        database: impl Into<String>,
        on: impl Into<String>,
    ) -> Self {
        Self {
            privilege: privilege.into(),
            on: Some(on.into()),
            database: Some(database.into()),
        }
    }

    /// Classify this entry into its execution scope.
    pub fn scope(&self) -> Result<PrivilegeScope<'_>, PrivilegeError> {
        classify(self)
    }
}

/// Execution scope of a privilege entry, borrowed from the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeScope<'a> {
    /// Executes on the primary scope, no object clause.
    Role,
    /// Executes against `database` with an `ON DATABASE` clause.
    Database { database: &'a str },
    /// Executes against `database` with an `ON <object>` clause.
    Object { database: &'a str, object: &'a str },
}

/// Malformed privilege entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivilegeError {
    #[error("privilege entry has an empty privilege")]
    EmptyPrivilege,

    #[error("privilege entry for '{privilege}' sets 'on' ({on}) without a database")]
    ObjectWithoutDatabase { privilege: String, on: String },
}

/// Classify `entry` into its execution scope.
///
/// Empty strings are treated the same as absent fields, matching how the
/// declarative store delivers optional values.
pub fn classify(entry: &PrivilegeEntry) -> Result<PrivilegeScope<'_>, PrivilegeError> {
    let on = entry.on.as_deref().filter(|s| !s.is_empty());
    let database = entry.database.as_deref().filter(|s| !s.is_empty());

    if entry.privilege.is_empty() {
        return Err(PrivilegeError::EmptyPrivilege);
    }

    match (database, on) {
        (Some(database), Some(object)) => Ok(PrivilegeScope::Object { database, object }),
        (Some(database), None) => Ok(PrivilegeScope::Database { database }),
        (None, None) => Ok(PrivilegeScope::Role),
        (None, Some(object)) => Err(PrivilegeError::ObjectWithoutDatabase {
            privilege: entry.privilege.clone(),
            on: object.to_string(),
        }),
    }
}

/// Classify every entry up front, so a malformed entry fails the batch
/// before any statement executes.
pub fn classify_all(
    entries: &[PrivilegeEntry],
) -> Result<Vec<PrivilegeScope<'_>>, PrivilegeError> {
    entries.iter().map(classify).collect()
}

/// Category of a privilege keyword.
///
/// Informational lookup over the standard grant keywords; anything not in
/// the table is assumed to be a role name. Built once at startup and never
/// mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeKind {
    /// Table-level keyword (SELECT, INSERT, ...).
    Table,
    /// Database-level keyword (CREATE, CONNECT, ...).
    Database,
    /// ALL / ALL PRIVILEGES.
    All,
    /// Not a known keyword; treated as a role name.
    Role,
}

static PRIVILEGE_KINDS: LazyLock<HashMap<&'static str, PrivilegeKind>> = LazyLock::new(|| {
    let mut kinds = HashMap::new();
    for keyword in [
        "SELECT",
        "INSERT",
        "UPDATE",
        "DELETE",
        "TRUNCATE",
        "REFERENCES",
        "TRIGGER",
    ] {
        kinds.insert(keyword, PrivilegeKind::Table);
    }
    for keyword in ["CREATE", "CONNECT", "TEMPORARY", "TEMP"] {
        kinds.insert(keyword, PrivilegeKind::Database);
    }
    for keyword in ["ALL", "ALL PRIVILEGES"] {
        kinds.insert(keyword, PrivilegeKind::All);
    }
    kinds
});

impl PrivilegeKind {
    /// Look up the category of a privilege keyword, case-insensitively.
    #[must_use]
    pub fn of(privilege: &str) -> PrivilegeKind {
        PRIVILEGE_KINDS
            .get(privilege.to_ascii_uppercase().as_str())
            .copied()
            .unwrap_or(PrivilegeKind::Role)
    }
}
