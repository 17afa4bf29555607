//! PostgreSQL statement builders.
//!
//! Statements are assembled as fully escaped text: the server-side protocol
//! does not accept parameters in DDL or GRANT/REVOKE positions, so
//! everything that came from a declarative record goes through
//! [`quote_identifier`] or [`quote_literal`].

use grantor_core::PrivilegeScope;

use crate::scope::StatementLog;
use crate::sql::Verb;

/// Escape an identifier.
///
/// The identifier is split on `.` so qualified names keep their structure;
/// each segment has embedded NUL bytes stripped and double quotes doubled,
/// and is wrapped in double quotes unless it is the `*` wildcard.
#[must_use]
pub fn quote_identifier(raw: &str) -> String {
    raw.split('.')
        .map(|segment| {
            let cleaned = segment.replace('\0', "").replace('"', "\"\"");
            if cleaned == "*" {
                cleaned
            } else {
                format!("\"{cleaned}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a string literal: wrap in single quotes, doubling embedded ones.
#[must_use]
pub fn quote_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Sanitize a privilege keyword or role name for unquoted emission.
///
/// Privileges are keywords or role identifiers and cannot be wrapped in
/// quotes; stripping `#` and `;` removes statement-termination and comment
/// sequences.
#[must_use]
pub fn sanitize_privilege(raw: &str) -> String {
    raw.replace(['#', ';'], "")
}

/// `CREATE USER` statement. The password, when present, is embedded as an
/// escaped literal and the statement is marked log-suppressed.
#[must_use]
pub fn create_user(username: &str, password: &str) -> (String, StatementLog) {
    let mut statement = String::from("CREATE USER ");
    statement.push_str(&quote_identifier(username));
    if password.is_empty() {
        (statement, StatementLog::Enabled)
    } else {
        statement.push_str(" WITH PASSWORD ");
        statement.push_str(&quote_literal(password));
        (statement, StatementLog::Disabled)
    }
}

/// `DROP USER` statement.
#[must_use]
pub fn drop_user(username: &str) -> String {
    format!("DROP USER {}", quote_identifier(username))
}

/// GRANT/REVOKE statement for one classified privilege entry.
///
/// Shapes:
/// - object-scoped: `<VERB> <privilege> ON <on> <TO|FROM> <user>`
/// - database-scoped: `<VERB> <privilege> ON DATABASE <database> <TO|FROM> <user>`
/// - role-scoped: `<VERB> <privilege> <TO|FROM> <user>`
#[must_use]
pub fn privilege_statement(
    verb: Verb,
    username: &str,
    privilege: &str,
    scope: &PrivilegeScope<'_>,
) -> String {
    let mut statement = String::new();
    statement.push_str(verb.keyword());
    statement.push(' ');
    statement.push_str(&sanitize_privilege(privilege));

    match scope {
        PrivilegeScope::Object { object, .. } => {
            statement.push_str(" ON ");
            statement.push_str(&quote_identifier(object));
        }
        PrivilegeScope::Database { database } => {
            statement.push_str(" ON DATABASE ");
            statement.push_str(&quote_identifier(database));
        }
        PrivilegeScope::Role => {}
    }

    statement.push(' ');
    statement.push_str(verb.preposition());
    statement.push(' ');
    statement.push_str(&quote_identifier(username));
    statement
}
