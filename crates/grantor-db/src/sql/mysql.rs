//! MySQL statement builders.
//!
//! Every value rides as a positional parameter; the templates never embed
//! user-controlled text. Accounts are the `'<user>'@'<host>'` pair, so user
//! statements bind two parameters where PostgreSQL binds one.

use grantor_core::PrivilegeScope;

use crate::scope::StatementLog;
use crate::sql::Verb;

/// `CREATE USER` template. Binds `(username, users_hostname, password)`;
/// log-suppressed because the password is among the parameters.
#[must_use]
pub fn create_user(
    username: &str,
    users_hostname: &str,
    password: &str,
) -> (String, Vec<String>, StatementLog) {
    (
        "CREATE USER ?@? IDENTIFIED BY ?".to_string(),
        vec![
            username.to_string(),
            users_hostname.to_string(),
            password.to_string(),
        ],
        StatementLog::Disabled,
    )
}

/// `DROP USER` template. Binds `(username, users_hostname)`.
#[must_use]
pub fn drop_user(username: &str, users_hostname: &str) -> (String, Vec<String>) {
    (
        "DROP USER ?@?".to_string(),
        vec![username.to_string(), users_hostname.to_string()],
    )
}

/// GRANT/REVOKE template for one classified privilege entry.
///
/// The object target renders as `?.?` (object-scoped), `?.*`
/// (database-scoped) or is omitted entirely (role-scoped), with the
/// parameter list growing to match.
#[must_use]
pub fn privilege_statement(
    verb: Verb,
    username: &str,
    privilege: &str,
    scope: &PrivilegeScope<'_>,
) -> (String, Vec<String>) {
    let mut statement = String::new();
    statement.push_str(verb.keyword());
    statement.push_str(" ?");
    let mut args = vec![privilege.to_string()];

    match scope {
        PrivilegeScope::Object { database, object } => {
            statement.push_str(" ON ?.?");
            args.push((*database).to_string());
            args.push((*object).to_string());
        }
        PrivilegeScope::Database { database } => {
            statement.push_str(" ON ?.*");
            args.push((*database).to_string());
        }
        PrivilegeScope::Role => {}
    }

    statement.push(' ');
    statement.push_str(verb.preposition());
    statement.push_str(" ?");
    args.push(username.to_string());

    (statement, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_binds_account_pair_and_password() {
        let (statement, args, log) = create_user("bob", "*", "s3cr3t");
        assert_eq!(statement, "CREATE USER ?@? IDENTIFIED BY ?");
        assert_eq!(args, vec!["bob", "*", "s3cr3t"]);
        assert_eq!(log, StatementLog::Disabled);
    }

    #[test]
    fn drop_user_binds_account_pair() {
        let (statement, args) = drop_user("bob", "10.0.0.%");
        assert_eq!(statement, "DROP USER ?@?");
        assert_eq!(args, vec!["bob", "10.0.0.%"]);
    }

    #[test]
    fn object_scoped_grant_renders_qualified_target() {
        let (statement, args) = privilege_statement(
            Verb::Grant,
            "bob",
            "SELECT",
            &PrivilegeScope::Object {
                database: "app",
                object: "orders",
            },
        );
        assert_eq!(statement, "GRANT ? ON ?.? TO ?");
        assert_eq!(args, vec!["SELECT", "app", "orders", "bob"]);
    }

    #[test]
    fn database_scoped_grant_renders_wildcard_target() {
        let (statement, args) = privilege_statement(
            Verb::Grant,
            "bob",
            "ALL",
            &PrivilegeScope::Database { database: "app" },
        );
        assert_eq!(statement, "GRANT ? ON ?.* TO ?");
        assert_eq!(args, vec!["ALL", "app", "bob"]);
    }

    #[test]
    fn role_scoped_grant_omits_the_target() {
        let (statement, args) =
            privilege_statement(Verb::Revoke, "bob", "reader", &PrivilegeScope::Role);
        assert_eq!(statement, "REVOKE ? FROM ?");
        assert_eq!(args, vec!["reader", "bob"]);
    }
}
