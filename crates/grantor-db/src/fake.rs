//! Statement-recording scope for tests.
//!
//! Records connection strings and statements in arrival order. Derived
//! scopes share the recorder, so a workflow's complete statement sequence,
//! including statements executed on derived scopes, lands in one log in
//! execution order. Failures can be scripted per statement fragment to
//! exercise error classification.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::scope::{ConnectSpec, Scope, StatementLog};

/// One recorded statement with its bound arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    pub statement: String,
    pub args: Vec<String>,
}

#[derive(Debug, Default)]
struct Recorder {
    connections: Vec<String>,
    statements: Vec<RecordedStatement>,
    closes: usize,
    failures: Vec<ScriptedFailure>,
}

#[derive(Debug)]
struct ScriptedFailure {
    fragment: String,
    code: String,
}

/// Recording implementation of [`Scope`].
#[derive(Debug, Clone, Default)]
pub struct FakeScope {
    recorder: Arc<Mutex<Recorder>>,
}

impl FakeScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement containing `fragment` fail with the given
    /// backend code from now on.
    pub fn fail_statements_matching(&self, fragment: impl Into<String>, code: impl Into<String>) {
        self.recorder
            .lock()
            .expect("recorder lock")
            .failures
            .push(ScriptedFailure {
                fragment: fragment.into(),
                code: code.into(),
            });
    }

    /// Connection strings, in connect order.
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        self.recorder.lock().expect("recorder lock").connections.clone()
    }

    /// Statements with arguments, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.recorder.lock().expect("recorder lock").statements.clone()
    }

    /// Statement texts only, in execution order.
    #[must_use]
    pub fn statement_texts(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.statement).collect()
    }

    /// How many scopes were closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.recorder.lock().expect("recorder lock").closes
    }
}

#[async_trait]
impl Scope for FakeScope {
    fn derive(&self) -> Box<dyn Scope> {
        Box::new(self.clone())
    }

    async fn connect(&mut self, spec: &ConnectSpec) -> Result<(), EngineError> {
        self.recorder
            .lock()
            .expect("recorder lock")
            .connections
            .push(spec.dsn.clone());
        Ok(())
    }

    async fn execute(
        &mut self,
        _log: StatementLog,
        statement: &str,
        args: &[String],
    ) -> Result<(), EngineError> {
        let mut recorder = self.recorder.lock().expect("recorder lock");
        if let Some(failure) = recorder
            .failures
            .iter()
            .find(|f| statement.contains(&f.fragment))
        {
            let code = failure.code.clone();
            return Err(EngineError::statement(
                code,
                format!("scripted failure for '{statement}'"),
            ));
        }
        recorder.statements.push(RecordedStatement {
            statement: statement.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.recorder.lock().expect("recorder lock").closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::SessionOptions;
    use grantor_core::DialectKind;
    use sqlx::postgres::PgConnectOptions;

    fn spec(dsn: &str) -> ConnectSpec {
        ConnectSpec {
            dialect: DialectKind::Postgres,
            dsn: dsn.to_string(),
            options: SessionOptions::Postgres(PgConnectOptions::new()),
        }
    }

    #[tokio::test]
    async fn records_connections_statements_and_closes_in_order() {
        let fake = FakeScope::new();
        let mut scope: Box<dyn Scope> = Box::new(fake.clone());

        scope.connect(&spec("host=a")).await.unwrap();
        scope
            .execute(StatementLog::Enabled, "SELECT 1", &[])
            .await
            .unwrap();

        let mut derived = scope.derive();
        derived.connect(&spec("host=b")).await.unwrap();
        derived
            .execute(StatementLog::Enabled, "SELECT 2", &[])
            .await
            .unwrap();
        derived.close().await.unwrap();
        scope.close().await.unwrap();

        assert_eq!(fake.connections(), vec!["host=a", "host=b"]);
        assert_eq!(fake.statement_texts(), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(fake.closes(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_report_the_backend_code() {
        let fake = FakeScope::new();
        fake.fail_statements_matching("CREATE USER", "42710");

        let mut scope: Box<dyn Scope> = Box::new(fake.clone());
        let err = scope
            .execute(StatementLog::Enabled, "CREATE USER \"alice\"", &[])
            .await
            .unwrap_err();
        assert!(err.has_backend_code("42710"));
        assert!(fake.statements().is_empty());
    }
}
