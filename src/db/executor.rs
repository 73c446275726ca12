use tokio::time::Instant;
use tracing::{debug, warn};

use super::script::SqlStatement;
use super::session::SqlSession;
use crate::error::{SchemaError, SchemaResult};

/// A script stopped at its first failing statement.
#[derive(Debug)]
pub struct ScriptFailure {
    /// Statements that completed before the failure.
    pub completed: usize,
    pub error: SchemaError,
}

/// Runs exactly one statement. Failures carry the statement's ordinal and verbatim text.
pub async fn execute_statement<S: SqlSession + ?Sized>(
    session: &mut S,
    statement: &SqlStatement,
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    debug!(ordinal = statement.ordinal, "executing: {}", statement.text);

    let result = match deadline {
        Some(deadline) => {
            match tokio::time::timeout_at(deadline, session.execute(&statement.text)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(SchemaError::StatementTimeout {
                        index: statement.ordinal,
                        statement: statement.text.clone(),
                    })
                }
            }
        }
        None => session.execute(&statement.text).await,
    };

    result.map(|_| ()).map_err(|source| SchemaError::Statement {
        index: statement.ordinal,
        statement: statement.text.clone(),
        source,
    })
}

/// Runs statements strictly in order and stops at the first failure.
pub async fn execute_all<S: SqlSession + ?Sized>(
    session: &mut S,
    statements: &[SqlStatement],
    deadline: Option<Instant>,
) -> Result<usize, ScriptFailure> {
    for (completed, statement) in statements.iter().enumerate() {
        if let Err(error) = execute_statement(session, statement, deadline).await {
            return Err(ScriptFailure { completed, error });
        }
    }
    Ok(statements.len())
}

fn remaining_ms(deadline: Instant) -> u128 {
    deadline
        .saturating_duration_since(Instant::now())
        .as_millis()
        .max(1)
}

/// Opens a transaction. With a deadline, the server aborts any statement that outlives it
/// (`SET LOCAL` ends with the transaction).
pub(crate) async fn begin<S: SqlSession + ?Sized>(
    session: &mut S,
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    session.execute("BEGIN").await?;
    if let Some(deadline) = deadline {
        let bounded = session
            .execute(&format!(
                "SET LOCAL statement_timeout = {}",
                remaining_ms(deadline)
            ))
            .await;
        if let Err(e) = bounded {
            rollback(session).await;
            return Err(e.into());
        }
    }
    Ok(())
}

/// Session-level `statement_timeout` for work that runs outside a transaction.
///
/// Dropping the client future does not stop a statement on the server, and the connection
/// stays busy until it finishes. With the deadline also set on the server, a stuck statement
/// is aborted there. [`release`] must be awaited on every exit path; the pool's after-release
/// hook resets the setting if the future is cancelled instead.
///
/// [`release`]: StatementTimeoutScope::release
#[must_use]
pub(crate) struct StatementTimeoutScope {
    active: bool,
}

impl StatementTimeoutScope {
    /// Without a deadline nothing is sent and release is a no-op.
    pub(crate) async fn enter<S: SqlSession + ?Sized>(
        session: &mut S,
        deadline: Option<Instant>,
    ) -> SchemaResult<Self> {
        let Some(deadline) = deadline else {
            return Ok(Self { active: false });
        };
        session
            .execute(&format!("SET statement_timeout = {}", remaining_ms(deadline)))
            .await?;
        Ok(Self { active: true })
    }

    pub(crate) async fn release<S: SqlSession + ?Sized>(mut self, session: &mut S) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = session.execute("RESET statement_timeout").await {
            warn!("RESET statement_timeout failed: {e}");
        }
    }
}

impl Drop for StatementTimeoutScope {
    fn drop(&mut self) {
        if self.active {
            warn!("statement_timeout was not reset; relying on pool reset");
        }
    }
}

pub(crate) async fn commit<S: SqlSession + ?Sized>(session: &mut S) -> SchemaResult<()> {
    session.execute("COMMIT").await?;
    Ok(())
}

/// Best effort: the error being handled by the caller is the one worth reporting.
pub(crate) async fn rollback<S: SqlSession + ?Sized>(session: &mut S) {
    if let Err(e) = session.execute("ROLLBACK").await {
        warn!("ROLLBACK failed: {e}");
    }
}
