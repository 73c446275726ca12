use std::path::Path;

use tracing::{info, warn};

use super::executor::{begin, commit, execute_all, rollback};
use super::naming::DEFAULT_SCHEMA;
use super::script::{load_script, split_statements};
use super::session::SqlSession;
use super::LifecycleOptions;
use crate::error::{SchemaError, SchemaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// The sentinel table was already there; nothing ran.
    AlreadyInitialized,
    Applied { statements: usize },
}

/// Whether the global schema has been set up, judged by `public.<sentinel_table>`.
pub async fn is_initialized<S: SqlSession + ?Sized>(
    session: &mut S,
    sentinel_table: &str,
) -> SchemaResult<bool> {
    Ok(session.table_exists(DEFAULT_SCHEMA, sentinel_table).await?)
}

const SETUP_LOCK: &str = "SELECT pg_advisory_xact_lock(hashtext('global_schema_setup'))";

async fn lock_and_recheck<S: SqlSession + ?Sized>(
    session: &mut S,
    sentinel_table: &str,
) -> SchemaResult<bool> {
    session.execute(SETUP_LOCK).await?;
    is_initialized(session, sentinel_table).await
}

/// Applies the global init script once. Safe to call on every process start.
///
/// The script runs inside a single transaction: either every statement takes effect or none
/// does. Concurrent callers serialize on an advisory lock and all but the first see
/// [`SetupOutcome::AlreadyInitialized`]. Failures come back as [`SchemaError::DatabaseSetup`].
pub async fn run_initial_setup<S: SqlSession + ?Sized>(
    session: &mut S,
    script_path: &Path,
    options: &LifecycleOptions,
) -> SchemaResult<SetupOutcome> {
    if is_initialized(session, &options.sentinel_table).await? {
        info!(
            "Global schema already initialized (found {DEFAULT_SCHEMA}.{})",
            options.sentinel_table
        );
        return Ok(SetupOutcome::AlreadyInitialized);
    }

    let setup_error = |e: SchemaError| SchemaError::DatabaseSetup(Box::new(e));

    let script = load_script(script_path).await.map_err(setup_error)?;
    let statements = split_statements(&script);
    let deadline = options.deadline();

    begin(session, deadline).await.map_err(setup_error)?;

    // Another process may have started at the same time. Serialize on the lock, then look
    // again: whoever got there first has already committed.
    match lock_and_recheck(session, &options.sentinel_table).await {
        Ok(false) => {}
        Ok(true) => {
            rollback(session).await;
            info!("Global schema initialized concurrently by another process");
            return Ok(SetupOutcome::AlreadyInitialized);
        }
        Err(e) => {
            rollback(session).await;
            return Err(setup_error(e));
        }
    }

    if let Err(failure) = execute_all(session, &statements, deadline).await {
        rollback(session).await;
        return Err(setup_error(failure.error));
    }
    commit(session).await.map_err(setup_error)?;

    if !is_initialized(session, &options.sentinel_table).await? {
        warn!(
            "{} did not create {DEFAULT_SCHEMA}.{}; setup will run again on next start",
            script_path.display(),
            options.sentinel_table
        );
    }
    info!(
        statements = statements.len(),
        "Global schema initialized from {}",
        script_path.display()
    );
    Ok(SetupOutcome::Applied {
        statements: statements.len(),
    })
}
