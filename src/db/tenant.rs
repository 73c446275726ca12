use std::path::Path;

use tokio::time::Instant;
use tracing::{info, warn};

use super::executor::{begin, commit, execute_all, rollback, StatementTimeoutScope};
use super::naming::{derive_schema_name, quote_ident, DEFAULT_SCHEMA};
use super::script::{load_script, split_statements, SqlStatement};
use super::session::SqlSession;
use super::LifecycleOptions;
use crate::error::{SchemaError, SchemaResult};

/// Borrowed `search_path`. Entering points the session at a tenant schema; [`release`]
/// must be awaited on every exit path to put `public` back.
///
/// A scope dropped without release only happens when the surrounding future is cancelled;
/// the pool's after-release hook resets the path in that case.
///
/// [`release`]: SearchPathScope::release
#[must_use]
struct SearchPathScope {
    schema: String,
    released: bool,
}

impl SearchPathScope {
    async fn enter<S: SqlSession + ?Sized>(session: &mut S, schema: &str) -> SchemaResult<Self> {
        session
            .execute(&format!("SET search_path TO {}", quote_ident(schema)))
            .await?;
        Ok(Self {
            schema: schema.to_string(),
            released: false,
        })
    }

    async fn release<S: SqlSession + ?Sized>(mut self, session: &mut S) -> SchemaResult<()> {
        self.released = true;
        session
            .execute(&format!("SET search_path TO {DEFAULT_SCHEMA}"))
            .await?;
        Ok(())
    }
}

impl Drop for SearchPathScope {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "search_path for {} was not released; relying on pool reset",
                self.schema
            );
        }
    }
}

async fn create_schema<S: SqlSession + ?Sized>(session: &mut S, schema: &str) -> SchemaResult<()> {
    session
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .await?;
    Ok(())
}

fn lock_key(schema: &str) -> String {
    // Schema names are restricted to [a-z0-9_], safe inside a literal.
    format!("hashtext('{schema}')")
}

/// Creates the tenant's schema and applies the tenant template to it.
///
/// With `transactional_templates` (the default) the whole provisioning runs in one
/// transaction under `pg_advisory_xact_lock`, so a failure leaves nothing behind.
/// Otherwise statements autocommit and a failure partway through is reported as
/// [`SchemaError::PartialApplication`]; the caller must drop the schema before retrying.
///
/// Running this twice for the same tenant does not re-apply the template cleanly.
pub async fn create_tenant_schema_from_template<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    template_path: &Path,
    options: &LifecycleOptions,
) -> SchemaResult<()> {
    let schema = derive_schema_name(tenant_id)?;
    // Load before touching the database: a missing template is a configuration error.
    let template = load_script(template_path).await?;
    let statements = split_statements(&template);
    let deadline = options.deadline();

    if options.transactional_templates {
        provision_in_transaction(session, &schema, &statements, deadline).await?;
    } else {
        provision_autocommit(session, &schema, &statements, deadline).await?;
    }

    info!(
        statements = statements.len(),
        "Provisioned tenant schema: {schema}"
    );
    Ok(())
}

async fn provision_in_transaction<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    statements: &[SqlStatement],
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    begin(session, deadline).await?;

    // The transaction-scoped lock is released by COMMIT or ROLLBACK.
    let locked = session
        .execute(&format!("SELECT pg_advisory_xact_lock({})", lock_key(schema)))
        .await;
    if let Err(e) = locked {
        rollback(session).await;
        return Err(e.into());
    }
    if let Err(e) = create_schema(session, schema).await {
        rollback(session).await;
        return Err(e);
    }

    let scope = match SearchPathScope::enter(session, schema).await {
        Ok(scope) => scope,
        Err(e) => {
            rollback(session).await;
            return Err(e);
        }
    };

    match execute_all(session, statements, deadline).await {
        Ok(_) => {
            if let Err(e) = scope.release(session).await {
                rollback(session).await;
                return Err(e);
            }
            commit(session).await
        }
        Err(failure) => {
            // An aborted transaction refuses every command until it ends.
            rollback(session).await;
            if let Err(e) = scope.release(session).await {
                warn!("Could not reset search_path after failed provisioning of {schema}: {e}");
            }
            Err(failure.error)
        }
    }
}

async fn provision_autocommit<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    statements: &[SqlStatement],
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    // Bounds the lock wait too.
    let timeout = StatementTimeoutScope::enter(session, deadline).await?;
    let result = provision_bounded(session, schema, statements, deadline).await;
    timeout.release(session).await;
    result
}

async fn provision_bounded<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    statements: &[SqlStatement],
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    session
        .execute(&format!("SELECT pg_advisory_lock({})", lock_key(schema)))
        .await?;

    let result = provision_locked(session, schema, statements, deadline).await;

    if let Err(e) = session
        .execute(&format!("SELECT pg_advisory_unlock({})", lock_key(schema)))
        .await
    {
        warn!("Could not release provisioning lock for {schema}: {e}");
    }
    result
}

async fn provision_locked<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    statements: &[SqlStatement],
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    create_schema(session, schema).await?;

    let scope = SearchPathScope::enter(session, schema).await?;
    let applied = execute_all(session, statements, deadline).await;
    let released = scope.release(session).await;

    match (applied, released) {
        (Ok(_), released) => released,
        (Err(failure), released) => {
            if let Err(e) = released {
                warn!("Could not reset search_path after failed provisioning of {schema}: {e}");
            }
            // The schema itself plus every statement before the failure stay applied.
            Err(SchemaError::partial(
                "provisioning",
                schema,
                failure.completed + 1,
                failure.error,
            ))
        }
    }
}

pub async fn tenant_schema_exists<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
) -> SchemaResult<bool> {
    let schema = derive_schema_name(tenant_id)?;
    Ok(session.schema_exists(&schema).await?)
}

/// Drops a schema and everything in it. Missing schemas are not an error.
pub(crate) async fn drop_schema<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
) -> SchemaResult<()> {
    session
        .execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema)))
        .await
        .map_err(|source| SchemaError::SchemaDrop {
            schema: schema.to_string(),
            source,
        })?;
    Ok(())
}

/// Drops the tenant's schema. With `force`, every error is logged and swallowed so that
/// compensating cleanup never masks the failure it is cleaning up after.
pub async fn drop_tenant_schema<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    force: bool,
) -> SchemaResult<()> {
    let result = match derive_schema_name(tenant_id) {
        Ok(schema) => drop_schema(session, &schema).await.map(|_| schema),
        Err(e) => Err(e),
    };

    match result {
        Ok(schema) => {
            info!("Dropped tenant schema: {schema}");
            Ok(())
        }
        Err(e) if force => {
            warn!("Forced drop of schema for tenant {tenant_id:?} failed, ignoring: {e}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
