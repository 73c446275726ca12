pub mod backup;
pub mod bootstrap;
pub mod executor;
pub mod naming;
pub mod script;
pub mod session;
pub mod stats;
pub mod tenant;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::time::Instant;

pub use session::SqlSession;

/// Knobs shared by every lifecycle operation.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Table in `public` whose presence means the global schema is set up.
    pub sentinel_table: String,
    /// Upper bound for a whole operation; `None` waits forever.
    pub operation_timeout: Option<Duration>,
    /// Apply tenant templates inside one transaction (Postgres has transactional DDL).
    pub transactional_templates: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            sentinel_table: "tenants".into(),
            operation_timeout: None,
            transactional_templates: true,
        }
    }
}

impl LifecycleOptions {
    /// Deadline for an operation starting now.
    pub fn deadline(&self) -> Option<Instant> {
        self.operation_timeout.map(|timeout| Instant::now() + timeout)
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        // A cancelled lifecycle operation can hand its connection back mid-transaction, or
        // with a tenant search_path or statement_timeout still set. None may reach the next
        // borrower.
        .after_release(|conn, _meta| {
            Box::pin(async move {
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("ROLLBACK")).await?;
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("RESET search_path")).await?;
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("RESET statement_timeout")).await?;
                Ok(true)
            })
        })
        .connect(database_url)
        .await?;
    Ok(pool)
}
