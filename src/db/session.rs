use async_trait::async_trait;
use sqlx::PgConnection;

/// A single database session. Every lifecycle operation borrows one for its whole duration,
/// so statements and session state (transactions, `search_path`) never interleave.
#[async_trait]
pub trait SqlSession: Send {
    /// Runs one raw statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error>;

    async fn schema_exists(&mut self, schema: &str) -> Result<bool, sqlx::Error>;

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool, sqlx::Error>;

    /// Base tables (no views) of `schema`, ordered by name.
    async fn base_tables(&mut self, schema: &str) -> Result<Vec<String>, sqlx::Error>;

    async fn current_search_path(&mut self) -> Result<String, sqlx::Error>;

    /// Runs a `SELECT COUNT(*)`-style query returning one BIGINT.
    async fn scalar_count(&mut self, sql: &str) -> Result<i64, sqlx::Error>;

    /// `(schema, base table count)` for every schema starting with `tenant_`, backups and
    /// empty schemas included.
    async fn tenant_schema_table_counts(&mut self) -> Result<Vec<(String, i64)>, sqlx::Error>;
}

#[async_trait]
impl SqlSession for PgConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn schema_exists(&mut self, schema: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(schema)
        .fetch_one(&mut *self)
        .await
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (
               SELECT 1 FROM information_schema.tables
               WHERE table_schema = $1 AND table_name = $2
             )",
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&mut *self)
        .await
    }

    async fn base_tables(&mut self, schema: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT table_name::TEXT FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .bind(schema)
        .fetch_all(&mut *self)
        .await
    }

    async fn current_search_path(&mut self) -> Result<String, sqlx::Error> {
        sqlx::query_scalar("SELECT current_setting('search_path')")
            .fetch_one(&mut *self)
            .await
    }

    async fn scalar_count(&mut self, sql: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(sql).fetch_one(&mut *self).await
    }

    async fn tenant_schema_table_counts(&mut self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT s.schema_name::TEXT, COUNT(t.table_name)::BIGINT
               FROM information_schema.schemata s
               LEFT JOIN information_schema.tables t
                 ON t.table_schema = s.schema_name AND t.table_type = 'BASE TABLE'
               WHERE s.schema_name LIKE 'tenant\_%'
               GROUP BY s.schema_name
               ORDER BY s.schema_name"#,
        )
        .fetch_all(&mut *self)
        .await
    }
}
