use super::naming::{is_tenant_schema, parse_backup_name};
use super::session::SqlSession;
use crate::error::SchemaResult;
use crate::models::tenant::{DatabaseStats, TenantSchemaStats};

const TENANTS_SQL: &str = "SELECT COUNT(*)::BIGINT FROM public.tenants";
const USERS_SQL: &str = "SELECT COUNT(*)::BIGINT FROM public.users";
const ACTIVE_SESSIONS_SQL: &str =
    "SELECT COUNT(*)::BIGINT FROM public.sessions WHERE expires_at > NOW()";

/// Read-only snapshot for dashboards and health checks.
pub async fn get_database_stats<S: SqlSession + ?Sized>(
    session: &mut S,
) -> SchemaResult<DatabaseStats> {
    let tenants = session.scalar_count(TENANTS_SQL).await?;
    let users = session.scalar_count(USERS_SQL).await?;
    let active_sessions = session.scalar_count(ACTIVE_SESSIONS_SQL).await?;

    let mut tenant_schemas = Vec::new();
    let mut backup_schemas = 0;
    for (schema, tables) in session.tenant_schema_table_counts().await? {
        if is_tenant_schema(&schema) {
            tenant_schemas.push(TenantSchemaStats { schema, tables });
        } else if parse_backup_name(&schema).is_some() {
            backup_schemas += 1;
        }
    }

    Ok(DatabaseStats {
        tenants,
        users,
        active_sessions,
        tenant_schemas,
        backup_schemas,
    })
}
