use std::path::PathBuf;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::bootstrap::{self, SetupOutcome};
use crate::db::naming::validate_tenant_id;
use crate::db::{backup, stats, tenant, LifecycleOptions};
use crate::error::SchemaResult;
use crate::models::tenant::{
    BackupSnapshot, BackupSummary, DatabaseStats, TenantSchemaDescriptor,
};
use crate::services::metrics;

/// Entry point for everything outside the core (tenant management, HTTP, CLI).
///
/// Each call checks out one pooled connection and holds it for the whole operation, so a
/// tenant `search_path` or an open transaction is never shared with other work.
///
/// Tenant ids must be canonical (`[a-z0-9-]`) here, so two ids never share a schema.
#[derive(Debug, Clone)]
pub struct SchemaService {
    pool: PgPool,
    options: LifecycleOptions,
    global_init_script: PathBuf,
    tenant_template: PathBuf,
}

impl SchemaService {
    pub fn new(
        pool: PgPool,
        options: LifecycleOptions,
        global_init_script: impl Into<PathBuf>,
        tenant_template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            options,
            global_init_script: global_init_script.into(),
            tenant_template: tenant_template.into(),
        }
    }

    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        Self::new(
            pool,
            config.lifecycle_options(),
            config.global_init_script.clone(),
            config.tenant_template.clone(),
        )
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn is_initialized(&self) -> SchemaResult<bool> {
        let mut conn = self.pool.acquire().await?;
        bootstrap::is_initialized(&mut *conn, &self.options.sentinel_table).await
    }

    pub async fn run_initial_setup(&self) -> SchemaResult<SetupOutcome> {
        let mut conn = self.pool.acquire().await?;
        let result =
            bootstrap::run_initial_setup(&mut *conn, &self.global_init_script, &self.options).await;
        metrics::record_operation("initial_setup", &result);
        result
    }

    pub async fn create_tenant_schema_from_template(
        &self,
        tenant_id: &str,
    ) -> SchemaResult<TenantSchemaDescriptor> {
        validate_tenant_id(tenant_id)?;
        let descriptor = TenantSchemaDescriptor::for_tenant(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        let result = tenant::create_tenant_schema_from_template(
            &mut *conn,
            tenant_id,
            &self.tenant_template,
            &self.options,
        )
        .await;
        metrics::record_operation("provision", &result);
        result.map(|_| descriptor)
    }

    pub async fn tenant_schema_exists(&self, tenant_id: &str) -> SchemaResult<bool> {
        validate_tenant_id(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        tenant::tenant_schema_exists(&mut *conn, tenant_id).await
    }

    pub async fn drop_tenant_schema(&self, tenant_id: &str, force: bool) -> SchemaResult<()> {
        let result = match validate_tenant_id(tenant_id) {
            Err(e) => Err(e),
            Ok(()) => match self.pool.acquire().await {
                Ok(mut conn) => tenant::drop_tenant_schema(&mut *conn, tenant_id, force).await,
                Err(e) => Err(e.into()),
            },
        };
        metrics::record_operation("drop", &result);
        if force {
            // Even a pool failure must not escape a forced drop.
            if let Err(e) = result {
                tracing::warn!("Forced drop for tenant {tenant_id:?} could not run: {e}");
            }
            return Ok(());
        }
        result
    }

    pub async fn backup_tenant_schema(&self, tenant_id: &str) -> SchemaResult<BackupSnapshot> {
        validate_tenant_id(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        let result = backup::backup_tenant_schema(&mut *conn, tenant_id, &self.options).await;
        metrics::record_operation("backup", &result);
        result
    }

    pub async fn restore_tenant_schema(
        &self,
        tenant_id: &str,
        backup_name: &str,
    ) -> SchemaResult<Vec<String>> {
        validate_tenant_id(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        let result =
            backup::restore_tenant_schema(&mut *conn, tenant_id, backup_name, &self.options).await;
        metrics::record_operation("restore", &result);
        result
    }

    pub async fn list_tenant_backups(&self, tenant_id: &str) -> SchemaResult<Vec<BackupSummary>> {
        validate_tenant_id(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        backup::list_tenant_backups(&mut *conn, tenant_id).await
    }

    pub async fn delete_tenant_backup(
        &self,
        tenant_id: &str,
        backup_name: &str,
    ) -> SchemaResult<()> {
        validate_tenant_id(tenant_id)?;
        let mut conn = self.pool.acquire().await?;
        let result = backup::delete_tenant_backup(&mut *conn, tenant_id, backup_name).await;
        metrics::record_operation("delete_backup", &result);
        result
    }

    pub async fn get_database_stats(&self) -> SchemaResult<DatabaseStats> {
        let mut conn = self.pool.acquire().await?;
        let stats = stats::get_database_stats(&mut *conn).await?;
        metrics::observe_stats(&stats);
        Ok(stats)
    }
}
