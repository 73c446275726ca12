use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::naming::derive_schema_name;
use crate::error::SchemaResult;

/// A tenant schema together with the id it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSchemaDescriptor {
    pub tenant_id: String,
    pub schema_name: String,
}

impl TenantSchemaDescriptor {
    pub fn for_tenant(tenant_id: &str) -> SchemaResult<Self> {
        Ok(Self {
            schema_name: derive_schema_name(tenant_id)?,
            tenant_id: tenant_id.to_string(),
        })
    }
}

/// A data-only copy of a tenant schema (`CREATE TABLE ... AS SELECT *`): rows and column
/// types are kept, constraints, indexes, defaults and foreign keys are not.
#[derive(Debug, Clone, Serialize)]
pub struct BackupSnapshot {
    pub backup_name: String,
    pub source_schema: String,
    pub created_at: DateTime<Utc>,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub backup_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub tables: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSchemaStats {
    pub schema: String,
    pub tables: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub tenants: i64,
    pub users: i64,
    pub active_sessions: i64,
    pub tenant_schemas: Vec<TenantSchemaStats>,
    pub backup_schemas: usize,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub backup_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DropSchemaQuery {
    #[serde(default)]
    pub force: bool,
}
