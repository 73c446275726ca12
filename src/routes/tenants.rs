use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use super::{error_response, ApiError};
use crate::{
    middleware::super_admin::SuperAdminAuth,
    models::tenant::{DropSchemaQuery, RestoreRequest, TenantSchemaDescriptor},
    AppState,
};

// ─── Tenant schemas ───────────────────────────────────────────────────────────

pub async fn get_tenant_schema(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let descriptor = TenantSchemaDescriptor::for_tenant(&tenant_id).map_err(error_response)?;
    let exists = state
        .schemas
        .tenant_schema_exists(&tenant_id)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({
        "tenant_id": descriptor.tenant_id,
        "schema_name": descriptor.schema_name,
        "exists": exists,
    })))
}

pub async fn create_tenant_schema(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let descriptor = state
        .schemas
        .create_tenant_schema_from_template(&tenant_id)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(json!(descriptor))))
}

pub async fn drop_tenant_schema(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
    Query(query): Query<DropSchemaQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .schemas
        .drop_tenant_schema(&tenant_id, query.force)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "message": "Tenant schema dropped" })))
}

// ─── Backups ──────────────────────────────────────────────────────────────────

pub async fn list_backups(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let backups = state
        .schemas
        .list_tenant_backups(&tenant_id)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "backups": backups })))
}

pub async fn create_backup(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let snapshot = state
        .schemas
        .backup_tenant_schema(&tenant_id)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(json!(snapshot))))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path((tenant_id, backup_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state
        .schemas
        .delete_tenant_backup(&tenant_id, &backup_name)
        .await
        .map_err(error_response)?;

    Ok(Json(json!({ "message": "Backup deleted" })))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
    Path(tenant_id): Path<String>,
    Json(body): Json<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    let tables = state
        .schemas
        .restore_tenant_schema(&tenant_id, &body.backup_name)
        .await
        .map_err(error_response)?;

    // Data only: constraints, indexes and defaults are not part of a backup.
    Ok(Json(json!({
        "status": "Restore completed",
        "backup_name": body.backup_name,
        "tables": tables,
        "structure_restored": false,
    })))
}

// ─── Stats ────────────────────────────────────────────────────────────────────

pub async fn database_stats(
    State(state): State<AppState>,
    _auth: SuperAdminAuth,
) -> Result<Json<Value>, ApiError> {
    let stats = state
        .schemas
        .get_database_stats()
        .await
        .map_err(error_response)?;

    Ok(Json(json!(stats)))
}
