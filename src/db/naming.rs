use crate::error::{SchemaError, SchemaResult};

pub const TENANT_SCHEMA_PREFIX: &str = "tenant_";
pub const DEFAULT_SCHEMA: &str = "public";

const BACKUP_INFIX: &str = "_backup_";

/// Postgres silently truncates longer identifiers (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Unix milliseconds keep 13 digits until the year 2286.
const BACKUP_MILLIS_DIGITS: usize = 13;

/// Longest tenant schema name that still leaves room for `_backup_{unix_millis}`.
pub const MAX_TENANT_SCHEMA_LEN: usize =
    MAX_IDENTIFIER_LEN - BACKUP_INFIX.len() - BACKUP_MILLIS_DIGITS;

/// Returns the PostgreSQL schema name for a tenant id.
///
/// Lowercases the id and replaces everything outside `[a-z0-9]` with `_`. The mapping is
/// injective for ids made of `[a-z0-9-]` only (see [`is_canonical_tenant_id`]); outside that
/// set distinct ids can collide, e.g. `Acme` / `acme` or `acme-corp` / `acme_corp` / `acme.corp`.
///
/// Ids whose schema would read as a backup name (`acme-backup-5`) are rejected, so tenant
/// schemas and backup schemas never share a name.
pub fn derive_schema_name(tenant_id: &str) -> SchemaResult<String> {
    if tenant_id.trim().is_empty() {
        return Err(SchemaError::InvalidArgument(
            "tenant id must not be empty".into(),
        ));
    }

    let sanitized: String = tenant_id
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    let schema = format!("{TENANT_SCHEMA_PREFIX}{sanitized}");

    if schema.len() > MAX_TENANT_SCHEMA_LEN {
        return Err(SchemaError::InvalidArgument(format!(
            "schema name for tenant {tenant_id:?} exceeds {MAX_TENANT_SCHEMA_LEN} bytes"
        )));
    }
    if parse_backup_name(&schema).is_some() {
        return Err(SchemaError::InvalidArgument(format!(
            "tenant id {tenant_id:?} would produce a backup schema name ({schema})"
        )));
    }
    Ok(schema)
}

/// True when `tenant_id` lies in the collision-free domain of [`derive_schema_name`].
pub fn is_canonical_tenant_id(tenant_id: &str) -> bool {
    !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Rejects ids outside the canonical `[a-z0-9-]` domain so two ids never share a schema.
pub fn validate_tenant_id(tenant_id: &str) -> SchemaResult<()> {
    if !is_canonical_tenant_id(tenant_id) {
        return Err(SchemaError::InvalidArgument(format!(
            "tenant id {tenant_id:?} must contain only a-z, 0-9 and '-'"
        )));
    }
    Ok(())
}

pub fn backup_schema_name(schema: &str, unix_millis: i64) -> SchemaResult<String> {
    let name = format!("{schema}{BACKUP_INFIX}{unix_millis}");
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(SchemaError::InvalidArgument(format!(
            "backup name {name} exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    Ok(name)
}

/// Splits `{schema}_backup_{millis}` into its parts.
pub fn parse_backup_name(name: &str) -> Option<(&str, i64)> {
    let (schema, millis) = name.rsplit_once(BACKUP_INFIX)?;
    if schema.is_empty() || millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((schema, millis.parse().ok()?))
}

/// Live tenant schema, as opposed to one of its backups.
pub fn is_tenant_schema(name: &str) -> bool {
    name.len() > TENANT_SCHEMA_PREFIX.len()
        && name.starts_with(TENANT_SCHEMA_PREFIX)
        && parse_backup_name(name).is_none()
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
