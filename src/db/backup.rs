//! Logical per-tenant backups kept as sibling schemas (`{schema}_backup_{unix_millis}`).
//!
//! Nothing here is atomic across tables: a failure after N copied tables leaves those N
//! tables in place and is reported as [`SchemaError::PartialApplication`]. Copies use
//! `CREATE TABLE ... AS SELECT *`, so only data and column types survive a round trip.
//! Backups are never removed automatically.

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;
use tracing::info;

use super::executor::{execute_all, StatementTimeoutScope};
use super::naming::{backup_schema_name, derive_schema_name, parse_backup_name, quote_ident};
use super::script::SqlStatement;
use super::session::SqlSession;
use super::tenant::drop_schema;
use super::LifecycleOptions;
use crate::error::{SchemaError, SchemaResult};
use crate::models::tenant::{BackupSnapshot, BackupSummary};

fn copy_statements(source: &str, target: &str, tables: &[String]) -> Vec<SqlStatement> {
    tables
        .iter()
        .enumerate()
        .map(|(i, table)| SqlStatement {
            ordinal: i + 1,
            text: format!(
                "CREATE TABLE {}.{} AS SELECT * FROM {}.{}",
                quote_ident(target),
                quote_ident(table),
                quote_ident(source),
                quote_ident(table)
            ),
        })
        .collect()
}

/// Copies every base table of the tenant's schema into a new backup schema.
pub async fn backup_tenant_schema<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    options: &LifecycleOptions,
) -> SchemaResult<BackupSnapshot> {
    backup_at(session, tenant_id, Utc::now(), options.deadline()).await
}

pub(crate) async fn backup_at<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    created_at: DateTime<Utc>,
    deadline: Option<Instant>,
) -> SchemaResult<BackupSnapshot> {
    let schema = derive_schema_name(tenant_id)?;
    let backup_name = backup_schema_name(&schema, created_at.timestamp_millis())?;

    if !session.schema_exists(&schema).await? {
        return Err(SchemaError::InvalidArgument(format!(
            "schema {schema} does not exist"
        )));
    }

    let timeout = StatementTimeoutScope::enter(session, deadline).await?;
    let copied = copy_into_backup(session, &schema, &backup_name, deadline).await;
    timeout.release(session).await;
    let tables = copied?;

    info!(tables = tables.len(), "Backed up {schema} into {backup_name}");
    Ok(BackupSnapshot {
        backup_name,
        source_schema: schema,
        created_at,
        tables,
    })
}

async fn copy_into_backup<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    backup_name: &str,
    deadline: Option<Instant>,
) -> SchemaResult<Vec<String>> {
    // No IF NOT EXISTS: a name clash must fail instead of merging into another backup.
    session
        .execute(&format!("CREATE SCHEMA {}", quote_ident(backup_name)))
        .await?;

    let tables = session
        .base_tables(schema)
        .await
        .map_err(|e| SchemaError::partial("backup", backup_name, 1, e.into()))?;

    let statements = copy_statements(schema, backup_name, &tables);
    execute_all(session, &statements, deadline)
        .await
        .map_err(|failure| {
            SchemaError::partial("backup", backup_name, failure.completed + 1, failure.error)
        })?;
    Ok(tables)
}

/// Checks `backup_name` names a backup of `schema`, without touching the database.
fn check_backup_owner(schema: &str, backup_name: &str) -> SchemaResult<()> {
    match parse_backup_name(backup_name) {
        Some((source, _)) if source == schema => Ok(()),
        _ => Err(SchemaError::InvalidArgument(format!(
            "{backup_name} is not a backup of {schema}"
        ))),
    }
}

/// Replaces the tenant's schema with the contents of `backup_name`.
///
/// Validation happens first; once the current schema has been dropped there is no way
/// back, and any later failure is a [`SchemaError::PartialApplication`].
/// Returns the restored table names.
pub async fn restore_tenant_schema<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    backup_name: &str,
    options: &LifecycleOptions,
) -> SchemaResult<Vec<String>> {
    let schema = derive_schema_name(tenant_id)?;
    check_backup_owner(&schema, backup_name)?;
    if !session.schema_exists(backup_name).await? {
        return Err(SchemaError::BackupNotFound(backup_name.to_string()));
    }
    let tables = session.base_tables(backup_name).await?;
    let deadline = options.deadline();

    let timeout = StatementTimeoutScope::enter(session, deadline).await?;
    let replaced = replace_from_backup(session, &schema, backup_name, &tables, deadline).await;
    timeout.release(session).await;
    replaced?;

    info!(tables = tables.len(), "Restored {schema} from {backup_name}");
    Ok(tables)
}

async fn replace_from_backup<S: SqlSession + ?Sized>(
    session: &mut S,
    schema: &str,
    backup_name: &str,
    tables: &[String],
    deadline: Option<Instant>,
) -> SchemaResult<()> {
    drop_schema(session, schema).await?;

    session
        .execute(&format!("CREATE SCHEMA {}", quote_ident(schema)))
        .await
        .map_err(|e| SchemaError::partial("restore", schema, 1, e.into()))?;

    let statements = copy_statements(backup_name, schema, tables);
    execute_all(session, &statements, deadline)
        .await
        .map_err(|failure| {
            SchemaError::partial("restore", schema, failure.completed + 2, failure.error)
        })?;
    Ok(())
}

/// Backups of the tenant's schema, newest first.
pub async fn list_tenant_backups<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
) -> SchemaResult<Vec<BackupSummary>> {
    let schema = derive_schema_name(tenant_id)?;
    let mut backups: Vec<(i64, BackupSummary)> = session
        .tenant_schema_table_counts()
        .await?
        .into_iter()
        .filter_map(|(name, tables)| {
            let (source, millis) = parse_backup_name(&name)?;
            (source == schema).then(|| {
                let summary = BackupSummary {
                    created_at: Utc.timestamp_millis_opt(millis).single(),
                    backup_name: name.clone(),
                    tables,
                };
                (millis, summary)
            })
        })
        .collect();

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(backups.into_iter().map(|(_, summary)| summary).collect())
}

pub async fn delete_tenant_backup<S: SqlSession + ?Sized>(
    session: &mut S,
    tenant_id: &str,
    backup_name: &str,
) -> SchemaResult<()> {
    let schema = derive_schema_name(tenant_id)?;
    check_backup_owner(&schema, backup_name)?;
    if !session.schema_exists(backup_name).await? {
        return Err(SchemaError::BackupNotFound(backup_name.to_string()));
    }
    drop_schema(session, backup_name).await?;
    info!("Deleted backup {backup_name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::MemorySession;
    use crate::error::ErrorKind;

    fn acme_session() -> MemorySession {
        let mut session = MemorySession::new();
        session.insert_table("tenant_acme", "customers", &["(1, 'ada')", "(2, 'grace')"]);
        session.insert_table("tenant_acme", "invoices", &["(10, 1)"]);
        session.insert_table("tenant_acme", "notes", &[]);
        session
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[tokio::test]
    async fn test_backup_then_restore_round_trips_data() {
        let mut session = acme_session();
        let original: Vec<_> = ["customers", "invoices", "notes"]
            .iter()
            .map(|t| session.rows("tenant_acme", t).cloned().unwrap())
            .collect();

        let snapshot = backup_at(&mut session, "acme", at(1_700_000_000_000), None)
            .await
            .unwrap();
        assert_eq!(snapshot.backup_name, "tenant_acme_backup_1700000000000");
        assert_eq!(snapshot.source_schema, "tenant_acme");
        assert_eq!(snapshot.tables, ["customers", "invoices", "notes"]);

        // Diverge from the snapshot, then restore it.
        session
            .execute("INSERT INTO \"tenant_acme\".\"customers\" VALUES (3, 'late')")
            .await
            .unwrap();
        session
            .execute("CREATE TABLE \"tenant_acme\".\"scratch\" (id INT)")
            .await
            .unwrap();

        let restored = restore_tenant_schema(
            &mut session,
            "acme",
            &snapshot.backup_name,
            &LifecycleOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(restored, ["customers", "invoices", "notes"]);

        let after: Vec<_> = ["customers", "invoices", "notes"]
            .iter()
            .map(|t| session.rows("tenant_acme", t).cloned().unwrap())
            .collect();
        assert_eq!(original, after);
        assert!(!session.has_table("tenant_acme", "scratch"));
        // The backup stays around until someone deletes it.
        assert!(session.has_schema(&snapshot.backup_name));
    }

    #[tokio::test]
    async fn test_failed_backup_is_reported_and_left_in_place() {
        let mut session = acme_session();
        session.fail_on("AS SELECT * FROM \"tenant_acme\".\"invoices\"");

        let err = backup_at(&mut session, "acme", at(1_700_000_000_000), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PartialApplication);
        match &err {
            SchemaError::PartialApplication { operation, completed, source, .. } => {
                assert_eq!(*operation, "backup");
                assert_eq!(*completed, 2);
                assert!(matches!(source.as_ref(), SchemaError::Statement { index: 2, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let backup = "tenant_acme_backup_1700000000000";
        assert!(session.has_table(backup, "customers"));
        assert!(!session.has_table(backup, "invoices"));
        // The source is untouched.
        assert_eq!(session.rows("tenant_acme", "customers").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backup_name_clash_fails() {
        let mut session = acme_session();
        backup_at(&mut session, "acme", at(5), None).await.unwrap();
        assert!(backup_at(&mut session, "acme", at(5), None).await.is_err());
    }

    #[tokio::test]
    async fn test_backup_of_missing_schema() {
        let mut session = MemorySession::new();
        let err = backup_at(&mut session, "ghost", at(1), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!session.has_schema("tenant_ghost_backup_1"));
    }

    #[tokio::test]
    async fn test_restore_validates_before_dropping() {
        let mut session = acme_session();
        session.insert_table("tenant_other_backup_1", "customers", &[]);
        let options = LifecycleOptions::default();

        let foreign =
            restore_tenant_schema(&mut session, "acme", "tenant_other_backup_1", &options)
                .await
                .unwrap_err();
        assert_eq!(foreign.kind(), ErrorKind::InvalidArgument);

        let missing =
            restore_tenant_schema(&mut session, "acme", "tenant_acme_backup_42", &options)
                .await
                .unwrap_err();
        assert!(matches!(missing, SchemaError::BackupNotFound(_)));

        assert_eq!(session.rows("tenant_acme", "customers").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_failure_after_drop_is_partial() {
        let mut session = acme_session();
        let snapshot = backup_at(&mut session, "acme", at(7), None).await.unwrap();
        session.fail_on("\"tenant_acme\".\"notes\" AS SELECT");

        let options = LifecycleOptions::default();
        let err = restore_tenant_schema(&mut session, "acme", &snapshot.backup_name, &options)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PartialApplication);
        assert!(session.has_table("tenant_acme", "customers"));
        assert!(session.has_table("tenant_acme", "invoices"));
        assert!(!session.has_table("tenant_acme", "notes"));
    }

    #[tokio::test]
    async fn test_list_and_delete_backups() {
        let mut session = acme_session();
        session.insert_table("tenant_acme_corp_backup_9", "x", &[]);
        backup_at(&mut session, "acme", at(100), None).await.unwrap();
        backup_at(&mut session, "acme", at(300), None).await.unwrap();
        backup_at(&mut session, "acme", at(200), None).await.unwrap();

        let names: Vec<_> = list_tenant_backups(&mut session, "acme")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.backup_name)
            .collect();
        assert_eq!(
            names,
            [
                "tenant_acme_backup_300",
                "tenant_acme_backup_200",
                "tenant_acme_backup_100"
            ]
        );

        delete_tenant_backup(&mut session, "acme", "tenant_acme_backup_200")
            .await
            .unwrap();
        assert!(!session.has_schema("tenant_acme_backup_200"));
        assert!(matches!(
            delete_tenant_backup(&mut session, "acme", "tenant_acme_backup_200").await,
            Err(SchemaError::BackupNotFound(_))
        ));
        assert!(delete_tenant_backup(&mut session, "acme", "tenant_acme").await.is_err());
        assert!(session.has_schema("tenant_acme"));
    }

    #[tokio::test]
    async fn test_backup_and_restore_bound_statements_on_the_server() {
        let mut session = acme_session();
        let deadline = Some(Instant::now() + std::time::Duration::from_secs(30));

        let snapshot = backup_at(&mut session, "acme", at(11), deadline).await.unwrap();
        let executed = session.executed().to_vec();
        assert!(executed[0].starts_with("SET statement_timeout = "));
        assert_eq!(executed[1], format!("CREATE SCHEMA \"{}\"", snapshot.backup_name));
        assert_eq!(executed.last().unwrap(), "RESET statement_timeout");

        session.clear_executed();
        session.fail_on("\"tenant_acme\".\"invoices\" AS SELECT");
        let options = LifecycleOptions {
            operation_timeout: Some(std::time::Duration::from_secs(30)),
            ..LifecycleOptions::default()
        };
        let err = restore_tenant_schema(&mut session, "acme", &snapshot.backup_name, &options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialApplication);

        let executed = session.executed();
        assert!(executed[0].starts_with("SET statement_timeout = "));
        assert!(executed[1].starts_with("DROP SCHEMA IF EXISTS \"tenant_acme\""));
        assert_eq!(executed.last().unwrap(), "RESET statement_timeout");
    }
}
