//! Operator CLI for tenant schemas.
//!
//! Usage: schemactl <COMMAND>
//!   init                          Apply the global init script (no-op when already done)
//!   provision <TENANT>            Create a tenant schema from the template
//!   drop <TENANT> [--force]       Drop a tenant schema
//!   backup <TENANT>               Snapshot a tenant schema
//!   backups <TENANT>              List a tenant's backups
//!   restore <TENANT> <BACKUP>     Replace a tenant schema with a backup
//!   delete-backup <TENANT> <BACKUP>
//!   stats                         Print database stats as JSON

use clap::{Parser, Subcommand};
use tenant_schema_api::{config::Config, db, services::schemas::SchemaService};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemactl", about = "Manage per-tenant PostgreSQL schemas")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the global init script
    Init,
    /// Create a tenant schema from the template
    Provision { tenant: String },
    /// Drop a tenant schema
    Drop {
        tenant: String,
        /// Log and ignore errors
        #[arg(long)]
        force: bool,
    },
    /// Snapshot a tenant schema into a backup schema
    Backup { tenant: String },
    /// List a tenant's backups, newest first
    Backups { tenant: String },
    /// Replace a tenant schema with the contents of a backup
    Restore { tenant: String, backup: String },
    /// Delete one backup schema
    DeleteBackup { tenant: String, backup: String },
    /// Print database stats as JSON
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    // One operation at a time; a small pool is enough.
    let pool = db::create_pool(&config.database_url, 2).await?;
    let schemas = SchemaService::from_config(pool, &config);

    match args.command {
        Command::Init => {
            let outcome = schemas.run_initial_setup().await?;
            tracing::info!("Global setup: {outcome:?}");
        }
        Command::Provision { tenant } => {
            let descriptor = schemas.create_tenant_schema_from_template(&tenant).await?;
            println!("{}", descriptor.schema_name);
        }
        Command::Drop { tenant, force } => {
            schemas.drop_tenant_schema(&tenant, force).await?;
        }
        Command::Backup { tenant } => {
            let snapshot = schemas.backup_tenant_schema(&tenant).await?;
            tracing::info!(tables = snapshot.tables.len(), "Backup created");
            println!("{}", snapshot.backup_name);
        }
        Command::Backups { tenant } => {
            for backup in schemas.list_tenant_backups(&tenant).await? {
                println!("{}\t{} table(s)", backup.backup_name, backup.tables);
            }
        }
        Command::Restore { tenant, backup } => {
            let tables = schemas.restore_tenant_schema(&tenant, &backup).await?;
            tracing::info!("Restored {} table(s) from {backup}", tables.len());
        }
        Command::DeleteBackup { tenant, backup } => {
            schemas.delete_tenant_backup(&tenant, &backup).await?;
        }
        Command::Stats => {
            let stats = schemas.get_database_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
