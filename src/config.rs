use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::LifecycleOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub global_init_script: PathBuf,
    pub tenant_template: PathBuf,
    pub sentinel_table: String,
    pub operation_timeout: Option<Duration>,
    pub transactional_templates: bool,
    // Only the HTTP surface needs it.
    pub super_admin_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            global_init_script: env::var("GLOBAL_INIT_SCRIPT")
                .unwrap_or_else(|_| "sql/global_init.sql".into())
                .into(),
            tenant_template: env::var("TENANT_TEMPLATE")
                .unwrap_or_else(|_| "sql/tenant_template.sql".into())
                .into(),
            sentinel_table: env::var("SENTINEL_TABLE").unwrap_or_else(|_| "tenants".into()),
            operation_timeout: match env::var("OPERATION_TIMEOUT_SECS")
                .ok()
                .filter(|s| !s.is_empty())
            {
                Some(secs) => Some(Duration::from_secs(secs.parse()?)),
                None => None,
            },
            transactional_templates: env::var("TRANSACTIONAL_TEMPLATES")
                .unwrap_or_else(|_| "true".into())
                .parse()?,
            super_admin_key: env::var("SUPER_ADMIN_KEY").ok().filter(|s| !s.is_empty()),
        })
    }

    pub fn lifecycle_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            sentinel_table: self.sentinel_table.clone(),
            operation_timeout: self.operation_timeout,
            transactional_templates: self.transactional_templates,
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
