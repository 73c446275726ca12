use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

use crate::error::{ErrorKind, SchemaResult};
use crate::models::tenant::DatabaseStats;

lazy_static! {
    pub static ref SCHEMA_OPERATIONS_COUNTER: CounterVec = register_counter_vec!(
        "schema_operations_total",
        "Schema lifecycle operations by operation and outcome",
        &["operation", "status"]
    ).unwrap();

    pub static ref TENANT_SCHEMAS_GAUGE: Gauge = register_gauge!(
        "tenant_schemas_total",
        "Live tenant schemas"
    ).unwrap();

    pub static ref BACKUP_SCHEMAS_GAUGE: Gauge = register_gauge!(
        "tenant_backup_schemas_total",
        "Backup schemas kept in the database"
    ).unwrap();

    pub static ref TENANT_SCHEMA_TABLES_GAUGE: GaugeVec = register_gauge_vec!(
        "tenant_schema_tables",
        "Base tables per tenant schema",
        &["schema"]
    ).unwrap();
}

fn status_label<T>(result: &SchemaResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => match e.kind() {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::StatementExecution => "statement_error",
            ErrorKind::PartialApplication => "partial",
            ErrorKind::Database => "database_error",
        },
    }
}

pub fn record_operation<T>(operation: &str, result: &SchemaResult<T>) {
    SCHEMA_OPERATIONS_COUNTER
        .with_label_values(&[operation, status_label(result)])
        .inc();
}

pub fn observe_stats(stats: &DatabaseStats) {
    TENANT_SCHEMAS_GAUGE.set(stats.tenant_schemas.len() as f64);
    BACKUP_SCHEMAS_GAUGE.set(stats.backup_schemas as f64);
    // Dropped tenants must not linger as stale series.
    TENANT_SCHEMA_TABLES_GAUGE.reset();
    for schema in &stats.tenant_schemas {
        TENANT_SCHEMA_TABLES_GAUGE
            .with_label_values(&[schema.schema.as_str()])
            .set(schema.tables as f64);
    }
}
