use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenant_schema_api::{
    config::Config, db, routes, services::schemas::SchemaService, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    if config.super_admin_key.is_none() {
        anyhow::bail!("Missing required env var: SUPER_ADMIN_KEY");
    }
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    let schemas = SchemaService::from_config(pool, &config);
    let outcome = schemas.run_initial_setup().await?;
    info!("Database connected, global setup: {outcome:?}");

    let state = AppState {
        schemas,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Super-admin
        .route("/super-admin/stats", get(routes::tenants::database_stats))
        .route(
            "/super-admin/tenants/{tenant_id}/schema",
            get(routes::tenants::get_tenant_schema)
                .post(routes::tenants::create_tenant_schema)
                .delete(routes::tenants::drop_tenant_schema),
        )
        .route(
            "/super-admin/tenants/{tenant_id}/backups",
            get(routes::tenants::list_backups).post(routes::tenants::create_backup),
        )
        .route(
            "/super-admin/tenants/{tenant_id}/backups/{backup_name}",
            delete(routes::tenants::delete_backup),
        )
        .route(
            "/super-admin/tenants/{tenant_id}/restore",
            post(routes::tenants::restore_backup),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("tenant schema API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
