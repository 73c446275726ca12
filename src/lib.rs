// Library exports for binaries and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use config::Config;
use services::schemas::SchemaService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub schemas: SchemaService,
    pub config: Arc<Config>,
}
