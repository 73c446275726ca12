pub mod health;
pub mod metrics;
pub mod tenants;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use crate::error::{ErrorKind, SchemaError};

pub type ApiError = (StatusCode, Json<Value>);

/// Maps a lifecycle error to a JSON error response.
pub fn error_response(e: SchemaError) -> ApiError {
    let status = match (&e, e.kind()) {
        (SchemaError::BackupNotFound(_), _) => StatusCode::NOT_FOUND,
        (_, ErrorKind::InvalidArgument) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::Database) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("{e:#}");
    }

    // Surface the underlying cause (failing statement, database message) as well.
    let mut details = Vec::new();
    let mut source = std::error::Error::source(&e);
    while let Some(cause) = source {
        details.push(cause.to_string());
        source = cause.source();
    }

    (
        status,
        Json(json!({
            "error": e.to_string(),
            "kind": format!("{:?}", e.kind()),
            "partial": e.kind() == ErrorKind::PartialApplication,
            "details": details,
        })),
    )
}
