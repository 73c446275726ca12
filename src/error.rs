use std::path::PathBuf;

/// Broad classification of a [`SchemaError`], used by callers to decide whether to retry,
/// page an operator or treat the failure as a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A SQL asset is missing. Needs operator intervention.
    Configuration,
    /// Bad tenant id or backup name. Always a caller bug.
    InvalidArgument,
    /// A single statement failed; nothing it touched was kept.
    StatementExecution,
    /// The operation stopped partway and left state behind.
    PartialApplication,
    /// Connection-level or catalog failure outside any statement.
    Database,
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("SQL script not found at {}", .path.display())]
    ScriptNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("statement #{index} failed: {statement}")]
    Statement {
        index: usize,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement #{index} exceeded its deadline: {statement}")]
    StatementTimeout { index: usize, statement: String },

    #[error("global database setup failed, no changes were kept")]
    DatabaseSetup(#[source] Box<SchemaError>),

    #[error("{operation} of {schema} stopped after {completed} completed step(s), left partial")]
    PartialApplication {
        operation: &'static str,
        schema: String,
        completed: usize,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("failed to drop schema {schema}")]
    SchemaDrop {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("backup {0} not found")]
    BackupNotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::InvalidArgument(_) | SchemaError::BackupNotFound(_) => {
                ErrorKind::InvalidArgument
            }
            SchemaError::ScriptNotFound { .. } => ErrorKind::Configuration,
            SchemaError::Statement { .. } | SchemaError::StatementTimeout { .. } => {
                ErrorKind::StatementExecution
            }
            SchemaError::PartialApplication { .. } => ErrorKind::PartialApplication,
            SchemaError::DatabaseSetup(inner) => inner.kind(),
            SchemaError::SchemaDrop { .. } | SchemaError::Database(_) => ErrorKind::Database,
        }
    }

    /// Only connection-level failures and timeouts are worth an automatic retry. Statement
    /// failures need their cause fixed first, partial application needs cleanup first.
    pub fn is_retryable(&self) -> bool {
        match self {
            SchemaError::StatementTimeout { .. } => true,
            SchemaError::Database(e) | SchemaError::SchemaDrop { source: e, .. } => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            SchemaError::DatabaseSetup(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Wraps a failure that happened after `completed` steps already took effect.
    /// With nothing completed the original error is returned untouched.
    pub(crate) fn partial(
        operation: &'static str,
        schema: &str,
        completed: usize,
        source: SchemaError,
    ) -> SchemaError {
        if completed == 0 {
            return source;
        }
        SchemaError::PartialApplication {
            operation,
            schema: schema.to_string(),
            completed,
            source: Box::new(source),
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;
