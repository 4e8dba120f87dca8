use thiserror::Error;

/// Why a schema snapshot could not be produced. Always fatal to the
/// current request; a snapshot is all-or-nothing.
#[derive(Error, Debug)]
pub enum IntrospectionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

/// Malformed candidate SQL. Carries a bounded snippet of the input head
/// for diagnostics, never the full original text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (near `{snippet}`)")]
pub struct ParseError {
    pub message: String,
    pub snippet: String,
}

/// Failures owned by the Executor collaborator. The core only forwards
/// these; it never executes reviewed statements itself.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("introspection error: {0}")]
    Introspection(#[from] IntrospectionError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
