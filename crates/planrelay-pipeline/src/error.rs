use planrelay_runtime::RuntimeError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("retrieval failed for {path}: {reason}")]
    Retrieval { path: String, reason: String },

    #[error("failed to load runtime {runtime}: {reason}")]
    Load { runtime: String, reason: String },

    #[error("{runtime} entry point {entry_point} failed: {reason}")]
    Invocation {
        runtime: String,
        entry_point: String,
        reason: String,
    },

    #[error("{runtime} did not produce expected output {path}")]
    NotFound { runtime: String, path: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Error classification surfaced in a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Retrieval,
    Load,
    Invocation,
    NotFound,
    Publish,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Retrieval => write!(f, "retrieval_error"),
            ErrorKind::Load => write!(f, "load_error"),
            ErrorKind::Invocation => write!(f, "invocation_error"),
            ErrorKind::NotFound => write!(f, "not_found_error"),
            ErrorKind::Publish => write!(f, "publish_error"),
            ErrorKind::Config => write!(f, "config_error"),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Retrieval { .. } => ErrorKind::Retrieval,
            PipelineError::Load { .. } => ErrorKind::Load,
            PipelineError::Invocation { .. } => ErrorKind::Invocation,
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
            PipelineError::Publish(_) => ErrorKind::Publish,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    /// Classify a runtime failure that happened while loading `runtime`.
    pub fn load(runtime: &str, err: RuntimeError) -> Self {
        PipelineError::Load {
            runtime: runtime.to_string(),
            reason: err.to_string(),
        }
    }
}
