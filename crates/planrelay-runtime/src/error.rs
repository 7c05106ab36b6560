use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Bootstrap failed for {runtime}: {reason}")]
    BootstrapFailed { runtime: String, reason: String },

    #[error("Compilation failed: {0}")]
    CompilationFailed(String),

    #[error("Instantiation failed: {0}")]
    InstantiationFailed(String),

    #[error("Package install failed: {package}: {reason}")]
    PackageInstallFailed { package: String, reason: String },

    #[error("Entry point not found: {0}")]
    EntryPointNotFound(String),

    #[error("Invocation failed: {0}")]
    InvocationFailed(String),

    #[error("Exited with status {code}")]
    Exited { code: i32 },

    #[error("Deadline of {millis} ms exceeded")]
    DeadlineExceeded { millis: u64 },

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("File not found in runtime filesystem: {0}")]
    NotFound(String),

    #[error("Invalid runtime filesystem path: {0:?}")]
    InvalidPath(String),

    #[error("Runtime handle misuse: {0}")]
    HandleMisuse(&'static str),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
