use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use planrelay_runtime::BoxFuture;
use tokio::io::AsyncWriteExt;

use crate::artifact::Artifact;
use crate::error::PipelineError;

/// Receives the final artifact of a successful run.
///
/// Only called from the `Publishing` state; a failed run publishes nothing.
pub trait Publisher: Send + Sync {
    fn publish<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<(), PipelineError>>;
}

/// Writes the artifact content to stdout.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(artifact.content())
                .await
                .map_err(|e| PipelineError::Publish(format!("stdout: {e}")))?;
            stdout
                .flush()
                .await
                .map_err(|e| PipelineError::Publish(format!("stdout: {e}")))
        })
    }
}

/// Writes the artifact to a file, replacing any previous content.
#[derive(Debug)]
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Publisher for FilePublisher {
    fn publish<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            tokio::fs::write(&self.path, artifact.content())
                .await
                .map_err(|e| PipelineError::Publish(format!("{}: {e}", self.path.display())))?;
            tracing::info!(
                path = %self.path.display(),
                bytes = artifact.len(),
                "Plan written"
            );
            Ok(())
        })
    }
}

/// Collects published artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<Artifact>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Artifact> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Publisher for MemoryPublisher {
    fn publish<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            self.published
                .lock()
                .map_err(|_| PipelineError::Publish("publisher lock poisoned".into()))?
                .push(artifact.clone());
            Ok(())
        })
    }
}
