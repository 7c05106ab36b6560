use std::collections::HashMap;
use std::path::PathBuf;

use planrelay_runtime::BoxFuture;

use crate::artifact::Artifact;
use crate::error::PipelineError;

/// Facade for retrieving initial artifacts.
///
/// Each `fetch` performs exactly one retrieval; nothing is cached.
pub trait ArtifactSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        logical_name: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Artifact, PipelineError>>;
}

/// Fetches `GET {base_url}/{path}`.
pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl ArtifactSource for HttpSource {
    fn fetch<'a>(
        &'a self,
        logical_name: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Artifact, PipelineError>> {
        Box::pin(async move {
            let url = self.url(path);
            let retrieval = |reason: String| PipelineError::Retrieval {
                path: url.clone(),
                reason,
            };

            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| retrieval(format!("HTTP request failed: {e}")))?;

            if !resp.status().is_success() {
                return Err(retrieval(format!("server returned {}", resp.status())));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| retrieval(format!("transfer aborted: {e}")))?;

            tracing::debug!(url, bytes = body.len(), "Fetched artifact");
            Ok(Artifact::detect(logical_name, body.to_vec()))
        })
    }
}

/// Reads `{base_dir}/{path}` from the local filesystem.
pub struct FileSource {
    base_dir: PathBuf,
}

impl FileSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl ArtifactSource for FileSource {
    fn fetch<'a>(
        &'a self,
        logical_name: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Artifact, PipelineError>> {
        Box::pin(async move {
            let full = self.base_dir.join(path);
            let content = tokio::fs::read(&full)
                .await
                .map_err(|e| PipelineError::Retrieval {
                    path: full.display().to_string(),
                    reason: e.to_string(),
                })?;
            tracing::debug!(path = %full.display(), bytes = content.len(), "Read artifact");
            Ok(Artifact::detect(logical_name, content))
        })
    }
}

/// In-memory source keyed by path.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(path.into(), content.into());
        self
    }
}

impl ArtifactSource for StaticSource {
    fn fetch<'a>(
        &'a self,
        logical_name: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<Artifact, PipelineError>> {
        Box::pin(async move {
            self.entries
                .get(path)
                .map(|content| Artifact::detect(logical_name, content.clone()))
                .ok_or_else(|| PipelineError::Retrieval {
                    path: path.to_string(),
                    reason: "404 Not Found".into(),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn http_url_joins_without_double_slash() {
        let source = HttpSource::new("http://localhost:8000/files/");
        assert_eq!(source.url("/domain.pddl"), "http://localhost:8000/files/domain.pddl");
        assert_eq!(source.url("problem.pddl"), "http://localhost:8000/files/problem.pddl");
    }

    #[tokio::test]
    async fn http_source_unreachable_is_retrieval_error() {
        let source = HttpSource::new("http://127.0.0.1:9");
        let err = source.fetch("domain", "domain.pddl").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Retrieval);
    }

    #[tokio::test]
    async fn http_source_non_success_status_is_retrieval_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let source = HttpSource::new(format!("http://{addr}"));
        let err = source.fetch("problem", "problem.pddl").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Retrieval);
        let message = err.to_string();
        assert!(message.contains("404"), "{message}");
        assert!(message.contains("problem.pddl"), "{message}");
    }

    #[tokio::test]
    async fn file_source_reads_relative_to_base() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("domain.pddl"), "(define (domain d))").unwrap();

        let source = FileSource::new(tmp.path());
        let artifact = source.fetch("domain", "domain.pddl").await.unwrap();
        assert_eq!(artifact.logical_name(), "domain");
        assert_eq!(artifact.as_text(), Some("(define (domain d))"));
    }

    #[tokio::test]
    async fn file_source_missing_file_is_retrieval_error() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FileSource::new(tmp.path());
        let err = source.fetch("problem", "problem.pddl").await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval { .. }));
    }

    #[tokio::test]
    async fn static_source_returns_copies_under_requested_name() {
        let source = StaticSource::new().with("p.pddl", "(define (problem p))");
        let artifact = source.fetch("problem", "p.pddl").await.unwrap();
        assert_eq!(artifact.logical_name(), "problem");
        assert!(source.fetch("domain", "d.pddl").await.is_err());
    }
}
