use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Logical names of the artifacts flowing through the pipeline.
pub mod names {
    pub const DOMAIN: &str = "domain";
    pub const PROBLEM: &str = "problem";
    pub const INTERMEDIATE: &str = "intermediate";
    pub const RESULT: &str = "result";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Text,
    Binary,
}

/// An immutable, named unit of data.
///
/// Content is shared, never copied on clone and never mutated. A stage that
/// transforms data produces a new `Artifact` under a new logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    logical_name: String,
    content: Arc<[u8]>,
    encoding: Encoding,
}

impl Artifact {
    pub fn text(logical_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content: String = content.into();
        Self {
            logical_name: logical_name.into(),
            content: Arc::from(content.into_bytes()),
            encoding: Encoding::Text,
        }
    }

    pub fn binary(logical_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content: Vec<u8> = content.into();
        Self {
            logical_name: logical_name.into(),
            content: Arc::from(content),
            encoding: Encoding::Binary,
        }
    }

    /// Text if the bytes are valid UTF-8, binary otherwise.
    pub fn detect(logical_name: impl Into<String>, content: Vec<u8>) -> Self {
        match String::from_utf8(content) {
            Ok(text) => Self::text(logical_name, text),
            Err(e) => Self::binary(logical_name, e.into_bytes()),
        }
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// UTF-8 view of the content; `None` for binary artifacts.
    pub fn as_text(&self) -> Option<&str> {
        match self.encoding {
            Encoding::Text => std::str::from_utf8(&self.content).ok(),
            Encoding::Binary => None,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// SHA-256 hex of the content.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.content()))
    }
}

/// Summary of an artifact for logs and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub logical_name: String,
    pub encoding: Encoding,
    pub bytes: usize,
    pub sha256: String,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        Self {
            logical_name: artifact.logical_name.clone(),
            encoding: artifact.encoding,
            bytes: artifact.len(),
            sha256: artifact.digest(),
        }
    }
}
