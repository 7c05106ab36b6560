//! Private per-runtime filesystems.
//!
//! Every loaded runtime owns exactly one [`VirtualFs`]. It is the only
//! channel between the host and the guest: the host writes inputs before the
//! invocation and reads outputs after it.
//!
//! Paths are guest paths. A leading `/` and `.` segments are dropped, so
//! `"/output.sas"`, `"./output.sas"` and `"output.sas"` name the same file.
//! `..` segments are rejected rather than resolved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::error::RuntimeError;

/// Read/write access to one runtime's private filesystem.
pub trait VirtualFs: Send + Sync {
    fn write(&mut self, path: &str, content: &[u8]) -> Result<(), RuntimeError>;

    /// Fails with [`RuntimeError::NotFound`] when `path` has not been written.
    fn read(&self, path: &str) -> Result<Vec<u8>, RuntimeError>;

    fn exists(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }
}

/// Normalize a guest path into `a/b/c` form.
pub fn normalize(path: &str) -> Result<String, RuntimeError> {
    let mut parts = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(RuntimeError::InvalidPath(path.to_string())),
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(RuntimeError::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// In-memory filesystem used by the stub runtime.
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VirtualFs for MemoryFs {
    fn write(&mut self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        let key = normalize(path)?;
        self.files.insert(key, Arc::from(content));
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let key = normalize(path)?;
        self.files
            .get(&key)
            .map(|bytes| bytes.to_vec())
            .ok_or(RuntimeError::NotFound(key))
    }
}

/// Directory-backed filesystem.
///
/// The backing directory is a fresh temporary directory that is removed when
/// the `DirFs` is dropped. The Wasmtime backend preopens it as the guest's
/// `/`, so whatever the guest writes there is visible to [`VirtualFs::read`].
#[derive(Debug)]
pub struct DirFs {
    root: TempDir,
}

impl DirFs {
    pub fn new() -> Result<Self, RuntimeError> {
        let root = tempfile::Builder::new().prefix("planrelay-vfs-").tempdir()?;
        Ok(Self { root })
    }

    /// Host path of the filesystem root.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    fn host_path(&self, path: &str) -> Result<PathBuf, RuntimeError> {
        let normalized = normalize(path)?;
        Ok(self.root.path().join(normalized))
    }

    /// Recursively copy a host directory into the filesystem under `dest`.
    pub fn copy_tree(&mut self, src: &Path, dest: &str) -> Result<usize, RuntimeError> {
        let dest_root = self.host_path(dest)?;
        copy_dir(src, &dest_root)
    }
}

fn copy_dir(src: &Path, dest: &Path) -> Result<usize, RuntimeError> {
    std::fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

impl VirtualFs for DirFs {
    fn write(&mut self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        let target = self.host_path(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        tracing::debug!(path, bytes = content.len(), "vfs write");
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let target = self.host_path(path)?;
        match std::fs::read(&target) {
            Ok(bytes) => {
                tracing::debug!(path, bytes = bytes.len(), "vfs read");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RuntimeError::NotFound(normalize(path)?))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).map(|p| p.is_file()).unwrap_or(false)
    }
}
