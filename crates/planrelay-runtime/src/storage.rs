use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wasmtime::{Engine, Module};

use crate::error::RuntimeError;

const PRECOMPILED_EXT: &str = "cwasm";
const METADATA_EXT: &str = "metadata.json";

/// Metadata stored next to a precompiled module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedModuleMeta {
    /// Runtime that first compiled this module (e.g. "translator")
    pub runtime: String,
    /// SHA-256 hex of the module bytes; also the cache key
    pub module_hash: String,
    pub module_bytes: u64,
    /// Compile timestamp (Unix ms)
    pub compiled_at: u64,
}

/// Disk-backed cache of compiled modules.
///
/// Layout under `base_dir`:
/// ```text
/// {base_dir}/
///   {sha256}.cwasm           - precompiled (Wasmtime serialized)
///   {sha256}.metadata.json   - CachedModuleMeta
/// ```
///
/// Only compiled code is cached. Nothing a module produces is stored here.
#[derive(Debug, Clone)]
pub struct ModuleCache {
    base_dir: PathBuf,
}

impl ModuleCache {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".planrelay")
            .join("modules")
    }

    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn cwasm_path(&self, module_hash: &str) -> PathBuf {
        self.base_dir.join(format!("{module_hash}.{PRECOMPILED_EXT}"))
    }

    pub fn meta_path(&self, module_hash: &str) -> PathBuf {
        self.base_dir.join(format!("{module_hash}.{METADATA_EXT}"))
    }

    /// Load the precompiled module for `bytes`, compiling and caching on a miss.
    pub fn load_or_compile(
        &self,
        runtime: &str,
        bytes: &[u8],
        engine: &Engine,
    ) -> Result<Module, RuntimeError> {
        let module_hash = hash_bytes(bytes);
        let cwasm_path = self.cwasm_path(&module_hash);

        if cwasm_path.exists() {
            if let Ok(cached) = self.load_precompiled(&cwasm_path, engine) {
                tracing::debug!(runtime, module_hash, "Loaded from precompiled cache");
                return Ok(cached);
            }
            tracing::debug!(runtime, module_hash, "Precompiled cache invalid, recompiling");
        }

        let module = compile(engine, runtime, bytes)?;

        match module.serialize() {
            Ok(serialized) => {
                if let Err(e) = self.store(&module_hash, runtime, bytes.len(), &serialized) {
                    tracing::debug!(runtime, "Failed to save precompiled cache: {e}");
                } else {
                    tracing::debug!(runtime, module_hash, "Saved precompiled cache");
                }
            }
            Err(e) => tracing::debug!(runtime, "Module not serializable: {e}"),
        }

        Ok(module)
    }

    fn store(
        &self,
        module_hash: &str,
        runtime: &str,
        module_bytes: usize,
        serialized: &[u8],
    ) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::write(self.cwasm_path(module_hash), serialized)?;
        let meta = CachedModuleMeta {
            runtime: runtime.to_string(),
            module_hash: module_hash.to_string(),
            module_bytes: module_bytes as u64,
            compiled_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        };
        std::fs::write(self.meta_path(module_hash), serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    /// List metadata of every cached module.
    pub fn list(&self) -> Result<Vec<CachedModuleMeta>, RuntimeError> {
        let mut metas = Vec::new();
        if !self.base_dir.exists() {
            return Ok(metas);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().ends_with(&format!(".{METADATA_EXT}")) {
                let content = std::fs::read_to_string(entry.path())
                    .map_err(|e| RuntimeError::StorageError(format!("{}: {e}", entry.path().display())))?;
                metas.push(serde_json::from_str(&content)?);
            }
        }
        Ok(metas)
    }

    fn load_precompiled(&self, path: &Path, engine: &Engine) -> Result<Module> {
        // SAFETY: the cwasm files are written by this cache with
        // `Module::serialize`; Wasmtime rejects artifacts produced by a
        // different version or engine configuration.
        unsafe { Module::deserialize_file(engine, path) }
    }
}

/// Compile module bytes (binary or WAT text) without caching.
pub fn compile(engine: &Engine, runtime: &str, bytes: &[u8]) -> Result<Module, RuntimeError> {
    Module::new(engine, bytes)
        .map_err(|e| RuntimeError::CompilationFailed(format!("{runtime}: {e}")))
}

/// SHA-256 hex digest of module bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_context::RuntimeContext;

    const NOOP: &str = r#"(module (func (export "_start")))"#;

    #[test]
    fn hash_is_stable_hex() {
        let a = hash_bytes(NOOP.as_bytes());
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_bytes(NOOP.as_bytes()));
        assert_ne!(a, hash_bytes(b"other"));
    }

    #[test]
    fn compiles_then_reuses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ModuleCache::new(tmp.path().to_path_buf());
        let context = RuntimeContext::new().unwrap();

        cache.load_or_compile("search", NOOP.as_bytes(), &context.engine).unwrap();
        let hash = hash_bytes(NOOP.as_bytes());
        assert!(cache.cwasm_path(&hash).exists());

        let metas = cache.list().unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].runtime, "search");
        assert_eq!(metas[0].module_hash, hash);

        // Second load comes from the precompiled file.
        let module = cache.load_or_compile("search", NOOP.as_bytes(), &context.engine).unwrap();
        assert!(module.get_export("_start").is_some());
    }

    #[test]
    fn corrupt_cache_entry_is_recompiled() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ModuleCache::new(tmp.path().to_path_buf());
        let context = RuntimeContext::new().unwrap();
        let hash = hash_bytes(NOOP.as_bytes());
        std::fs::write(cache.cwasm_path(&hash), b"not a module").unwrap();

        let module = cache.load_or_compile("search", NOOP.as_bytes(), &context.engine).unwrap();
        assert!(module.get_export("_start").is_some());
    }

    #[test]
    fn invalid_module_is_compilation_failure() {
        let context = RuntimeContext::new().unwrap();
        let err = compile(&context.engine, "search", b"\0asm garbage").unwrap_err();
        assert!(matches!(err, RuntimeError::CompilationFailed(_)));
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let cache = ModuleCache::new(PathBuf::from("/nonexistent/planrelay-cache"));
        assert!(cache.list().unwrap().is_empty());
    }
}
