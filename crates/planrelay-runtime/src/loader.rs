use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RuntimeError;
use crate::handle::{BoxFuture, RuntimeHandle};
use crate::instance::WasiRuntime;
use crate::runtime_context::RuntimeContext;
use crate::storage::{self, ModuleCache};
use crate::vfs::DirFs;

const DEFAULT_PACKAGE_MOUNT: &str = "/lib";

/// Where a runtime comes from and what it needs before it is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Runtime name used in logs and errors (e.g. "translator")
    pub name: String,
    /// Path to the WASI command module (binary or WAT)
    pub bootstrap: PathBuf,
    /// `argv[0]` passed to the guest
    pub program: String,
    /// Directory holding one subdirectory per installable package
    pub index_dir: Option<PathBuf>,
    /// Packages copied into the runtime filesystem before it is handed out
    pub packages: Vec<String>,
    /// Guest directory packages are installed under
    pub package_mount: String,
    /// Environment visible to the guest
    pub env: Vec<(String, String)>,
    /// Upper bound on the whole load, enforced by the caller
    pub load_timeout: Option<Duration>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, bootstrap: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            program: name.clone(),
            name,
            bootstrap: bootstrap.into(),
            index_dir: None,
            packages: Vec::new(),
            package_mount: DEFAULT_PACKAGE_MOUNT.into(),
            env: Vec::new(),
            load_timeout: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_packages(mut self, index_dir: impl Into<PathBuf>, packages: Vec<String>) -> Self {
        self.index_dir = Some(index_dir.into());
        self.packages = packages;
        self
    }

    pub fn with_package_mount(mut self, mount: impl Into<String>) -> Self {
        self.package_mount = mount.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }
}

/// Loads runtimes on demand.
///
/// Every call returns a new, fully initialized instance with its own
/// filesystem. Loaders never hand out a runtime that is still starting up.
pub trait RuntimeLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        descriptor: &'a ModuleDescriptor,
    ) -> BoxFuture<'a, Result<RuntimeHandle, RuntimeError>>;
}

/// Loader for WASI command modules executed by Wasmtime.
pub struct WasiLoader {
    context: Arc<RuntimeContext>,
    cache: Option<ModuleCache>,
}

impl WasiLoader {
    pub fn new(context: Arc<RuntimeContext>) -> Self {
        Self {
            context,
            cache: None,
        }
    }

    /// Reuse precompiled modules from `cache`.
    pub fn with_cache(mut self, cache: ModuleCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn load_module(&self, descriptor: &ModuleDescriptor) -> Result<RuntimeHandle, RuntimeError> {
        let runtime = descriptor.name.clone();
        tracing::info!(
            runtime,
            bootstrap = %descriptor.bootstrap.display(),
            "Loading runtime"
        );

        let bytes = tokio::fs::read(&descriptor.bootstrap)
            .await
            .map_err(|e| RuntimeError::BootstrapFailed {
                runtime: runtime.clone(),
                reason: format!("cannot read {}: {e}", descriptor.bootstrap.display()),
            })?;

        // Compilation is CPU-bound; keep it off the async workers.
        let engine = self.context.engine.clone();
        let cache = self.cache.clone();
        let name = runtime.clone();
        let module = tokio::task::spawn_blocking(move || match cache {
            Some(cache) => cache.load_or_compile(&name, &bytes, &engine),
            None => storage::compile(&engine, &name, &bytes),
        })
        .await
        .map_err(|e| RuntimeError::CompilationFailed(format!("{runtime}: {e}")))??;

        // Every import must resolve against the WASI linker before the
        // runtime counts as ready.
        let instance_pre = self
            .context
            .linker
            .instantiate_pre(&module)
            .map_err(|e| RuntimeError::InstantiationFailed(format!("{runtime}: {e}")))?;

        let mut fs = DirFs::new()?;
        install_packages(&mut fs, descriptor)?;

        let instance = WasiRuntime::new(
            self.context.engine.clone(),
            instance_pre,
            fs,
            descriptor.program.clone(),
            descriptor.env.clone(),
        );

        tracing::info!(runtime, packages = descriptor.packages.len(), "Runtime loaded and ready");
        Ok(RuntimeHandle::new(runtime, Box::new(instance)))
    }
}

impl RuntimeLoader for WasiLoader {
    fn load<'a>(
        &'a self,
        descriptor: &'a ModuleDescriptor,
    ) -> BoxFuture<'a, Result<RuntimeHandle, RuntimeError>> {
        Box::pin(self.load_module(descriptor))
    }
}

fn install_packages(fs: &mut DirFs, descriptor: &ModuleDescriptor) -> Result<(), RuntimeError> {
    if descriptor.packages.is_empty() {
        return Ok(());
    }

    let index_dir = descriptor.index_dir.as_ref().ok_or_else(|| {
        RuntimeError::PackageInstallFailed {
            package: descriptor.packages.join(","),
            reason: "no package index configured".into(),
        }
    })?;

    for package in &descriptor.packages {
        let src = index_dir.join(package);
        if !src.is_dir() {
            return Err(RuntimeError::PackageInstallFailed {
                package: package.clone(),
                reason: format!("not found in index {}", index_dir.display()),
            });
        }
        let dest = format!("{}/{package}", descriptor.package_mount.trim_end_matches('/'));
        let files = fs
            .copy_tree(&src, &dest)
            .map_err(|e| RuntimeError::PackageInstallFailed {
                package: package.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(runtime = %descriptor.name, package, files, dest, "Package installed");
    }
    Ok(())
}
