use std::path::Path;

use wasmtime::{StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use crate::handle::InvocationLimits;

/// Per-invocation guest state.
///
/// A fresh `InvocationState` is created for every entry point call, so
/// nothing survives between runtimes except what is in their filesystem.
///
/// Sandbox posture:
/// - One preopen: the runtime's private directory, mounted at `/`
/// - Only the environment variables listed in the module descriptor
/// - No stdin; stdout/stderr are not forwarded
pub struct InvocationState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) limits: StoreLimits,
}

impl InvocationState {
    pub fn new(
        root: &Path,
        argv: &[String],
        env: &[(String, String)],
        limits: &InvocationLimits,
    ) -> anyhow::Result<Self> {
        let mut builder = WasiCtxBuilder::new();
        builder.args(argv);
        builder.envs(env);
        builder.preopened_dir(root, "/", DirPerms::all(), FilePerms::all())?;
        let wasi = builder.build_p1();

        let mut store_limits = StoreLimitsBuilder::new();
        if let Some(bytes) = limits.memory_bytes {
            store_limits = store_limits.memory_size(bytes);
        }

        Ok(Self {
            wasi,
            limits: store_limits.build(),
        })
    }
}
