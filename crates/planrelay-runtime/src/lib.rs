//! Embedded runtimes for planrelay.
//!
//! A runtime is a WASI command module executed by Wasmtime. Each loaded
//! instance owns a private directory preopened as the guest's `/`; that
//! directory is the only channel between host and guest. See
//! [`RuntimeHandle`] for the write → invoke → read contract.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use planrelay_runtime::{
//!     EntryPoint, Invocation, ModuleDescriptor, RuntimeContext, RuntimeLoader, WasiLoader,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let loader = WasiLoader::new(Arc::new(RuntimeContext::new()?));
//! let descriptor = ModuleDescriptor::new("search", "/opt/planrelay/downward.wasm")
//!     .with_program("downward");
//!
//! let mut handle = loader.load(&descriptor).await?;
//! handle.write("output.sas", b"begin_version\n3\nend_version\n")?;
//! handle
//!     .invoke(&Invocation::new(
//!         EntryPoint::Main,
//!         vec!["--search".into(), "astar(lmcut())".into(), "--input".into(), "output.sas".into()],
//!     ))
//!     .await?;
//! let plan = handle.read("sas_plan")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fixture;
pub mod handle;
pub mod instance;
pub mod loader;
pub mod runtime_context;
pub mod state;
pub mod storage;
pub mod stub;
pub mod vfs;

pub use error::RuntimeError;
pub use handle::{BoxFuture, EmbeddedRuntime, EntryPoint, Invocation, InvocationLimits, RuntimeHandle};
pub use loader::{ModuleDescriptor, RuntimeLoader, WasiLoader};
pub use runtime_context::RuntimeContext;
pub use storage::ModuleCache;
pub use stub::{Journal, JournalEntry, StubLoader, StubRuntime};
pub use vfs::{DirFs, MemoryFs, VirtualFs};
