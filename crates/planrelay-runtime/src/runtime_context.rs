use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use wasmtime::{Config, Engine, Linker};

use crate::state::InvocationState;

/// Interval at which running guests are interrupted to check deadlines.
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Shared Wasmtime engine and linker.
///
/// `RuntimeContext` is constructed once and shared by every loader. The
/// engine is thread-safe; the linker is pre-configured with the WASI
/// preview 1 host functions, which is all a command module needs.
pub struct RuntimeContext {
    pub engine: Engine,
    pub linker: Linker<InvocationState>,
}

impl RuntimeContext {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        config.async_support(true);
        // Running guests yield at every epoch tick, so deadlines and
        // cancellation can drop the call future.
        config.epoch_interruption(true);

        let engine = Engine::new(&config)?;
        let mut linker: Linker<InvocationState> = Linker::new(&engine);

        wasmtime_wasi::preview1::add_to_linker_async(&mut linker, |state: &mut InvocationState| {
            &mut state.wasi
        })?;

        tracing::debug!("RuntimeContext initialized (async + epoch interruption + WASI preview1)");

        Ok(Self { engine, linker })
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new().expect("RuntimeContext::new should not fail with default config")
    }
}

/// Background thread advancing the engine epoch while an invocation runs.
///
/// Runs on its own OS thread: a spinning guest on a current-thread tokio
/// runtime never lets other tasks run until the epoch advances. The thread
/// is detached; it exits at its next tick after the ticker is dropped.
pub(crate) struct EpochTicker {
    stop: Arc<AtomicBool>,
}

impl EpochTicker {
    pub(crate) fn start(engine: Engine, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let spawned = std::thread::Builder::new()
            .name("planrelay-epoch".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(interval);
                    engine.increment_epoch();
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Failed to start epoch ticker: {e}");
        }
        Self { stop }
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
