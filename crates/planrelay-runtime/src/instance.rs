use wasmtime::{Engine, InstancePre, Store};
use wasmtime_wasi::I32Exit;

use crate::error::RuntimeError;
use crate::handle::{BoxFuture, EmbeddedRuntime, EntryPoint, Invocation};
use crate::runtime_context::{EPOCH_TICK, EpochTicker};
use crate::state::InvocationState;
use crate::vfs::{DirFs, VirtualFs};

/// A WASI command module instance bound to its private directory.
pub struct WasiRuntime {
    engine: Engine,
    instance_pre: InstancePre<InvocationState>,
    fs: DirFs,
    program: String,
    env: Vec<(String, String)>,
}

impl WasiRuntime {
    pub(crate) fn new(
        engine: Engine,
        instance_pre: InstancePre<InvocationState>,
        fs: DirFs,
        program: String,
        env: Vec<(String, String)>,
    ) -> Self {
        Self {
            engine,
            instance_pre,
            fs,
            program,
            env,
        }
    }

    async fn run(&mut self, invocation: &Invocation) -> Result<(), RuntimeError> {
        let argv = invocation.entry_point.argv(&self.program, &invocation.args);
        let state = InvocationState::new(self.fs.root(), &argv, &self.env, &invocation.limits)
            .map_err(|e| RuntimeError::InvocationFailed(format!("{}: {e}", self.program)))?;

        let mut store = Store::new(&self.engine, state);
        store.limiter(|state| &mut state.limits);
        store.set_epoch_deadline(1);
        store.epoch_deadline_async_yield_and_update(1);

        let _ticker = EpochTicker::start(self.engine.clone(), EPOCH_TICK);

        let deadline = invocation.limits.deadline;
        let expired = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping the call future on expiry or cancellation tears down the
        // guest; the store is never used again.
        tokio::select! {
            result = call_entry(&self.instance_pre, &mut store, &invocation.entry_point) => result,
            _ = expired => Err(RuntimeError::DeadlineExceeded {
                millis: deadline.map(|d| d.as_millis() as u64).unwrap_or_default(),
            }),
            _ = invocation.cancel.cancelled() => Err(RuntimeError::Cancelled),
        }
    }
}

impl EmbeddedRuntime for WasiRuntime {
    fn fs(&self) -> &dyn VirtualFs {
        &self.fs
    }

    fn fs_mut(&mut self) -> &mut dyn VirtualFs {
        &mut self.fs
    }

    fn invoke<'a>(&'a mut self, invocation: &'a Invocation) -> BoxFuture<'a, Result<(), RuntimeError>> {
        Box::pin(self.run(invocation))
    }
}

async fn call_entry(
    instance_pre: &InstancePre<InvocationState>,
    store: &mut Store<InvocationState>,
    entry_point: &EntryPoint,
) -> Result<(), RuntimeError> {
    let instance = instance_pre
        .instantiate_async(&mut *store)
        .await
        .map_err(|e| RuntimeError::InstantiationFailed(e.to_string()))?;

    let export = entry_point.export_name();
    let func = instance
        .get_typed_func::<(), ()>(&mut *store, export)
        .map_err(|e| RuntimeError::EntryPointNotFound(format!("{export}: {e}")))?;

    match func.call_async(&mut *store, ()).await {
        Ok(()) => Ok(()),
        Err(e) => exit_status(e),
    }
}

/// Map a trap to an exit status. `proc_exit(0)` is a success.
fn exit_status(err: anyhow::Error) -> Result<(), RuntimeError> {
    if let Some(exit) = err.downcast_ref::<I32Exit>() {
        return match exit.0 {
            0 => Ok(()),
            code => Err(RuntimeError::Exited { code }),
        };
    }
    Err(RuntimeError::InvocationFailed(format!("{err:#}")))
}
