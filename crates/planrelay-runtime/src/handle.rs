use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::vfs::VirtualFs;

/// Boxed future returned by runtime trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What to call inside a loaded runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// The command's `_start`, with `argv = [program, args...]`.
    Main,
    /// A named zero-argument export. Arguments are still visible via argv.
    Export(String),
    /// Interpreter source text, run as `argv = [program, "-c", source, args...]`.
    RunCode(String),
}

impl EntryPoint {
    /// Build the full argv for this entry point.
    pub fn argv(&self, program: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![program.to_string()];
        if let EntryPoint::RunCode(source) = self {
            argv.push("-c".into());
            argv.push(source.clone());
        }
        argv.extend(args.iter().cloned());
        argv
    }

    /// Name of the export that is called.
    pub fn export_name(&self) -> &str {
        match self {
            EntryPoint::Main | EntryPoint::RunCode(_) => "_start",
            EntryPoint::Export(name) => name,
        }
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryPoint::Main => write!(f, "main"),
            EntryPoint::Export(name) => write!(f, "export:{name}"),
            EntryPoint::RunCode(_) => write!(f, "run_code"),
        }
    }
}

/// Resource limits applied to a single invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationLimits {
    /// Wall-clock deadline for the entry point call.
    pub deadline: Option<Duration>,
    /// Upper bound on linear memory, in bytes.
    pub memory_bytes: Option<usize>,
}

/// A fully described call into a runtime.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub entry_point: EntryPoint,
    pub args: Vec<String>,
    pub limits: InvocationLimits,
    pub cancel: CancellationToken,
}

impl Invocation {
    pub fn new(entry_point: EntryPoint, args: Vec<String>) -> Self {
        Self {
            entry_point,
            args,
            limits: InvocationLimits::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_limits(mut self, limits: InvocationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One loaded, initialized runtime instance.
///
/// Implementations own their filesystem. They never see more than one
/// invocation; [`RuntimeHandle`] guarantees that.
pub trait EmbeddedRuntime: Send {
    fn fs(&self) -> &dyn VirtualFs;

    fn fs_mut(&mut self) -> &mut dyn VirtualFs;

    fn invoke<'a>(&'a mut self, invocation: &'a Invocation) -> BoxFuture<'a, Result<(), RuntimeError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Staging,
    Invoking,
    Finished,
}

/// Exclusive handle on a loaded runtime.
///
/// The handle is single-use. Files may be written only before the
/// invocation, the entry point runs at most once, and outputs may be read
/// only after the invocation has completed successfully. Misuse is reported
/// as [`RuntimeError::HandleMisuse`].
pub struct RuntimeHandle {
    runtime_name: String,
    inner: Box<dyn EmbeddedRuntime>,
    phase: Phase,
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("runtime_name", &self.runtime_name)
            .field("phase", &self.phase)
            .finish()
    }
}

impl RuntimeHandle {
    pub fn new(runtime_name: impl Into<String>, inner: Box<dyn EmbeddedRuntime>) -> Self {
        Self {
            runtime_name: runtime_name.into(),
            inner,
            phase: Phase::Staging,
        }
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn write(&mut self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        if self.phase != Phase::Staging {
            return Err(RuntimeError::HandleMisuse("write after invocation started"));
        }
        self.inner.fs_mut().write(path, content)
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        if self.phase != Phase::Finished {
            return Err(RuntimeError::HandleMisuse("read before invocation completed"));
        }
        self.inner.fs().read(path)
    }

    pub async fn invoke(&mut self, invocation: &Invocation) -> Result<(), RuntimeError> {
        if self.phase != Phase::Staging {
            return Err(RuntimeError::HandleMisuse("runtime already invoked"));
        }
        self.phase = Phase::Invoking;
        tracing::debug!(
            runtime = %self.runtime_name,
            entry_point = %invocation.entry_point,
            args = ?invocation.args,
            "Invoking runtime"
        );
        self.inner.invoke(invocation).await?;
        self.phase = Phase::Finished;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubRuntime;

    fn handle() -> RuntimeHandle {
        RuntimeHandle::new("stub", Box::new(StubRuntime::new(|_, _| Ok(()))))
    }

    #[test]
    fn argv_for_main_prefixes_program() {
        let argv = EntryPoint::Main.argv("downward", &["--search".into(), "astar(lmcut())".into()]);
        assert_eq!(argv, vec!["downward", "--search", "astar(lmcut())"]);
    }

    #[test]
    fn argv_for_run_code_uses_dash_c() {
        let argv = EntryPoint::RunCode("import sys".into()).argv("python", &["a".into()]);
        assert_eq!(argv, vec!["python", "-c", "import sys", "a"]);
        assert_eq!(EntryPoint::RunCode(String::new()).export_name(), "_start");
        assert_eq!(EntryPoint::Export("solve".into()).export_name(), "solve");
    }

    #[tokio::test]
    async fn read_before_invoke_is_rejected() {
        let mut h = handle();
        h.write("domain.pddl", b"(define)").unwrap();
        assert!(matches!(h.read("domain.pddl"), Err(RuntimeError::HandleMisuse(_))));
    }

    #[tokio::test]
    async fn write_after_invoke_is_rejected() {
        let mut h = handle();
        h.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap();
        assert!(matches!(h.write("late.txt", b"x"), Err(RuntimeError::HandleMisuse(_))));
    }

    #[tokio::test]
    async fn second_invoke_is_rejected() {
        let mut h = handle();
        let call = Invocation::new(EntryPoint::Main, vec![]);
        h.invoke(&call).await.unwrap();
        assert!(matches!(h.invoke(&call).await, Err(RuntimeError::HandleMisuse(_))));
    }

    #[tokio::test]
    async fn failed_invoke_keeps_outputs_unreadable() {
        let mut h = RuntimeHandle::new(
            "stub",
            Box::new(StubRuntime::new(|_, _| Err(RuntimeError::Exited { code: 4 }))),
        );
        let err = h.invoke(&Invocation::new(EntryPoint::Main, vec![])).await;
        assert!(matches!(err, Err(RuntimeError::Exited { code: 4 })));
        assert!(matches!(h.read("sas_plan"), Err(RuntimeError::HandleMisuse(_))));
    }
}
