//! In-process runtime double.
//!
//! `StubLoader` hands out [`StubRuntime`]s backed by a [`MemoryFs`]; the
//! "guest" is a Rust closure. Every load, write, invocation and read is
//! appended to a shared [`Journal`] so callers can check ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::RuntimeError;
use crate::handle::{BoxFuture, EmbeddedRuntime, Invocation, RuntimeHandle};
use crate::loader::{ModuleDescriptor, RuntimeLoader};
use crate::vfs::{MemoryFs, VirtualFs};

/// Guest behavior: receives the invocation and the runtime filesystem.
pub type StubBehavior =
    Arc<dyn Fn(&Invocation, &mut MemoryFs) -> Result<(), RuntimeError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Loaded(String),
    Write(String),
    Invoke(Vec<String>),
    Read(String),
}

/// Shared, append-only record of stub runtime activity.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<JournalEntry>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: JournalEntry) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push(entry);
        }
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// Memory filesystem that records its traffic.
struct JournaledFs {
    inner: MemoryFs,
    journal: Journal,
}

impl VirtualFs for JournaledFs {
    fn write(&mut self, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
        self.journal.push(JournalEntry::Write(path.to_string()));
        self.inner.write(path, content)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, RuntimeError> {
        self.journal.push(JournalEntry::Read(path.to_string()));
        self.inner.read(path)
    }
}

pub struct StubRuntime {
    fs: JournaledFs,
    behavior: StubBehavior,
}

impl StubRuntime {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&Invocation, &mut MemoryFs) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        Self::with_behavior(Arc::new(behavior), Journal::new())
    }

    fn with_behavior(behavior: StubBehavior, journal: Journal) -> Self {
        Self {
            fs: JournaledFs {
                inner: MemoryFs::new(),
                journal,
            },
            behavior,
        }
    }
}

impl EmbeddedRuntime for StubRuntime {
    fn fs(&self) -> &dyn VirtualFs {
        &self.fs
    }

    fn fs_mut(&mut self) -> &mut dyn VirtualFs {
        &mut self.fs
    }

    fn invoke<'a>(&'a mut self, invocation: &'a Invocation) -> BoxFuture<'a, Result<(), RuntimeError>> {
        Box::pin(async move {
            self.fs.journal.push(JournalEntry::Invoke(invocation.args.clone()));
            if invocation.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            // Yield once so callers observe the call as asynchronous.
            tokio::task::yield_now().await;
            (self.behavior)(invocation, &mut self.fs.inner)
        })
    }
}

/// Loader producing fresh [`StubRuntime`]s.
pub struct StubLoader {
    behavior: StubBehavior,
    journal: Journal,
    failure: Option<String>,
    loads: AtomicUsize,
}

impl StubLoader {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&Invocation, &mut MemoryFs) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        Self {
            behavior: Arc::new(behavior),
            journal: Journal::new(),
            failure: None,
            loads: AtomicUsize::new(0),
        }
    }

    /// A loader whose every load fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(|_, _| Ok(()))
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Number of `load` calls so far, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RuntimeLoader for StubLoader {
    fn load<'a>(
        &'a self,
        descriptor: &'a ModuleDescriptor,
    ) -> BoxFuture<'a, Result<RuntimeHandle, RuntimeError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = &self.failure {
                return Err(RuntimeError::BootstrapFailed {
                    runtime: descriptor.name.clone(),
                    reason: reason.clone(),
                });
            }
            self.journal.push(JournalEntry::Loaded(descriptor.name.clone()));
            let runtime = StubRuntime::with_behavior(Arc::clone(&self.behavior), self.journal.clone());
            Ok(RuntimeHandle::new(descriptor.name.clone(), Box::new(runtime)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::EntryPoint;

    #[tokio::test]
    async fn journal_records_write_invoke_read() {
        let loader = StubLoader::new(|_, fs| fs.write("out.txt", b"done"));
        let descriptor = ModuleDescriptor::new("stub", "stub.wasm");

        let mut handle = loader.load(&descriptor).await.unwrap();
        handle.write("in.txt", b"hello").unwrap();
        handle
            .invoke(&Invocation::new(EntryPoint::Main, vec!["in.txt".into()]))
            .await
            .unwrap();
        assert_eq!(handle.read("out.txt").unwrap(), b"done");

        assert_eq!(
            loader.journal().entries(),
            vec![
                JournalEntry::Loaded("stub".into()),
                JournalEntry::Write("in.txt".into()),
                JournalEntry::Invoke(vec!["in.txt".into()]),
                JournalEntry::Read("out.txt".into()),
            ]
        );
    }

    #[tokio::test]
    async fn each_load_gets_a_fresh_filesystem() {
        let loader = StubLoader::new(|_, _| Ok(()));
        let descriptor = ModuleDescriptor::new("stub", "stub.wasm");

        let mut first = loader.load(&descriptor).await.unwrap();
        first.write("leak.txt", b"x").unwrap();

        let mut second = loader.load(&descriptor).await.unwrap();
        second.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap();
        assert!(matches!(second.read("leak.txt"), Err(RuntimeError::NotFound(_))));
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn failing_loader_counts_attempts() {
        let loader = StubLoader::failing("bootstrap script missing");
        let descriptor = ModuleDescriptor::new("translator", "python.wasm");
        assert!(matches!(
            loader.load(&descriptor).await,
            Err(RuntimeError::BootstrapFailed { .. })
        ));
        assert_eq!(loader.load_count(), 1);
        assert!(loader.journal().entries().is_empty());
    }

    #[tokio::test]
    async fn cancelled_invocation_does_not_run_behavior() {
        let loader = StubLoader::new(|_, fs| fs.write("out.txt", b"ran"));
        let mut handle = loader.load(&ModuleDescriptor::new("stub", "stub.wasm")).await.unwrap();
        let call = Invocation::new(EntryPoint::Main, vec![]);
        call.cancel.cancel();
        assert!(matches!(handle.invoke(&call).await, Err(RuntimeError::Cancelled)));
    }
}
