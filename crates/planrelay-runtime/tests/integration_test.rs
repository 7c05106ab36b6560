//! End-to-end tests for the Wasmtime backend.
//!
//! Each test writes a WAT command module to a temp dir, loads it through
//! `WasiLoader` and drives it via the `RuntimeHandle` contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use planrelay_runtime::fixture::{CommandModule, EXIT_MISSING_INPUT};
use planrelay_runtime::{
    EntryPoint, Invocation, InvocationLimits, ModuleCache, ModuleDescriptor, RuntimeContext,
    RuntimeError, RuntimeLoader, WasiLoader,
};

fn loader() -> WasiLoader {
    WasiLoader::new(Arc::new(RuntimeContext::new().expect("engine")))
}

fn module_file(dir: &Path, name: &str, module: CommandModule) -> PathBuf {
    let path = dir.join(format!("{name}.wat"));
    module.write_to(&path).unwrap();
    path
}

#[tokio::test]
async fn guest_reads_input_and_writes_output() {
    let tmp = tempfile::tempdir().unwrap();
    let module = CommandModule::new()
        .requires("output.sas")
        .writes("sas_plan", "(pick-up a)\n; cost = 1 (unit cost)\n");
    let descriptor = ModuleDescriptor::new("search", module_file(tmp.path(), "search", module));

    let mut handle = loader().load(&descriptor).await.unwrap();
    handle.write("/output.sas", b"begin_version\n3\nend_version\n").unwrap();
    handle
        .invoke(&Invocation::new(EntryPoint::Main, vec!["--input".into(), "output.sas".into()]))
        .await
        .unwrap();

    let plan = String::from_utf8(handle.read("sas_plan").unwrap()).unwrap();
    assert_eq!(plan, "(pick-up a)\n; cost = 1 (unit cost)\n");
}

#[tokio::test]
async fn missing_input_surfaces_exit_status() {
    let tmp = tempfile::tempdir().unwrap();
    let module = CommandModule::new().requires("output.sas").writes("sas_plan", "x");
    let descriptor = ModuleDescriptor::new("search", module_file(tmp.path(), "search", module));

    let mut handle = loader().load(&descriptor).await.unwrap();
    let err = handle.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap_err();
    match err {
        RuntimeError::Exited { code } => assert_eq!(code, EXIT_MISSING_INPUT),
        other => panic!("expected Exited, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_zero_exit_is_success() {
    let tmp = tempfile::tempdir().unwrap();
    let module = CommandModule::new().writes("done", "ok").exits_with(0);
    let descriptor = ModuleDescriptor::new("stage", module_file(tmp.path(), "zero", module));

    let mut handle = loader().load(&descriptor).await.unwrap();
    handle.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap();
    assert_eq!(handle.read("done").unwrap(), b"ok");
}

#[tokio::test]
async fn named_export_entry_point() {
    let tmp = tempfile::tempdir().unwrap();
    let module = CommandModule::new().writes("out", "solved").export_as("solve");
    let descriptor = ModuleDescriptor::new("stage", module_file(tmp.path(), "export", module));

    let mut handle = loader().load(&descriptor).await.unwrap();
    handle
        .invoke(&Invocation::new(EntryPoint::Export("solve".into()), vec![]))
        .await
        .unwrap();
    assert_eq!(handle.read("out").unwrap(), b"solved");

    let mut other = loader().load(&descriptor).await.unwrap();
    let err = other.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap_err();
    assert!(matches!(err, RuntimeError::EntryPointNotFound(_)));
}

#[tokio::test]
async fn spinning_guest_hits_deadline() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = ModuleDescriptor::new(
        "search",
        module_file(tmp.path(), "spin", CommandModule::new().spins()),
    );

    let mut handle = loader().load(&descriptor).await.unwrap();
    let call = Invocation::new(EntryPoint::Main, vec![]).with_limits(InvocationLimits {
        deadline: Some(Duration::from_millis(100)),
        memory_bytes: None,
    });
    let err = handle.invoke(&call).await.unwrap_err();
    assert!(matches!(err, RuntimeError::DeadlineExceeded { millis: 100 }));
}

#[tokio::test]
async fn spinning_guest_can_be_cancelled() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = ModuleDescriptor::new(
        "search",
        module_file(tmp.path(), "spin", CommandModule::new().spins()),
    );

    let mut handle = loader().load(&descriptor).await.unwrap();
    let call = Invocation::new(EntryPoint::Main, vec![]);
    let token = call.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let err = handle.invoke(&call).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Cancelled));
}

#[tokio::test]
async fn memory_cap_below_initial_memory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = ModuleDescriptor::new(
        "search",
        module_file(tmp.path(), "small", CommandModule::new().writes("out", "x")),
    );

    let mut handle = loader().load(&descriptor).await.unwrap();
    let call = Invocation::new(EntryPoint::Main, vec![]).with_limits(InvocationLimits {
        deadline: None,
        memory_bytes: Some(1024),
    });
    assert!(handle.invoke(&call).await.is_err());
}

#[tokio::test]
async fn unresolved_import_fails_at_load() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.wat");
    std::fs::write(
        &path,
        r#"(module (import "env" "host_only" (func)) (func (export "_start")))"#,
    )
    .unwrap();

    let err = loader().load(&ModuleDescriptor::new("bad", path)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::InstantiationFailed(_)));
}

#[tokio::test]
async fn packages_are_visible_to_the_guest() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index");
    std::fs::create_dir_all(index.join("translate")).unwrap();
    std::fs::write(index.join("translate/translate.py"), "main()").unwrap();

    let module = CommandModule::new()
        .requires("lib/translate/translate.py")
        .writes("output.sas", "begin_version");
    let descriptor = ModuleDescriptor::new("translator", module_file(tmp.path(), "py", module))
        .with_packages(&index, vec!["translate".into()]);

    let mut handle = loader().load(&descriptor).await.unwrap();
    handle.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap();
    assert_eq!(handle.read("lib/translate/translate.py").unwrap(), b"main()");
    assert_eq!(handle.read("output.sas").unwrap(), b"begin_version");
}

#[tokio::test]
async fn cached_loader_produces_identical_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ModuleCache::new(tmp.path().join("cache"));
    let loader = loader().with_cache(cache.clone());
    let module = CommandModule::new().writes("sas_plan", "(noop)\n");
    let descriptor = ModuleDescriptor::new("search", module_file(tmp.path(), "noop", module));

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let mut handle = loader.load(&descriptor).await.unwrap();
        handle.invoke(&Invocation::new(EntryPoint::Main, vec![])).await.unwrap();
        outputs.push(handle.read("sas_plan").unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(cache.list().unwrap().len(), 1);
}
