//! Full pipeline runs on real Wasmtime instances.
//!
//! Both stages are WAT command modules: the translator checks that domain
//! and problem were staged and writes `output.sas`; the search checks for
//! `output.sas` and writes `sas_plan`.

use std::path::Path;
use std::sync::Arc;

use planrelay_pipeline::{
    Artifact, ErrorKind, InputSpec, MemoryPublisher, Orchestrator, Phase, Plan, SearchLayout,
    StageExecutor, StageSpec, StaticSource, TranslateLayout, artifact::names,
};
use planrelay_runtime::fixture::CommandModule;
use planrelay_runtime::{ModuleDescriptor, RuntimeContext, RuntimeLoader, WasiLoader};
use tokio_util::sync::CancellationToken;

const SAS: &str = "begin_version\n3\nend_version\nbegin_metric\n0\nend_metric\n";
const PLAN: &str = "(flip)\n; cost = 1 (unit cost)\n";

fn loader() -> WasiLoader {
    WasiLoader::new(Arc::new(RuntimeContext::new().expect("engine")))
}

fn stage_files(dir: &Path, search: CommandModule) -> (StageSpec, StageSpec) {
    let translator = dir.join("translator.wat");
    CommandModule::new()
        .requires("domain.pddl")
        .requires("problem.pddl")
        .writes("output.sas", SAS)
        .write_to(&translator)
        .unwrap();
    let downward = dir.join("search.wat");
    search.write_to(&downward).unwrap();

    let native_translate = TranslateLayout {
        script: String::new(),
        ..TranslateLayout::default()
    };
    (
        StageSpec::new(
            ModuleDescriptor::new("translator", translator),
            native_translate.descriptor(),
        ),
        StageSpec::new(
            ModuleDescriptor::new("search", downward).with_program("downward"),
            SearchLayout::default().descriptor(),
        ),
    )
}

fn source() -> StaticSource {
    StaticSource::new()
        .with("domain.pddl", "(define (domain switch) (:action flip))")
        .with("problem.pddl", "(define (problem one) (:domain switch))")
}

fn inputs() -> Vec<InputSpec> {
    vec![
        InputSpec::new(names::DOMAIN, "domain.pddl"),
        InputSpec::new(names::PROBLEM, "problem.pddl"),
    ]
}

#[tokio::test]
async fn one_action_problem_runs_through_both_runtimes() {
    let tmp = tempfile::tempdir().unwrap();
    let (stage1, stage2) = stage_files(
        tmp.path(),
        CommandModule::new().requires("output.sas").writes("sas_plan", PLAN),
    );
    let loader = loader();
    let publisher = MemoryPublisher::new();
    let source = source();

    let result = Orchestrator::new(&source, &loader, &publisher, stage1, stage2)
        .with_inputs(inputs())
        .run()
        .await;

    assert!(result.succeeded(), "{:?}", result.failure());
    assert_eq!(result.state(), Phase::Done);
    assert_eq!(result.intermediate.as_ref().unwrap().as_text(), Some(SAS));

    let plan = Plan::from_artifact(result.artifact.as_ref().unwrap()).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.cost, Some(1));
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn search_that_writes_nothing_fails_with_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let (stage1, stage2) = stage_files(tmp.path(), CommandModule::new().requires("output.sas"));
    let loader = loader();
    let publisher = MemoryPublisher::new();
    let source = source();

    let result = Orchestrator::new(&source, &loader, &publisher, stage1, stage2)
        .with_inputs(inputs())
        .run()
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert_eq!(failure.phase, Phase::RunningStage2);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn unsolvable_exit_is_invocation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (stage1, stage2) = stage_files(
        tmp.path(),
        CommandModule::new().requires("output.sas").exits_with(4),
    );
    let loader = loader();
    let publisher = MemoryPublisher::new();
    let source = source();

    let result = Orchestrator::new(&source, &loader, &publisher, stage1, stage2)
        .with_inputs(inputs())
        .run()
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Invocation);
    assert!(failure.message.contains("unsolvable"), "{}", failure.message);
}

#[tokio::test]
async fn executor_is_deterministic_across_fresh_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let (stage1, _) = stage_files(tmp.path(), CommandModule::new());
    let loader = loader();
    let inputs = vec![
        Artifact::text(names::DOMAIN, "(define (domain switch))"),
        Artifact::text(names::PROBLEM, "(define (problem one))"),
    ];

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let handle = loader.load(&stage1.module).await.unwrap();
        let produced = StageExecutor::run(handle, &inputs, &stage1.invocation, CancellationToken::new())
            .await
            .unwrap();
        outputs.push(produced[0].content().to_vec());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert!(!outputs[0].is_empty());
}
