//! `planrelay check`: a full pipeline run on fixture modules.
//!
//! Exercises the host side end to end (engine, WASI preopens, epoch
//! deadlines, staging and capture) without needing the real translator or
//! search builds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use planrelay_pipeline::artifact::names;
use planrelay_pipeline::{
    InputSpec, MemoryPublisher, Orchestrator, PipelineResult, SearchLayout, StageSpec,
    StaticSource, TranslateLayout,
};
use planrelay_runtime::fixture::CommandModule;
use planrelay_runtime::{InvocationLimits, ModuleDescriptor, RuntimeContext, WasiLoader};

const CHECK_DOMAIN: &str = "(define (domain switch) (:action flip :effect (on)))";
const CHECK_PROBLEM: &str = "(define (problem one) (:domain switch) (:goal (on)))";
const CHECK_SAS: &str = "begin_version\n3\nend_version\n";
const CHECK_PLAN: &str = "(flip)\n; cost = 1 (unit cost)\n";

pub async fn run() -> Result<PipelineResult> {
    let workdir = tempfile::Builder::new()
        .prefix("planrelay-check-")
        .tempdir()
        .context("failed to create scratch directory")?;

    let translator = workdir.path().join("translator.wat");
    CommandModule::new()
        .requires("domain.pddl")
        .requires("problem.pddl")
        .writes("output.sas", CHECK_SAS)
        .write_to(&translator)?;
    let search = workdir.path().join("search.wat");
    CommandModule::new()
        .requires("output.sas")
        .writes("sas_plan", CHECK_PLAN)
        .write_to(&search)?;

    let limits = InvocationLimits {
        deadline: Some(Duration::from_secs(10)),
        memory_bytes: Some(16 * 1024 * 1024),
    };
    let native_translate = TranslateLayout {
        script: String::new(),
        ..TranslateLayout::default()
    };
    let stage1 = StageSpec::new(
        ModuleDescriptor::new("translator", translator),
        native_translate.descriptor().with_limits(limits),
    );
    let stage2 = StageSpec::new(
        ModuleDescriptor::new("search", search).with_program("downward"),
        SearchLayout::default().descriptor().with_limits(limits),
    );

    let source = StaticSource::new()
        .with("domain.pddl", CHECK_DOMAIN)
        .with("problem.pddl", CHECK_PROBLEM);
    let loader = WasiLoader::new(Arc::new(
        RuntimeContext::new().context("failed to create Wasmtime engine")?,
    ));
    let publisher = MemoryPublisher::new();

    let result = Orchestrator::new(&source, &loader, &publisher, stage1, stage2)
        .with_inputs([
            InputSpec::new(names::DOMAIN, "domain.pddl"),
            InputSpec::new(names::PROBLEM, "problem.pddl"),
        ])
        .run()
        .await;

    if result.succeeded() {
        eprintln!(
            "check ok: plan of {} bytes in {} ms",
            result.artifact.as_ref().map_or(0, |a| a.len()),
            result.timings.total_ms
        );
    }
    Ok(result)
}
