use std::time::Instant;

use chrono::{DateTime, Utc};
use planrelay_runtime::{ModuleDescriptor, RuntimeHandle, RuntimeLoader};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::{Artifact, ArtifactSummary, names};
use crate::descriptor::InvocationDescriptor;
use crate::error::{ErrorKind, PipelineError};
use crate::executor::StageExecutor;
use crate::plan::Plan;
use crate::publish::Publisher;
use crate::source::ArtifactSource;

/// Pipeline states, in the order a successful run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    FetchingInputs,
    LoadingStage1,
    RunningStage1,
    LoadingStage2,
    RunningStage2,
    Publishing,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::FetchingInputs => "fetching_inputs",
            Phase::LoadingStage1 => "loading_stage1",
            Phase::RunningStage1 => "running_stage1",
            Phase::LoadingStage2 => "loading_stage2",
            Phase::RunningStage2 => "running_stage2",
            Phase::Publishing => "publishing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    /// State the error originated in
    pub phase: Phase,
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} during {}: {}", self.kind, self.phase, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed(FailureReason),
}

/// Wall-clock time spent in each state, in milliseconds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub fetch_ms: u64,
    pub stage1_load_ms: u64,
    pub stage1_run_ms: u64,
    pub stage2_load_ms: u64,
    pub stage2_run_ms: u64,
    pub publish_ms: u64,
    pub total_ms: u64,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    /// Stage 1 output, when Stage 1 completed
    pub intermediate: Option<Artifact>,
    /// Final artifact; `Some` only on success
    pub artifact: Option<Artifact>,
    /// Every state visited, ending in `Done` or `Failed`
    pub trail: Vec<Phase>,
    pub timings: StageTimings,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            RunStatus::Succeeded => None,
            RunStatus::Failed(reason) => Some(reason),
        }
    }

    /// The terminal state.
    pub fn state(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::Idle)
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            status: self.status.clone(),
            intermediate: self.intermediate.as_ref().map(ArtifactSummary::from),
            artifact: self.artifact.as_ref().map(ArtifactSummary::from),
            plan: self.artifact.as_ref().and_then(|a| Plan::from_artifact(a).ok()),
            trail: self.trail.clone(),
            timings: self.timings.clone(),
        }
    }
}

/// JSON-friendly view of a [`PipelineResult`].
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub status: RunStatus,
    pub intermediate: Option<ArtifactSummary>,
    pub artifact: Option<ArtifactSummary>,
    pub plan: Option<Plan>,
    pub trail: Vec<Phase>,
    pub timings: StageTimings,
}

/// An initial artifact to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub logical_name: String,
    pub path: String,
}

impl InputSpec {
    pub fn new(logical_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            path: path.into(),
        }
    }
}

/// One stage: which runtime to load and how to call it.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub module: ModuleDescriptor,
    pub invocation: InvocationDescriptor,
}

impl StageSpec {
    pub fn new(module: ModuleDescriptor, invocation: InvocationDescriptor) -> Self {
        Self { module, invocation }
    }
}

/// Drives fetch → translate → search → publish.
///
/// Strictly sequential: each state starts only after the previous one
/// resolved, and the first error ends the run in `Failed`. Each stage loads
/// its own runtime instance, which is dropped when the stage ends.
pub struct Orchestrator<'a> {
    source: &'a dyn ArtifactSource,
    loader: &'a dyn RuntimeLoader,
    publisher: &'a dyn Publisher,
    inputs: Vec<InputSpec>,
    stage1: StageSpec,
    stage2: StageSpec,
    cancel: CancellationToken,
}

/// Mutable bookkeeping for a run in progress.
struct Progress {
    run_id: String,
    trail: Vec<Phase>,
    timings: StageTimings,
    intermediate: Option<Artifact>,
}

impl Progress {
    fn current(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::Idle)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::info!(run_id = %self.run_id, from = %self.current(), to = %phase, "State transition");
        self.trail.push(phase);
    }
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn ArtifactSource,
        loader: &'a dyn RuntimeLoader,
        publisher: &'a dyn Publisher,
        stage1: StageSpec,
        stage2: StageSpec,
    ) -> Self {
        Self {
            source,
            loader,
            publisher,
            inputs: Vec::new(),
            stage1,
            stage2,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = InputSpec>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Token that aborts the run; cancelling it stops a running guest.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the pipeline to a terminal state.
    pub async fn run(&self) -> PipelineResult {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut progress = Progress {
            run_id: format!("run_{}", Uuid::new_v4().simple()),
            trail: vec![Phase::Idle],
            timings: StageTimings::default(),
            intermediate: None,
        };
        tracing::info!(run_id = %progress.run_id, inputs = self.inputs.len(), "Pipeline run starting");

        let outcome = self.drive(&mut progress).await;
        progress.timings.total_ms = started.elapsed().as_millis() as u64;

        let (status, artifact) = match outcome {
            Ok(artifact) => {
                progress.enter(Phase::Done);
                tracing::info!(
                    run_id = %progress.run_id,
                    total_ms = progress.timings.total_ms,
                    bytes = artifact.len(),
                    "Pipeline run succeeded"
                );
                (RunStatus::Succeeded, Some(artifact))
            }
            Err(err) => {
                let reason = FailureReason {
                    phase: progress.current(),
                    kind: err.kind(),
                    message: err.to_string(),
                };
                progress.enter(Phase::Failed);
                tracing::error!(
                    run_id = %progress.run_id,
                    phase = %reason.phase,
                    kind = %reason.kind,
                    error = %reason.message,
                    "Pipeline run failed"
                );
                (RunStatus::Failed(reason), None)
            }
        };

        PipelineResult {
            run_id: progress.run_id,
            started_at,
            status,
            intermediate: progress.intermediate,
            artifact,
            trail: progress.trail,
            timings: progress.timings,
        }
    }

    async fn drive(&self, progress: &mut Progress) -> Result<Artifact, PipelineError> {
        progress.enter(Phase::FetchingInputs);
        let clock = Instant::now();
        let inputs = self.fetch_inputs().await?;
        progress.timings.fetch_ms = clock.elapsed().as_millis() as u64;

        progress.enter(Phase::LoadingStage1);
        let clock = Instant::now();
        let handle = self.load(&self.stage1.module).await?;
        progress.timings.stage1_load_ms = clock.elapsed().as_millis() as u64;

        progress.enter(Phase::RunningStage1);
        let clock = Instant::now();
        let intermediate = self
            .run_stage(handle, &inputs, &self.stage1, names::INTERMEDIATE)
            .await?;
        progress.timings.stage1_run_ms = clock.elapsed().as_millis() as u64;
        progress.intermediate = Some(intermediate.clone());

        progress.enter(Phase::LoadingStage2);
        let clock = Instant::now();
        let handle = self.load(&self.stage2.module).await?;
        progress.timings.stage2_load_ms = clock.elapsed().as_millis() as u64;

        progress.enter(Phase::RunningStage2);
        let clock = Instant::now();
        let result = self
            .run_stage(handle, std::slice::from_ref(&intermediate), &self.stage2, names::RESULT)
            .await?;
        progress.timings.stage2_run_ms = clock.elapsed().as_millis() as u64;

        progress.enter(Phase::Publishing);
        let clock = Instant::now();
        self.publisher.publish(&result).await?;
        progress.timings.publish_ms = clock.elapsed().as_millis() as u64;

        Ok(result)
    }

    async fn fetch_inputs(&self) -> Result<Vec<Artifact>, PipelineError> {
        let mut artifacts = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let artifact = tokio::select! {
                fetched = self.source.fetch(&input.logical_name, &input.path) => fetched?,
                _ = self.cancel.cancelled() => {
                    return Err(PipelineError::Retrieval {
                        path: input.path.clone(),
                        reason: "cancelled".into(),
                    });
                }
            };
            tracing::info!(
                artifact = %input.logical_name,
                path = %input.path,
                bytes = artifact.len(),
                sha256 = %artifact.digest(),
                "Input fetched"
            );
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    async fn load(&self, module: &ModuleDescriptor) -> Result<RuntimeHandle, PipelineError> {
        let load = async {
            match module.load_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.loader.load(module)).await {
                    Ok(loaded) => loaded.map_err(|e| PipelineError::load(&module.name, e)),
                    Err(_) => Err(PipelineError::Load {
                        runtime: module.name.clone(),
                        reason: format!("not ready within {} ms", limit.as_millis()),
                    }),
                },
                None => self
                    .loader
                    .load(module)
                    .await
                    .map_err(|e| PipelineError::load(&module.name, e)),
            }
        };

        let handle = tokio::select! {
            loaded = load => loaded?,
            _ = self.cancel.cancelled() => {
                return Err(PipelineError::Load {
                    runtime: module.name.clone(),
                    reason: "cancelled".into(),
                });
            }
        };
        tracing::info!(runtime = %module.name, "Runtime ready");
        Ok(handle)
    }

    /// Run a stage and pick its primary output, the one named `expected`.
    /// A stage that declares no such output fails here, in its own state.
    async fn run_stage(
        &self,
        handle: RuntimeHandle,
        inputs: &[Artifact],
        stage: &StageSpec,
        expected: &str,
    ) -> Result<Artifact, PipelineError> {
        let outputs =
            StageExecutor::run(handle, inputs, &stage.invocation, self.cancel.clone()).await?;
        outputs
            .into_iter()
            .find(|a| a.logical_name() == expected)
            .ok_or_else(|| PipelineError::NotFound {
                runtime: stage.module.name.clone(),
                path: expected.to_string(),
            })
    }
}
