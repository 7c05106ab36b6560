//! Two-stage planning pipeline.
//!
//! Inputs are fetched from an [`ArtifactSource`], translated by a runtime
//! loaded for Stage 1, searched by a second, independently loaded runtime,
//! and the resulting plan is handed to a [`Publisher`]. The two runtimes
//! never share memory or a filesystem: artifacts are copied out of one and
//! into the other by the [`StageExecutor`].

pub mod alias;
pub mod artifact;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod exit_code;
pub mod orchestrator;
pub mod plan;
pub mod publish;
pub mod source;

pub use artifact::{Artifact, ArtifactSummary, Encoding};
pub use config::PipelineConfig;
pub use descriptor::{InvocationDescriptor, SearchLayout, TranslateLayout};
pub use error::{ErrorKind, PipelineError};
pub use executor::StageExecutor;
pub use orchestrator::{
    FailureReason, InputSpec, Orchestrator, Phase, PipelineResult, RunReport, RunStatus,
    StageSpec, StageTimings,
};
pub use plan::Plan;
pub use publish::{FilePublisher, MemoryPublisher, Publisher, StdoutPublisher};
pub use source::{ArtifactSource, FileSource, HttpSource, StaticSource};
