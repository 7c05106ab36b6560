use planrelay_runtime::{Invocation, RuntimeError, RuntimeHandle};
use tokio_util::sync::CancellationToken;

use crate::artifact::Artifact;
use crate::descriptor::InvocationDescriptor;
use crate::error::PipelineError;
use crate::exit_code;

/// Runs one stage against a freshly loaded runtime.
///
/// The handle is taken by value and dropped when the stage ends, so its
/// filesystem can never leak into another stage.
pub struct StageExecutor;

impl StageExecutor {
    /// Write bound inputs, invoke the entry point, read bound outputs.
    ///
    /// Every input binding needs a matching artifact; otherwise nothing is
    /// written. Artifacts with no binding are skipped with a warning.
    pub async fn run(
        mut handle: RuntimeHandle,
        inputs: &[Artifact],
        descriptor: &InvocationDescriptor,
        cancel: CancellationToken,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let runtime = handle.runtime_name().to_string();
        let entry_point = descriptor.entry_point.to_string();
        let invocation_error = |reason: String| PipelineError::Invocation {
            runtime: runtime.clone(),
            entry_point: entry_point.clone(),
            reason,
        };

        // Resolve every binding before touching the filesystem.
        let mut staged = Vec::with_capacity(descriptor.input_bindings.len());
        for (logical_name, path) in &descriptor.input_bindings {
            let artifact = inputs
                .iter()
                .find(|a| a.logical_name() == logical_name)
                .ok_or_else(|| invocation_error(format!("missing input artifact '{logical_name}'")))?;
            staged.push((path, artifact));
        }
        for artifact in inputs {
            if !descriptor.input_bindings.contains_key(artifact.logical_name()) {
                tracing::warn!(
                    runtime = %runtime,
                    artifact = artifact.logical_name(),
                    "Input artifact has no binding, ignoring"
                );
            }
        }

        for (path, artifact) in staged {
            handle
                .write(path, artifact.content())
                .map_err(|e| invocation_error(format!("staging {path}: {e}")))?;
        }

        let invocation = Invocation::new(descriptor.entry_point.clone(), descriptor.argument_list.clone())
            .with_limits(descriptor.limits)
            .with_cancel(cancel);
        handle
            .invoke(&invocation)
            .await
            .map_err(|e| invocation_error(invocation_reason(&e)))?;

        let mut outputs = Vec::with_capacity(descriptor.output_bindings.len());
        for (path, logical_name) in &descriptor.output_bindings {
            let content = match handle.read(path) {
                Ok(content) => content,
                Err(RuntimeError::NotFound(_)) => {
                    return Err(PipelineError::NotFound {
                        runtime: runtime.clone(),
                        path: path.clone(),
                    });
                }
                Err(e) => return Err(invocation_error(format!("reading {path}: {e}"))),
            };
            let artifact = Artifact::detect(logical_name.as_str(), content);
            tracing::debug!(
                runtime = %runtime,
                path = %path,
                artifact = artifact.logical_name(),
                bytes = artifact.len(),
                "Captured output"
            );
            outputs.push(artifact);
        }

        Ok(outputs)
    }
}

fn invocation_reason(err: &RuntimeError) -> String {
    match err {
        RuntimeError::Exited { code } => exit_code::describe(*code),
        RuntimeError::DeadlineExceeded { millis } => format!("deadline exceeded after {millis} ms"),
        RuntimeError::Cancelled => "cancelled".into(),
        other => other.to_string(),
    }
}
