use regex::Regex;
use serde::Serialize;

use crate::artifact::Artifact;
use crate::error::PipelineError;

const COST_LINE: &str = r"^;\s*cost\s*=\s*(\d+)";

/// A sequential plan as written by the search stage.
///
/// Action lines look like `(move a b)`; comment lines start with `;`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub actions: Vec<String>,
    pub cost: Option<u64>,
}

impl Plan {
    pub fn parse(text: &str) -> Self {
        let mut actions = Vec::new();
        let mut cost = None;
        let cost_line = Regex::new(COST_LINE).ok();
        for line in text.lines().map(str::trim) {
            if line.starts_with('(') {
                actions.push(line.to_string());
            } else if let Some(re) = &cost_line
                && let Some(caps) = re.captures(line)
            {
                cost = caps[1].parse().ok();
            }
        }
        Self { actions, cost }
    }

    pub fn from_artifact(artifact: &Artifact) -> Result<Self, PipelineError> {
        artifact.as_text().map(Self::parse).ok_or_else(|| {
            PipelineError::Publish(format!("plan artifact '{}' is not text", artifact.logical_name()))
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
