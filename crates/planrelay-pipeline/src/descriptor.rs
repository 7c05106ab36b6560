use std::collections::BTreeMap;

use planrelay_runtime::{EntryPoint, InvocationLimits};
use serde::{Deserialize, Serialize};

use crate::artifact::names;

/// How to run one stage.
///
/// Bindings connect logical artifact names to paths in the runtime
/// filesystem. Arguments are kept as an ordered list and passed through
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    pub entry_point: EntryPoint,
    pub argument_list: Vec<String>,
    /// logical name → path written before the call
    pub input_bindings: BTreeMap<String, String>,
    /// path read after the call → logical name of the produced artifact
    pub output_bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: InvocationLimits,
}

impl InvocationDescriptor {
    pub fn new(entry_point: EntryPoint) -> Self {
        Self {
            entry_point,
            argument_list: Vec::new(),
            input_bindings: BTreeMap::new(),
            output_bindings: BTreeMap::new(),
            limits: InvocationLimits::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argument_list.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_list.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, logical_name: impl Into<String>, path: impl Into<String>) -> Self {
        self.input_bindings.insert(logical_name.into(), path.into());
        self
    }

    pub fn output(mut self, path: impl Into<String>, logical_name: impl Into<String>) -> Self {
        self.output_bindings.insert(path.into(), logical_name.into());
        self
    }

    pub fn with_limits(mut self, limits: InvocationLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Layout of the translation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateLayout {
    /// Translator script inside the runtime (empty for a native translator)
    pub script: String,
    pub domain_path: String,
    pub problem_path: String,
    /// Flag naming the output file, e.g. `--sas-file`
    pub output_flag: String,
    pub output_path: String,
}

impl Default for TranslateLayout {
    fn default() -> Self {
        Self {
            script: "/lib/translate/translate.py".into(),
            domain_path: "domain.pddl".into(),
            problem_path: "problem.pddl".into(),
            output_flag: "--sas-file".into(),
            output_path: "output.sas".into(),
        }
    }
}

impl TranslateLayout {
    /// `[script] domain problem <output flag> <output path>`, reading
    /// "domain"/"problem" and producing "intermediate".
    pub fn descriptor(&self) -> InvocationDescriptor {
        let mut descriptor = InvocationDescriptor::new(EntryPoint::Main);
        if !self.script.is_empty() {
            descriptor = descriptor.arg(&self.script);
        }
        descriptor
            .args([
                &self.domain_path,
                &self.problem_path,
                &self.output_flag,
                &self.output_path,
            ])
            .input(names::DOMAIN, &self.domain_path)
            .input(names::PROBLEM, &self.problem_path)
            .output(&self.output_path, names::INTERMEDIATE)
    }
}

/// Layout of the search stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLayout {
    /// Search configuration, e.g. `["--search", "astar(lmcut())"]`
    pub search_options: Vec<String>,
    pub input_path: String,
    /// Fixed name of the plan file the search writes
    pub plan_path: String,
}

impl Default for SearchLayout {
    fn default() -> Self {
        Self {
            search_options: vec!["--search".into(), "astar(lmcut())".into()],
            input_path: "output.sas".into(),
            plan_path: "sas_plan".into(),
        }
    }
}

impl SearchLayout {
    /// `<search options…> --input <path>`, reading "intermediate" and
    /// producing "result".
    pub fn descriptor(&self) -> InvocationDescriptor {
        InvocationDescriptor::new(EntryPoint::Main)
            .args(self.search_options.iter())
            .args(["--input", self.input_path.as_str()])
            .input(names::INTERMEDIATE, &self.input_path)
            .output(&self.plan_path, names::RESULT)
    }
}
