use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use planrelay_runtime::{InvocationLimits, ModuleCache, ModuleDescriptor};
use serde::Deserialize;

use crate::alias;
use crate::artifact::names;
use crate::descriptor::{SearchLayout, TranslateLayout};
use crate::error::PipelineError;
use crate::orchestrator::{InputSpec, StageSpec};
use crate::source::{ArtifactSource, FileSource, HttpSource};

/// Overrides `[source] base` when set.
pub const SOURCE_URL_ENV: &str = "PLANRELAY_SOURCE_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
    pub translator: TranslatorConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default = "default_base")]
    pub base: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            base: default_base(),
        }
    }
}

fn default_base() -> String {
    "http://localhost:8000".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputsConfig {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_problem")]
    pub problem: String,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            problem: default_problem(),
        }
    }
}

fn default_domain() -> String {
    "domain.pddl".into()
}
fn default_problem() -> String {
    "problem.pddl".into()
}

/// Settings shared by both runtime sections.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub bootstrap: PathBuf,
    /// `argv[0]`; defaults to the section name
    pub program: Option<String>,
    pub index_dir: Option<PathBuf>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default = "default_package_mount")]
    pub package_mount: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub memory_limit_mb: Option<u64>,
    pub time_limit_secs: Option<u64>,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

fn default_package_mount() -> String {
    "/lib".into()
}
fn default_load_timeout_secs() -> u64 {
    60
}

impl RuntimeConfig {
    fn module(&self, name: &str) -> ModuleDescriptor {
        let mut module = ModuleDescriptor::new(name, &self.bootstrap)
            .with_package_mount(&self.package_mount)
            .with_load_timeout(
                (self.load_timeout_secs > 0).then(|| Duration::from_secs(self.load_timeout_secs)),
            );
        if let Some(program) = &self.program {
            module = module.with_program(program);
        }
        if let Some(index_dir) = &self.index_dir {
            module = module.with_packages(index_dir, self.packages.clone());
        }
        for (key, value) in &self.env {
            module = module.with_env(key, value);
        }
        module
    }

    fn limits(&self) -> InvocationLimits {
        InvocationLimits {
            deadline: self.time_limit_secs.map(Duration::from_secs),
            memory_bytes: self
                .memory_limit_mb
                .map(|mb| (mb as usize).saturating_mul(1024 * 1024)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    #[serde(flatten)]
    pub runtime: RuntimeConfig,
    /// Translator script path inside the runtime; empty for a native translator
    #[serde(default = "default_script")]
    pub script: String,
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
}

fn default_script() -> String {
    "/lib/translate/translate.py".into()
}
fn default_output_flag() -> String {
    "--sas-file".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(flatten)]
    pub runtime: RuntimeConfig,
    pub alias: Option<String>,
    pub options: Option<Vec<String>>,
}

impl SearchConfig {
    /// Explicit options, else the alias expansion, else the default search.
    pub fn search_options(&self) -> Result<Vec<String>, PipelineError> {
        match (&self.options, &self.alias) {
            (Some(_), Some(_)) => Err(PipelineError::Config(
                "[search] sets both `alias` and `options`; pick one".into(),
            )),
            (Some(options), None) => Ok(options.clone()),
            (None, Some(name)) => alias::expand(name),
            (None, None) => Ok(SearchLayout::default().search_options),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: None,
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {e}")))
    }

    /// Source base after the environment override.
    pub fn source_base(&self) -> String {
        std::env::var(SOURCE_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.source.base.clone())
    }

    pub fn build_source(&self) -> Box<dyn ArtifactSource> {
        let base = self.source_base();
        match self.source.kind {
            SourceKind::Http => Box::new(HttpSource::new(base)),
            SourceKind::File => Box::new(FileSource::new(base)),
        }
    }

    pub fn input_specs(&self) -> Vec<InputSpec> {
        vec![
            InputSpec::new(names::DOMAIN, &self.inputs.domain),
            InputSpec::new(names::PROBLEM, &self.inputs.problem),
        ]
    }

    pub fn translate_stage(&self) -> StageSpec {
        let layout = TranslateLayout {
            script: self.translator.script.clone(),
            output_flag: self.translator.output_flag.clone(),
            ..TranslateLayout::default()
        };
        let runtime = &self.translator.runtime;
        StageSpec::new(
            runtime.module("translator"),
            layout.descriptor().with_limits(runtime.limits()),
        )
    }

    pub fn search_stage(&self) -> Result<StageSpec, PipelineError> {
        let layout = SearchLayout {
            search_options: self.search.search_options()?,
            ..SearchLayout::default()
        };
        let runtime = &self.search.runtime;
        Ok(StageSpec::new(
            runtime.module("search"),
            layout.descriptor().with_limits(runtime.limits()),
        ))
    }

    /// Module cache, unless disabled.
    pub fn module_cache(&self) -> Option<ModuleCache> {
        self.cache.enabled.then(|| {
            ModuleCache::new(self.cache.dir.clone().unwrap_or_else(ModuleCache::default_path))
        })
    }
}
