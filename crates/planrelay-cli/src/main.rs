use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use planrelay_pipeline::{
    FilePublisher, MemoryPublisher, Orchestrator, PipelineConfig, PipelineResult, Publisher,
    StdoutPublisher, alias,
};
use planrelay_runtime::{RuntimeContext, WasiLoader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod check;

#[derive(Parser)]
#[command(
    name = "planrelay",
    about = "planrelay: runs PDDL translation and search in isolated WASI runtimes"
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a task, translate it, search it and publish the plan
    Run(RunArgs),
    /// List the named search configurations
    Aliases,
    /// Run the whole pipeline against built-in fixture modules
    Check {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pipeline configuration file
    #[arg(long, short, default_value = "planrelay.toml")]
    config: PathBuf,

    /// Domain path, relative to the source base
    #[arg(long)]
    domain: Option<String>,

    /// Problem path, relative to the source base
    #[arg(long)]
    problem: Option<String>,

    /// Named search configuration (see `planrelay aliases`)
    #[arg(long, conflicts_with = "search")]
    alias: Option<String>,

    /// Search configuration string, e.g. "astar(lmcut())"
    #[arg(long)]
    search: Option<String>,

    /// Write the plan here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the plan or the report.
    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_env("PLANRELAY_LOG"))
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Aliases => {
            for name in alias::names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Check { json } => {
            let result = check::run().await?;
            report(&result, json)
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::from_file(&args.config)?;
    if let Some(domain) = args.domain {
        config.inputs.domain = domain;
    }
    if let Some(problem) = args.problem {
        config.inputs.problem = problem;
    }
    if let Some(name) = args.alias {
        config.search.alias = Some(name);
        config.search.options = None;
    }
    if let Some(search) = args.search {
        config.search.alias = None;
        config.search.options = Some(vec!["--search".into(), search]);
    }

    let stage1 = config.translate_stage();
    let stage2 = config.search_stage()?;
    let source = config.build_source();

    let context = Arc::new(RuntimeContext::new().context("failed to create Wasmtime engine")?);
    let mut loader = WasiLoader::new(context);
    if let Some(cache) = config.module_cache() {
        cache.init().context("failed to create module cache directory")?;
        loader = loader.with_cache(cache);
    }

    let publisher: Box<dyn Publisher> = match (&args.output, args.json) {
        (Some(path), _) => Box::new(FilePublisher::new(path)),
        // The report already carries the plan.
        (None, true) => Box::new(MemoryPublisher::new()),
        (None, false) => Box::new(StdoutPublisher),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let result = Orchestrator::new(source.as_ref(), &loader, publisher.as_ref(), stage1, stage2)
        .with_inputs(config.input_specs())
        .with_cancel(cancel)
        .run()
        .await;

    report(&result, args.json)
}

fn report(result: &PipelineResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&result.report())?);
    }
    match result.failure() {
        None => {
            tracing::info!(
                run_id = %result.run_id,
                total_ms = result.timings.total_ms,
                "Run complete"
            );
            Ok(())
        }
        Some(reason) => anyhow::bail!("run {} failed: {reason}", result.run_id),
    }
}
