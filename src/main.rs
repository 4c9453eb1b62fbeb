mod doctor;
mod progress;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mangaba_core::config::{AppConfig, ExecutorConfig};
use mangaba_core::event::EventBus;
use mangaba_engine::{preflight, FlowExecutor, FlowGraph, FlowTemplate, NodeHandlers, RunLogger};

use crate::progress::ProgressPrinter;

#[derive(Parser)]
#[command(name = "mangaba", version, about = "Run AI workflow graphs from the command line")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mangaba.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow and print the resulting execution record
    Run {
        /// Flow JSON file with `nodes` and `connections`
        flow: PathBuf,
        /// Seed text for the entry nodes (read from stdin when no input is given)
        #[arg(long, conflicts_with = "input_json")]
        input: Option<String>,
        /// Seed value as JSON
        #[arg(long)]
        input_json: Option<String>,
        /// Treat the file as a template and run a fresh copy of it
        #[arg(long)]
        template: bool,
        /// Flow id recorded on the execution
        #[arg(long)]
        flow_id: Option<String>,
    },
    /// Validate a flow's structure without running it
    Check {
        /// Flow JSON file
        flow: PathBuf,
        /// Treat the file as a template
        #[arg(long)]
        template: bool,
    },
    /// Show current configuration
    Config,
    /// Run system health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mangaba=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "mangaba", &mut io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::Run {
            flow,
            input,
            input_json,
            template,
            flow_id,
        } => {
            let seed = read_seed(input, input_json)?;
            let graph = load_graph(&flow, template)?;
            let succeeded = run_flow(&config, graph, seed, flow_id).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Check { flow, template } => {
            let graph = load_graph(&flow, template)?;
            let report = graph.validate();
            print!("{}", report);
            if graph.requires_model() && config.model.resolve_api_key().is_none() {
                println!("  - Flow uses AI nodes but no API key is configured");
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("Mangaba Doctor");
            println!("==============");
            doctor::run_doctor(&config);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Room for every event an acyclic run with light fan-in publishes.
///
/// Each dispatch publishes at most two step events; a run adds two more. The
/// run logger records any events it still misses.
fn bus_capacity(graph: &FlowGraph, executor: &ExecutorConfig) -> usize {
    let visits = executor.max_visits_per_node.max(2);
    (graph.nodes.len() * visits * 2 + 2).max(256)
}

fn load_graph(path: &Path, template: bool) -> anyhow::Result<FlowGraph> {
    if template {
        let content = std::fs::read_to_string(path)?;
        let template: FlowTemplate = serde_json::from_str(&content)?;
        info!(template_id = %template.id, "Instantiating template");
        Ok(template.instantiate())
    } else {
        Ok(FlowGraph::load(path)?)
    }
}

fn read_seed(input: Option<String>, input_json: Option<String>) -> anyhow::Result<Value> {
    if let Some(text) = input {
        return Ok(Value::String(text));
    }
    if let Some(json) = input_json {
        return Ok(serde_json::from_str(&json)?);
    }
    let stdin = io::stdin();
    let text = stdin
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Value::String(text))
}

async fn run_flow(
    config: &AppConfig,
    graph: FlowGraph,
    seed: Value,
    flow_id: Option<String>,
) -> anyhow::Result<bool> {
    let model = mangaba_llm::create_service(&config.model)?;
    preflight(&graph, model.name(), config.model.resolve_api_key().as_deref())?;
    let tools = mangaba_tools::create_service(&config.tools)?;

    let event_bus = Arc::new(EventBus::new(bus_capacity(&graph, &config.executor)));
    let cancel = CancellationToken::new();

    let logger = config
        .log
        .as_ref()
        .filter(|l| l.enabled)
        .map(|l| RunLogger::new(l.dir()).attach(&event_bus, cancel.clone()));

    let node_count = graph.nodes.len();
    let mut executor = FlowExecutor::new(graph, NodeHandlers::new(model, tools))
        .with_config(config.executor.clone())
        .with_event_bus(event_bus.clone());
    if let Some(id) = flow_id {
        executor = executor.with_flow_id(id);
    }

    let printer = ProgressPrinter::new(io::stderr());
    eprintln!("[run started: {} nodes]", node_count);
    let run = tokio::select! {
        run = executor.execute(seed, Some(&printer)) => run,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning run");
            cancel.cancel();
            anyhow::bail!("run interrupted");
        }
    };

    match &run.execution.error {
        Some(error) => eprintln!("[run failed] {}", error),
        None => eprintln!("[run completed]"),
    }
    if let Some(handle) = logger {
        handle.await.ok();
    }

    println!("{}", serde_json::to_string_pretty(&run.execution)?);
    Ok(run.succeeded())
}
