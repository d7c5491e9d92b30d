use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wfcore::{
    ExecutionEvent, FormConfig, LlmConfig, Node, NodeConfig, NodeEvent, ServiceConfig,
    WorkflowGraph,
};
use wfnodes::NodeDeps;
use wfruntime::checkpoint::{load_from_file, save_to_file};
use wfruntime::{
    load_graph_file, validate_graph, Checkpoint, ExecutionState, ExecutorRegistry, GraphRuntime,
    RunStatus, RuntimeConfig,
};

#[derive(Parser)]
#[command(name = "wf")]
#[command(about = "Workflow graph engine CLI", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Where to write the checkpoint if the run pauses at a form
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,
    },

    /// Continue a paused run with form data
    Resume {
        /// Checkpoint written by `wf run`
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Form submission as JSON
        #[arg(short, long)]
        data: String,

        /// Workflow file; defaults to the graph pinned in the checkpoint
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node kinds
    Kinds,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match cli.command {
        Commands::Run { file, input, checkpoint } => run_workflow(&file, input, checkpoint).await,
        Commands::Resume {
            checkpoint,
            data,
            file,
        } => resume_workflow(&checkpoint, &data, file).await,
        Commands::Validate { file } => validate_workflow(&file),
        Commands::Kinds => list_kinds(),
        Commands::Init { output } => create_example_workflow(&output),
    }
}

fn build_runtime() -> Result<GraphRuntime> {
    let mut registry = ExecutorRegistry::new();
    wfnodes::register_all(&mut registry, NodeDeps::from_env()?);
    Ok(GraphRuntime::with_registry(Arc::new(registry), RuntimeConfig::from_env()))
}

/// Print events as they arrive
fn spawn_event_printer(runtime: &GraphRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { graph_name, .. } => {
                    println!("▶️  Run of '{}' started", graph_name);
                }
                ExecutionEvent::RunResumed { node_id, .. } => {
                    println!("▶️  Resumed after form '{}'", node_id);
                }
                ExecutionEvent::RunPaused { node_id, .. } => {
                    println!("⏸️  Waiting for form '{}'", node_id);
                }
                ExecutionEvent::NodeStarted { node_id, kind, .. } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, kind);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message)
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message)
                    }
                },
                ExecutionEvent::RunFinished { success, steps, .. } => {
                    if success {
                        println!("✨ Run completed after {} step(s)", steps);
                    } else {
                        println!("💥 Run failed after {} step(s)", steps);
                    }
                }
            }
        }
    })
}

/// Cancel on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("🛑 Cancelling after the current node...");
            trigger.cancel();
        }
    });
    token
}

fn parse_json(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))
}

async fn run_workflow(
    file: &Path,
    input: Option<String>,
    checkpoint: Option<PathBuf>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let graph = load_graph_file(file)?;

    println!("📋 Workflow: {}", graph.label());
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", graph.edges.len());
    println!();

    let inputs = match input {
        Some(raw) => parse_json(&raw, "--input")?,
        None => json!({}),
    };

    let runtime = build_runtime()?;
    let printer = spawn_event_printer(&runtime);
    let state = runtime.run_with_cancel(&graph, inputs, cancel_on_ctrl_c()).await?;

    // Let queued events print
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    let checkpoint_path = checkpoint
        .unwrap_or_else(|| PathBuf::from(format!("{}.checkpoint.json", state.execution_id())));
    report(&state, graph, &checkpoint_path).await
}

async fn resume_workflow(checkpoint_path: &Path, data: &str, file: Option<PathBuf>) -> Result<()> {
    let saved = load_from_file(checkpoint_path)
        .await
        .with_context(|| format!("cannot read checkpoint {}", checkpoint_path.display()))?;
    let graph = match (file, saved.graph) {
        (Some(path), _) => load_graph_file(&path)?,
        (None, Some(graph)) => graph,
        (None, None) => bail!("checkpoint has no pinned graph; pass --file"),
    };
    let form_data = parse_json(data, "--data")?;

    println!(
        "🔄 Resuming {} at form '{}'",
        saved.state.execution_id(),
        saved.state.current_node_id().unwrap_or("?")
    );

    let runtime = build_runtime()?;
    let printer = spawn_event_printer(&runtime);
    let state = runtime
        .scheduler()
        .resume_with_cancel(saved.state, &graph, form_data, cancel_on_ctrl_c())
        .await?;

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    report(&state, graph, checkpoint_path).await
}

/// Print the outcome; a paused run leaves a checkpoint behind, a finished
/// one removes it.
async fn report(
    state: &ExecutionState,
    graph: WorkflowGraph,
    checkpoint_path: &Path,
) -> Result<()> {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", state.execution_id());
    println!("   Status: {}", state.status());
    println!("   Steps: {}", state.steps());

    match state.status() {
        RunStatus::Paused => {
            save_to_file(checkpoint_path, &Checkpoint::new(state.clone()).with_graph(graph)).await?;
            println!();
            println!("📝 Form '{}' needs input:", state.current_node_id().unwrap_or_default());
            println!("{}", serde_json::to_string_pretty(&state.pending_form())?);
            println!();
            println!("Resume with:");
            println!("  wf resume --checkpoint {} --data '{{...}}'", checkpoint_path.display());
            Ok(())
        }
        RunStatus::Completed => {
            discard_checkpoint(checkpoint_path).await?;
            println!();
            println!("📤 State:");
            println!("{}", serde_json::to_string_pretty(&state.state_value())?);
            Ok(())
        }
        RunStatus::Failed | RunStatus::Running => {
            discard_checkpoint(checkpoint_path).await?;
            let message = state
                .failure()
                .map(|f| {
                    let at = f.node_id.as_deref().unwrap_or("-");
                    format!("{:?} at {}: {}", f.kind, at, f.message)
                })
                .unwrap_or_else(|| "run did not finish".to_string());
            bail!(message)
        }
    }
}

/// A finished run can no longer be resumed.
async fn discard_checkpoint(checkpoint_path: &Path) -> Result<()> {
    if tokio::fs::try_exists(checkpoint_path).await.unwrap_or(false) {
        tokio::fs::remove_file(checkpoint_path).await?;
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let graph = load_graph_file(file)?;
    let runtime = build_runtime()?;
    let plan = validate_graph(&graph, runtime.registry())?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", graph.label());
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", graph.edges.len());
    println!("   Entry: {}", plan.entry);
    if plan.cyclic {
        println!("   ⚠️  Contains cycles (bounded by the step budget)");
    }
    if !plan.unreachable.is_empty() {
        println!("   ⚠️  Unreachable: {}", plan.unreachable.join(", "));
    }
    Ok(())
}

fn list_kinds() -> Result<()> {
    println!("📦 Available Node Kinds:");
    println!();

    let runtime = build_runtime()?;
    let registry = runtime.registry();
    for kind in registry.list_kinds() {
        match registry.metadata(kind) {
            Some(metadata) => {
                println!("  • {}", kind);
                println!("    {}", metadata.description);
            }
            None => println!("  • {}", kind),
        }
    }
    Ok(())
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut graph = WorkflowGraph::new("zen-review");
    graph.description =
        Some("Fetches a quote, collects a reviewer note, then summarizes both".to_string());

    graph.add_node(
        Node::new(
            "fetch",
            NodeConfig::Service(ServiceConfig::new("GET", "{{url}}").with_retry(2, 500)),
        )
        .with_name("Fetch Quote"),
    );
    graph.add_node(
        Node::new(
            "review",
            NodeConfig::Form(FormConfig {
                schema: json!({
                    "title": "What do you make of this quote?",
                    "type": "object",
                    "properties": { "note": { "type": "string", "minLength": 1 } },
                    "required": ["note"]
                }),
            }),
        )
        .with_name("Human Review"),
    );
    graph.add_node(
        Node::new(
            "summarize",
            NodeConfig::Llm(LlmConfig {
                model: "gpt-4o-mini".to_string(),
                prompt: "Quote: {{fetch.response_data}}\nReviewer note: {{review.response_data.note}}\nSummarize both in one sentence.".to_string(),
                system: None,
                temperature: Some(0.2),
            }),
        )
        .with_name("Summarize"),
    );
    graph.connect("fetch", "review");
    graph.connect("review", "summarize");

    let json = serde_json::to_string_pretty(&graph)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  wf run --file {} --input '{{\"url\": \"https://api.github.com/zen\"}}'",
        output.display()
    );
    Ok(())
}
