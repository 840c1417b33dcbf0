use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weft::{
    CommandProvider, EndpointDefinition, EndpointExecutor, ExecuteOptions, ProgressEvent,
    ProgressSink,
};
use weft_graph::{
    check_transition, transition_status, GraphStore, MemoryGraphStore, Rule, TransitionOutcome,
    Workflow,
};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Graph-structured workflow backend with learned endpoints", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory
    Init,

    /// Manage workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Execute an endpoint definition
    Execute {
        /// Path to the endpoint definition (JSON)
        endpoint: PathBuf,

        /// Workflow to preview (and apply) the delta against
        #[arg(short, long)]
        workflow: Option<String>,

        /// Extra input files copied into the run workdir
        #[arg(short, long)]
        input: Vec<PathBuf>,

        /// Apply the delta instead of stopping at the preview
        #[arg(long)]
        apply: bool,

        /// Persist the run as a reusable skill
        #[arg(long)]
        learn: bool,

        /// Override the iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Override the wall-clock budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Model provider command to shell out to
        #[arg(long, default_value = "claude")]
        provider: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transition a node's status, gated by edge rules
    Transition {
        /// Node ID
        node_id: String,

        /// Target status
        status: String,

        /// Path to a rules file (JSON array)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Check the transition without applying it
        #[arg(long)]
        check: bool,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Create a workflow
    Create {
        name: String,

        /// Allowed node statuses (empty means unrestricted)
        #[arg(short, long, value_delimiter = ',')]
        statuses: Vec<String>,
    },

    /// List workflows
    List,

    /// Show node/edge counts for a workflow
    Stats {
        /// Workflow ID
        workflow_id: String,
    },

    /// Delete a workflow and everything in it
    Delete {
        /// Workflow ID
        workflow_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "weft=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(&cli);
    let graph_path = data_dir.join("graph.json");

    match cli.command {
        Commands::Init => {
            std::fs::create_dir_all(data_dir.join("runs"))?;
            std::fs::create_dir_all(data_dir.join("skills"))?;
            let store = MemoryGraphStore::load(&graph_path)?;
            store.save(&graph_path)?;
            println!("Initialized data directory at {}", data_dir.display());
        }

        Commands::Workflow { ref action } => {
            let store = MemoryGraphStore::load(&graph_path)?;

            match action {
                WorkflowAction::Create { name, statuses } => {
                    let workflow = Workflow::new(name).with_statuses(statuses.clone());
                    let created = store.create_workflow(workflow)?;
                    store.save(&graph_path)?;
                    println!("Created workflow {} ({})", created.id, created.name);
                    if !created.node_statuses.is_empty() {
                        println!("  Statuses: {}", created.node_statuses.join(", "));
                    }
                }

                WorkflowAction::List => {
                    let workflows = store.list_workflows()?;
                    if workflows.is_empty() {
                        println!("No workflows. Run 'weft workflow create <name>' first.");
                    } else {
                        println!("Workflows:");
                        for workflow in workflows {
                            let stats = store.stats(&workflow.id)?;
                            println!(
                                "  {}  {}  ({} nodes, {} edges)",
                                workflow.id, workflow.name, stats.nodes, stats.edges
                            );
                        }
                    }
                }

                WorkflowAction::Stats { workflow_id } => {
                    let stats = store.stats(workflow_id)?;
                    println!("Workflow {}:", workflow_id);
                    println!("  Nodes: {}", stats.nodes);
                    for (node_type, count) in &stats.nodes_by_type {
                        println!("    {}: {}", node_type, count);
                    }
                    println!("  Edges: {}", stats.edges);
                    for (edge_type, count) in &stats.edges_by_type {
                        println!("    {}: {}", edge_type, count);
                    }
                }

                WorkflowAction::Delete { workflow_id } => {
                    store.delete_workflow(workflow_id)?;
                    store.save(&graph_path)?;
                    println!("Deleted workflow {}", workflow_id);
                }
            }
        }

        Commands::Execute {
            ref endpoint,
            ref workflow,
            ref input,
            apply,
            learn,
            max_iterations,
            timeout,
            ref provider,
            json,
        } => {
            let mut endpoint = EndpointDefinition::from_file(endpoint)?;
            endpoint.input_files.extend(input.iter().cloned());
            let store = Arc::new(MemoryGraphStore::load(&graph_path)?);
            let provider = Arc::new(CommandProvider::new(provider));
            let executor = EndpointExecutor::new(
                provider,
                Arc::clone(&store) as Arc<dyn GraphStore>,
                &data_dir,
            );

            let options = ExecuteOptions {
                workflow_id: workflow.clone(),
                apply,
                learn,
                max_iterations,
                timeout: timeout.map(Duration::from_secs),
            };

            let (sink, mut rx) = ProgressSink::channel();
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        ProgressEvent::Phase { name } => println!("  phase: {}", name),
                        ProgressEvent::ToolCall { name, detail } => {
                            println!("  tool: {} {}", name, detail)
                        }
                        ProgressEvent::ValidationFailed { violations } => {
                            println!("  validation failed ({} problems), retrying", violations)
                        }
                        ProgressEvent::ChunkCompleted {
                            chunk,
                            items,
                            total,
                        } => println!("  chunk {}: {} records ({} total)", chunk, items, total),
                        ProgressEvent::Keepalive => {}
                        ProgressEvent::Completed { .. } => {}
                    }
                }
            });

            println!("Executing endpoint '{}'...", endpoint.name);
            let result = executor.execute(&endpoint, &options, &sink).await?;
            drop(sink);
            let _ = printer.await;

            if apply {
                store.save(&graph_path)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            let status = if result.success { "✓" } else { "✗" };
            println!("\n[{}] run {} ({} chunk(s))", status, result.run_id, result.chunks);
            if let Some(ref manifest) = result.manifest {
                println!(
                    "  {} item(s), validation {}",
                    manifest.item_count,
                    if manifest.validation_passed {
                        "passed"
                    } else {
                        "failed"
                    }
                );
                println!("  artifact: {}", manifest.artifact_path.display());
            }
            if let Some(ref preview) = result.preview {
                let p = &preview.projected;
                println!(
                    "  preview: {} create, {} update, {} skip nodes; {} create edges",
                    p.nodes_created, p.nodes_updated, p.nodes_skipped, p.edges_created
                );
                if preview.match_result.needs_review() {
                    println!("  some matches are medium-confidence; review before applying");
                }
            }
            if let Some(ref applied) = result.applied {
                let c = &applied.counts;
                println!(
                    "  applied: {} created, {} updated, {} skipped nodes; {} edges",
                    c.nodes_created, c.nodes_updated, c.nodes_skipped, c.edges_created
                );
            }
            if let Some(ref skill) = result.skill {
                println!("  skill saved: {}", skill.doc_path.display());
            }
            for error in &result.errors {
                println!("  error: {}", error);
            }
        }

        Commands::Transition {
            ref node_id,
            ref status,
            ref rules,
            check,
        } => {
            let store = MemoryGraphStore::load(&graph_path)?;
            let rules = load_rules(rules.as_deref())?;

            if check {
                let node = store.get_node(node_id)?;
                let neighbors = store.neighbors(node_id)?;
                let result = check_transition(&node, status, &rules, &neighbors);
                if result.allowed {
                    println!("✓ '{}' → '{}' would be allowed", node.title, status);
                } else {
                    println!("✗ '{}' → '{}' would be blocked:", node.title, status);
                    for violation in &result.violations {
                        println!(
                            "  - {} (needs {} '{}' edge(s), has {})",
                            violation.message,
                            violation.required,
                            violation.edge_type,
                            violation.actual
                        );
                    }
                }
                return Ok(());
            }

            match transition_status(&store, node_id, status, &rules)? {
                TransitionOutcome::Applied(node) => {
                    store.save(&graph_path)?;
                    println!(
                        "✓ {} is now '{}'",
                        node.title,
                        node.status.as_deref().unwrap_or(status)
                    );
                }
                TransitionOutcome::Blocked(blocked) => {
                    println!("✗ Transition blocked:");
                    for violation in &blocked.violations {
                        println!(
                            "  - {} (needs {} '{}' edge(s), has {})",
                            violation.message,
                            violation.required,
                            violation.edge_type,
                            violation.actual
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn resolve_data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .map(|d| d.join("weft"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    })
}

fn load_rules(path: Option<&std::path::Path>) -> Result<Vec<Rule>> {
    let Some(path) = path else {
        return Ok(vec![]);
    };
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
