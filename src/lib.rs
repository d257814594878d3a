// src/lib.rs

//! AWEL: an async DAG workflow engine.
//!
//! Graphs are built explicitly with [`Dag`], each node carrying an
//! [`operator::Operator`]. A run is started from a leaf with [`Dag::call`] or
//! [`Dag::call_stream`]; the [`engine`] executes every upstream node once,
//! in dependency order, with branch-driven skipping.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod operator;
pub mod task;
pub mod trigger;
pub mod types;
pub mod workflow;

use anyhow::Context;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

pub use dag::{Dag, DagContext, DagNode, NodeOptions, NodeRef};
pub use engine::{DefaultWorkflowRunner, JobManager, WorkflowRunner};
pub use errors::{AwelError, Result};
pub use exec::BlockingExecutor;
pub use task::{InputContext, TaskContext, TaskOutput, ValueStream};
pub use types::{NodeId, OperatorKind, TaskState};
pub use workflow::Workflow;

use crate::cli::CliArgs;

/// High-level entry point used by `main.rs`: load the workflow, then either
/// describe it (`--dry-run`) or run it once and print the result to stdout.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let workflow = Workflow::load(&args.workflow)
        .with_context(|| format!("loading workflow {}", args.workflow.display()))?;

    if args.dry_run {
        print_dry_run(&workflow);
        return Ok(());
    }

    let leaf = workflow.leaf(args.leaf.as_deref())?;
    let call_data = args
        .data
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("parsing --data as JSON")?;

    if args.stream {
        let mut stream = workflow.dag().call_stream(&leaf, call_data).await?;
        while let Some(item) = stream.next().await {
            println!("{}", item?);
        }
    } else {
        let value = workflow.dag().call(&leaf, call_data).await?;
        println!("{value}");
    }
    Ok(())
}

/// Print nodes, edges, roots and leaves without running anything.
fn print_dry_run(workflow: &Workflow) {
    let dag = workflow.dag();
    println!("awel dry-run: {}", dag.name());
    println!();

    let mut nodes: Vec<&DagNode> = dag.nodes().collect();
    nodes.sort_by(|a, b| a.id().cmp(b.id()));

    println!("nodes ({}):", nodes.len());
    for node in nodes {
        println!("  - {} ({})", node.id(), node.kind());
        if !node.upstream().is_empty() {
            println!("      after: {:?}", node.upstream());
        }
    }
    println!();
    println!("roots: {:?}", dag.root_nodes());
    println!("leaves: {:?}", dag.leaf_nodes());

    debug!("dry-run complete (no execution)");
}
