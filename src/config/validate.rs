// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{NodeConfig, NodeKind, RawWorkflowFile, WorkflowFile};
use crate::errors::{AwelError, Result};

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = AwelError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_workflow(&raw)?;
        Ok(WorkflowFile::new_unchecked(raw.config, raw.node))
    }
}

fn validate_raw_workflow(cfg: &RawWorkflowFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_engine_section(cfg)?;
    validate_dependencies(cfg)?;
    validate_dag(cfg)?;
    for (name, node) in cfg.node.iter() {
        validate_node_shape(name, node)?;
    }
    validate_branch_targets(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(AwelError::config(
            "workflow must contain at least one [node.<name>] section",
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.config.blocking_threads == 0 {
        return Err(AwelError::config(
            "[config].blocking_threads must be >= 1 (got 0)",
        ));
    }
    if let Some(leaf) = &cfg.config.leaf {
        if !cfg.node.contains_key(leaf) {
            return Err(AwelError::config(format!(
                "[config].leaf refers to unknown node '{leaf}'"
            )));
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &RawWorkflowFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            if dep == name {
                return Err(AwelError::InvalidDependency(format!(
                    "node '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.node.contains_key(dep) {
                return Err(AwelError::config(format!(
                    "node '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawWorkflowFile) -> Result<()> {
    // Edge direction: dep -> node.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(AwelError::DagCycle(format!(
            "cycle detected in workflow involving node '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_node_shape(name: &str, node: &NodeConfig) -> Result<()> {
    let kind = node.kind.as_str();
    let fail = |msg: &str| Err(AwelError::config(format!("node '{name}' ({kind}): {msg}")));

    if node.kind != NodeKind::Input && (node.value.is_some() || node.items.is_some()) {
        return fail("`value` and `items` are only valid on input nodes");
    }
    if node.kind != NodeKind::Branch && !node.branches.is_empty() {
        return fail("`branches` is only valid on branch nodes");
    }

    match node.kind {
        NodeKind::Input | NodeKind::Trigger => {
            if !node.after.is_empty() {
                return fail("must be a root (empty `after`)");
            }
            if node.cmd.is_some() {
                return fail("does not take a `cmd`");
            }
            if node.value.is_some() && node.items.is_some() {
                return fail("set at most one of `value` and `items`");
            }
        }
        NodeKind::Map | NodeKind::Streamify => {
            if node.cmd.is_none() {
                return fail("requires `cmd`");
            }
            if node.after.len() > 1 {
                return fail("takes at most one parent");
            }
        }
        NodeKind::Reduce | NodeKind::Unstreamify | NodeKind::TransformStream => {
            if node.cmd.is_none() {
                return fail("requires `cmd`");
            }
            if node.after.len() != 1 {
                return fail("requires exactly one parent");
            }
        }
        NodeKind::Join => {
            if node.after.is_empty() {
                return fail("requires at least one parent");
            }
        }
        NodeKind::Branch => {
            if node.cmd.is_some() {
                return fail("takes its predicates from `branches`, not `cmd`");
            }
            if node.after.len() != 1 {
                return fail("requires exactly one parent");
            }
            if node.branches.is_empty() {
                return fail("requires at least one entry in `branches`");
            }
        }
    }
    Ok(())
}

fn validate_branch_targets(cfg: &RawWorkflowFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for branch in node.branches.iter() {
            let is_child = cfg
                .node
                .get(&branch.target)
                .is_some_and(|target| target.after.contains(name));
            if !is_child {
                return Err(AwelError::config(format!(
                    "branch '{}' targets '{}', which does not list it in `after`",
                    name, branch.target
                )));
            }
        }
    }
    Ok(())
}
