// src/dag/graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::dag::DagContext;
use crate::engine::{DefaultWorkflowRunner, WorkflowRunner};
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::ValueStream;
use crate::types::{DagId, NodeId, OperatorKind};

/// Handle to a node, returned by the builder methods of [`Dag`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    dag_id: DagId,
    node_id: NodeId,
}

impl NodeRef {
    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

/// Optional identity for a new node. A missing id is generated.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub node_id: Option<NodeId>,
    pub node_name: Option<String>,
}

impl NodeOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            node_id: None,
            node_name: Some(name.into()),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.node_id = Some(id.into());
        self
    }
}

/// A node of a [`Dag`]: identity, immediate edges, and the operator it runs.
pub struct DagNode {
    dag_id: DagId,
    id: NodeId,
    name: Option<String>,
    upstream: Vec<NodeId>,
    downstream: Vec<NodeId>,
    operator: Arc<dyn Operator>,
}

impl std::fmt::Debug for DagNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.operator.kind())
            .field("upstream", &self.upstream)
            .field("downstream", &self.downstream)
            .finish()
    }
}

impl DagNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Parents, in the order the edges were declared.
    pub fn upstream(&self) -> &[NodeId] {
        &self.upstream
    }

    pub fn downstream(&self) -> &[NodeId] {
        &self.downstream
    }

    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    pub fn kind(&self) -> OperatorKind {
        self.operator.kind()
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef {
            dag_id: self.dag_id.clone(),
            node_id: self.id.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct DerivedViews {
    roots: Vec<NodeId>,
    leaves: Vec<NodeId>,
    triggers: Vec<NodeId>,
}

/// A named, acyclic graph of operators.
///
/// Built once, then run any number of times (concurrently, too) through
/// [`Dag::call`] and [`Dag::call_stream`]. All per-run state lives in the
/// [`DagContext`] the runner creates.
pub struct Dag {
    id: DagId,
    name: String,
    nodes: HashMap<NodeId, DagNode>,
    names: HashMap<String, NodeId>,
    views: OnceLock<DerivedViews>,
    runner: Arc<dyn WorkflowRunner>,
}

impl std::fmt::Debug for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Dag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            nodes: HashMap::new(),
            names: HashMap::new(),
            views: OnceLock::new(),
            runner: Arc::new(DefaultWorkflowRunner::default()),
        }
    }

    /// Replace the scheduler used by `call` / `call_stream`.
    pub fn with_runner(mut self, runner: Arc<dyn WorkflowRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DagNode> {
        self.nodes.values()
    }

    // ---------------------------------------------------------------------
    // Building
    // ---------------------------------------------------------------------

    pub fn add(&mut self, operator: impl Operator + 'static) -> Result<NodeRef> {
        self.add_with(NodeOptions::default(), Arc::new(operator))
    }

    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        operator: impl Operator + 'static,
    ) -> Result<NodeRef> {
        self.add_with(NodeOptions::named(name), Arc::new(operator))
    }

    /// Add a node with explicit identity.
    pub fn add_with(
        &mut self,
        options: NodeOptions,
        operator: Arc<dyn Operator>,
    ) -> Result<NodeRef> {
        let id = options
            .node_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.nodes.contains_key(&id) {
            return Err(AwelError::DuplicateNodeId(id));
        }
        if let Some(name) = &options.node_name {
            if self.names.contains_key(name) {
                return Err(AwelError::DuplicateNodeName(name.clone()));
            }
            self.names.insert(name.clone(), id.clone());
        }

        debug!(dag = %self.name, node = %id, name = ?options.node_name, kind = %operator.kind(), "node added");
        self.nodes.insert(
            id.clone(),
            DagNode {
                dag_id: self.id.clone(),
                id: id.clone(),
                name: options.node_name,
                upstream: Vec::new(),
                downstream: Vec::new(),
                operator,
            },
        );
        self.views = OnceLock::new();

        Ok(NodeRef {
            dag_id: self.id.clone(),
            node_id: id,
        })
    }

    /// Declare `from -> to`. Repeating an existing edge is a no-op.
    pub fn connect(&mut self, from: &NodeRef, to: &NodeRef) -> Result<()> {
        self.resolve(from)?;
        self.resolve(to)?;

        if from.node_id == to.node_id {
            return Err(AwelError::InvalidDependency(format!(
                "node '{}' cannot depend on itself",
                from.node_id
            )));
        }
        if self.reaches(&to.node_id, &from.node_id) {
            return Err(AwelError::DagCycle(format!(
                "edge '{}' -> '{}' would close a cycle",
                from.node_id, to.node_id
            )));
        }

        let already = self
            .nodes
            .get(&from.node_id)
            .is_some_and(|n| n.downstream.contains(&to.node_id));
        if already {
            return Ok(());
        }

        if let Some(node) = self.nodes.get_mut(&from.node_id) {
            node.downstream.push(to.node_id.clone());
        }
        if let Some(node) = self.nodes.get_mut(&to.node_id) {
            node.upstream.push(from.node_id.clone());
        }
        self.views = OnceLock::new();
        Ok(())
    }

    /// Make every node in `parents` an upstream of `node`.
    pub fn set_upstream(&mut self, node: &NodeRef, parents: &[NodeRef]) -> Result<()> {
        for parent in parents {
            self.connect(parent, node)?;
        }
        Ok(())
    }

    /// Make every node in `children` a downstream of `node`.
    pub fn set_downstream(&mut self, node: &NodeRef, children: &[NodeRef]) -> Result<()> {
        for child in children {
            self.connect(node, child)?;
        }
        Ok(())
    }

    /// Connect `nodes[0] -> nodes[1] -> ... -> nodes[n-1]`.
    pub fn chain(&mut self, nodes: &[NodeRef]) -> Result<()> {
        for pair in nodes.windows(2) {
            self.connect(&pair[0], &pair[1])?;
        }
        Ok(())
    }

    /// Whether `to` can be reached from `from` along downstream edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack: Vec<&str> = vec![from];
        let mut visited: HashSet<&str> = HashSet::new();

        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.downstream.iter().map(String::as_str));
            }
        }
        false
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// Look up a handle, rejecting handles minted by another DAG.
    pub fn resolve(&self, node: &NodeRef) -> Result<&DagNode> {
        if node.dag_id != self.id {
            return Err(AwelError::CrossDag {
                node: node.node_id.clone(),
                expected: self.id.clone(),
                found: node.dag_id.clone(),
            });
        }
        self.nodes
            .get(&node.node_id)
            .ok_or_else(|| AwelError::NodeNotFound(node.node_id.clone()))
    }

    pub fn node(&self, node_id: &str) -> Option<&DagNode> {
        self.nodes.get(node_id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&DagNode> {
        self.names.get(name).and_then(|id| self.nodes.get(id))
    }

    // ---------------------------------------------------------------------
    // Derived views
    // ---------------------------------------------------------------------

    fn views(&self) -> &DerivedViews {
        self.views.get_or_init(|| {
            let mut views = DerivedViews::default();
            for node in self.nodes.values() {
                if node.upstream.is_empty() {
                    views.roots.push(node.id.clone());
                    if node.kind().is_trigger() {
                        views.triggers.push(node.id.clone());
                    }
                }
                if node.downstream.is_empty() {
                    views.leaves.push(node.id.clone());
                }
            }
            views.roots.sort();
            views.leaves.sort();
            views.triggers.sort();
            views
        })
    }

    /// Nodes without parents, sorted by id.
    pub fn root_nodes(&self) -> &[NodeId] {
        &self.views().roots
    }

    /// Nodes without children, sorted by id.
    pub fn leaf_nodes(&self) -> &[NodeId] {
        &self.views().leaves
    }

    /// Root nodes of the Input or Trigger kind, sorted by id.
    pub fn trigger_nodes(&self) -> &[NodeId] {
        &self.views().triggers
    }

    // ---------------------------------------------------------------------
    // Running
    // ---------------------------------------------------------------------

    /// Run the graph ending at `leaf` and return the full run state.
    ///
    /// Passing an `existing` context continues a previous run: nodes it
    /// already memoized are not executed again.
    pub async fn run(
        &self,
        leaf: &NodeRef,
        call_data: Option<Value>,
        streaming: bool,
        existing: Option<DagContext>,
    ) -> Result<DagContext> {
        self.resolve(leaf)?;
        self.runner
            .execute_workflow(self, leaf, call_data, streaming, existing)
            .await
    }

    /// Run the graph ending at `leaf` and return its scalar output. A leaf
    /// that produced nothing (skipped, or an empty join) yields `null`.
    pub async fn call(&self, leaf: &NodeRef, call_data: Option<Value>) -> Result<Value> {
        let ctx = self.run(leaf, call_data, false, None).await?;
        let task = ctx
            .task_context(leaf.node_id())
            .ok_or_else(|| AwelError::NodeNotFound(leaf.node_id().to_string()))?;
        Ok(task.task_output().output()?.cloned().unwrap_or(Value::Null))
    }

    /// Run the graph ending at `leaf` and return its output stream.
    ///
    /// `after_dag_end` hooks run once the returned stream is exhausted. A
    /// stream dropped early skips them.
    pub async fn call_stream(
        &self,
        leaf: &NodeRef,
        call_data: Option<Value>,
    ) -> Result<ValueStream> {
        let ctx = self.run(leaf, call_data, true, None).await?;
        let task = ctx
            .task_context(leaf.node_id())
            .ok_or_else(|| AwelError::NodeNotFound(leaf.node_id().to_string()))?;
        if !task.task_output().is_stream() {
            return Err(AwelError::NotAStream);
        }
        let output = task.task_output().take_stream()?;

        let operators: Vec<Arc<dyn Operator>> = ctx
            .node_outputs()
            .keys()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| Arc::clone(&node.operator))
            .collect();

        let finish = stream::once(async move {
            for op in operators {
                op.after_dag_end().await?;
            }
            Ok::<(), AwelError>(())
        })
        .filter_map(|done: Result<()>| async move { done.err().map(Err::<Value, AwelError>) });

        Ok(output.chain(finish).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{InputOperator, InputSource, MapOperator, TriggerOperator};
    use serde_json::json;

    fn identity() -> MapOperator {
        MapOperator::new(Ok)
    }

    #[test]
    fn views_follow_edges_and_are_recomputed_after_insertions() {
        let mut dag = Dag::new("views");
        let a = dag.add_with(NodeOptions::default().with_id("a"), Arc::new(TriggerOperator)).unwrap();
        let b = dag.add_with(NodeOptions::default().with_id("b"), Arc::new(identity())).unwrap();
        assert_eq!(dag.root_nodes(), ["a", "b"]);
        assert_eq!(dag.trigger_nodes(), ["a"]);

        dag.connect(&a, &b).unwrap();
        assert_eq!(dag.root_nodes(), ["a"]);
        assert_eq!(dag.leaf_nodes(), ["b"]);

        let c = dag.add_with(NodeOptions::default().with_id("c"), Arc::new(identity())).unwrap();
        assert_eq!(dag.leaf_nodes(), ["b", "c"]);
        dag.connect(&b, &c).unwrap();
        assert_eq!(dag.leaf_nodes(), ["c"]);
    }

    #[test]
    fn duplicate_names_and_ids_are_rejected() {
        let mut dag = Dag::new("dups");
        dag.add_named("x", identity()).unwrap();
        assert!(matches!(dag.add_named("x", identity()), Err(AwelError::DuplicateNodeName(_))));

        dag.add_with(NodeOptions::default().with_id("id1"), Arc::new(identity())).unwrap();
        let again = dag.add_with(NodeOptions::default().with_id("id1"), Arc::new(identity()));
        assert!(matches!(again, Err(AwelError::DuplicateNodeId(_))));
    }

    #[test]
    fn cross_dag_handles_are_rejected() {
        let mut left = Dag::new("left");
        let mut right = Dag::new("right");
        let a = left.add(identity()).unwrap();
        let b = right.add(identity()).unwrap();
        assert!(matches!(left.connect(&a, &b), Err(AwelError::CrossDag { .. })));
    }

    #[test]
    fn cycles_are_rejected_when_the_edge_is_added() {
        let mut dag = Dag::new("cycle");
        let a = dag.add(identity()).unwrap();
        let b = dag.add(identity()).unwrap();
        let c = dag.add(identity()).unwrap();
        dag.chain(&[a.clone(), b.clone(), c.clone()]).unwrap();

        assert!(matches!(dag.connect(&c, &a), Err(AwelError::DagCycle(_))));
        assert!(matches!(dag.connect(&a, &a), Err(AwelError::InvalidDependency(_))));
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut dag = Dag::new("edges");
        let a = dag.add(identity()).unwrap();
        let b = dag.add(identity()).unwrap();
        dag.connect(&a, &b).unwrap();
        dag.set_downstream(&a, &[b.clone()]).unwrap();
        assert_eq!(dag.resolve(&b).unwrap().upstream().len(), 1);
    }

    #[tokio::test]
    async fn call_stream_on_a_scalar_leaf_is_not_a_stream() {
        let mut dag = Dag::new("scalar");
        let a = dag.add(InputOperator::new(InputSource::value(json!(1)))).unwrap();
        assert!(matches!(dag.call_stream(&a, None).await, Err(AwelError::NotAStream)));
        assert_eq!(dag.call(&a, None).await.unwrap(), json!(1));
    }
}
