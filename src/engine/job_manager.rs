// src/engine/job_manager.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use tracing::debug;

use crate::dag::{Dag, NodeRef};
use crate::errors::{AwelError, Result};
use crate::types::NodeId;

/// One run's worth of work: every node the leaf depends on, in an order
/// that puts each node after all of its parents.
#[derive(Debug, Clone)]
pub struct JobManager {
    leaf: NodeId,
    order: Vec<NodeId>,
    waves: Vec<Vec<NodeId>>,
    roots: Vec<NodeId>,
    call_data: HashMap<NodeId, Value>,
    name_to_id: HashMap<String, NodeId>,
}

impl JobManager {
    /// Collect the upstream closure of `leaf` and hand `call_data` to its
    /// roots.
    ///
    /// With one root the whole payload goes to it. With several roots the
    /// payload must be an object keyed by root node id; roots without an
    /// entry get no call data. A `null` payload counts as no call data.
    pub fn build_from_end_node(
        dag: &Dag,
        leaf: &NodeRef,
        call_data: Option<Value>,
    ) -> Result<Self> {
        let leaf_node = dag.resolve(leaf)?;

        let mut members: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![leaf_node.id()];
        while let Some(id) = stack.pop() {
            if !members.insert(id) {
                continue;
            }
            let node = dag
                .node(id)
                .ok_or_else(|| AwelError::NodeNotFound(id.to_string()))?;
            stack.extend(node.upstream().iter().map(String::as_str));
        }

        let mut roots: Vec<NodeId> = members
            .iter()
            .filter(|id| dag.node(id).is_some_and(|n| n.upstream().is_empty()))
            .map(|id| id.to_string())
            .collect();
        roots.sort();

        let call_data = distribute_call_data(&roots, call_data)?;

        let name_to_id = members
            .iter()
            .filter_map(|id| dag.node(id))
            .filter_map(|n| n.name().map(|name| (name.to_string(), n.id().to_string())))
            .collect();

        // Edge direction: parent -> child.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in &members {
            graph.add_node(*id);
        }
        for id in &members {
            if let Some(node) = dag.node(id) {
                for parent in node.upstream() {
                    graph.add_edge(parent.as_str(), *id, ());
                }
            }
        }
        let order = toposort(&graph, None).map_err(|cycle| {
            AwelError::DagCycle(format!(
                "cycle detected in job involving node '{}'",
                cycle.node_id()
            ))
        })?;

        // A node's wave is one past the deepest wave among its parents.
        let mut depth: HashMap<&str, usize> = HashMap::new();
        for id in &order {
            let d = dag
                .node(id)
                .map(|n| {
                    n.upstream()
                        .iter()
                        .filter_map(|p| depth.get(p.as_str()))
                        .map(|d| d + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            depth.insert(*id, d);
        }
        let wave_count = depth.values().max().map_or(0, |d| d + 1);
        let mut waves: Vec<Vec<NodeId>> = vec![Vec::new(); wave_count];
        for id in &order {
            waves[depth[id]].push(id.to_string());
        }
        for wave in &mut waves {
            wave.sort();
        }

        debug!(
            dag = %dag.name(),
            leaf = %leaf_node.id(),
            nodes = order.len(),
            waves = waves.len(),
            roots = roots.len(),
            "job built"
        );

        Ok(Self {
            leaf: leaf_node.id().to_string(),
            order: order.into_iter().map(str::to_string).collect(),
            waves,
            roots,
            call_data,
            name_to_id,
        })
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Every node of the job in topological order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.order.iter().any(|id| id == node_id)
    }

    /// Groups of nodes whose parents all sit in earlier groups.
    pub fn waves(&self) -> &[Vec<NodeId>] {
        &self.waves
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn call_data_for(&self, node_id: &str) -> Option<&Value> {
        self.call_data.get(node_id)
    }

    pub fn node_id_by_name(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }
}

fn distribute_call_data(
    roots: &[NodeId],
    call_data: Option<Value>,
) -> Result<HashMap<NodeId, Value>> {
    let mut out = HashMap::new();
    let Some(data) = call_data.filter(|v| !v.is_null()) else {
        return Ok(out);
    };

    if let [root] = roots {
        out.insert(root.clone(), data);
        return Ok(out);
    }

    let Value::Object(mut by_root) = data else {
        return Err(AwelError::config(format!(
            "call data for a job with {} roots must be an object keyed by root node id",
            roots.len()
        )));
    };
    for root in roots {
        if let Some(value) = by_root.remove(root) {
            out.insert(root.clone(), value);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeOptions;
    use crate::operator::{JoinOperator, MapOperator, TriggerOperator};
    use serde_json::json;
    use std::sync::Arc;

    fn with_id(dag: &mut Dag, id: &str, op: Arc<dyn crate::operator::Operator>) -> NodeRef {
        dag.add_with(NodeOptions::named(id).with_id(id), op).unwrap()
    }

    fn diamond() -> (Dag, NodeRef) {
        let mut dag = Dag::new("diamond");
        let a = with_id(&mut dag, "a", Arc::new(TriggerOperator));
        let b = with_id(&mut dag, "b", Arc::new(MapOperator::new(Ok)));
        let c = with_id(&mut dag, "c", Arc::new(MapOperator::new(Ok)));
        let d = with_id(&mut dag, "d", Arc::new(JoinOperator::first_non_null()));
        dag.set_downstream(&a, &[b.clone(), c.clone()]).unwrap();
        dag.set_upstream(&d, &[b, c]).unwrap();
        (dag, d)
    }

    #[test]
    fn waves_follow_dependency_depth() {
        let (dag, d) = diamond();
        let job = JobManager::build_from_end_node(&dag, &d, None).unwrap();
        assert_eq!(
            job.waves(),
            [vec!["a".to_string()], vec!["b".to_string(), "c".to_string()], vec!["d".to_string()]]
        );
        assert_eq!(job.roots(), ["a"]);
        assert_eq!(job.node_id_by_name("c"), Some("c"));
    }

    #[test]
    fn only_upstream_of_the_leaf_is_collected() {
        let (dag, _) = diamond();
        let b = dag.node("b").unwrap().node_ref();
        let job = JobManager::build_from_end_node(&dag, &b, None).unwrap();
        assert_eq!(job.len(), 2);
        assert!(!job.contains("c"));
    }

    #[test]
    fn single_root_gets_whole_payload() {
        let (dag, d) = diamond();
        let job = JobManager::build_from_end_node(&dag, &d, Some(json!([1, 2]))).unwrap();
        assert_eq!(job.call_data_for("a"), Some(&json!([1, 2])));
    }

    #[test]
    fn multiple_roots_get_their_own_slice() {
        let mut dag = Dag::new("two-roots");
        let a = with_id(&mut dag, "a", Arc::new(TriggerOperator));
        let b = with_id(&mut dag, "b", Arc::new(TriggerOperator));
        let j = with_id(&mut dag, "j", Arc::new(JoinOperator::first_non_null()));
        dag.set_upstream(&j, &[a, b]).unwrap();

        let job = JobManager::build_from_end_node(&dag, &j, Some(json!({"a": 1}))).unwrap();
        assert_eq!(job.call_data_for("a"), Some(&json!(1)));
        assert_eq!(job.call_data_for("b"), None);

        let err = JobManager::build_from_end_node(&dag, &j, Some(json!(3))).unwrap_err();
        assert!(matches!(err, AwelError::ConfigError(_)));
    }
}
