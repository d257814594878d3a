// src/engine/skip.rs

use std::collections::HashSet;

use crate::dag::Dag;
use crate::types::{NodeId, OperatorKind};

/// Every node reachable downstream from `starts` (inclusive), without
/// entering Join nodes. A Join always runs, so neither it nor anything past
/// it is included.
pub fn skip_closure(dag: &Dag, starts: impl IntoIterator<Item = NodeId>) -> HashSet<NodeId> {
    let mut stack: Vec<NodeId> = starts.into_iter().collect();
    let mut skipped: HashSet<NodeId> = HashSet::new();

    while let Some(id) = stack.pop() {
        let Some(node) = dag.node(&id) else {
            continue;
        };
        if node.kind() == OperatorKind::Join {
            continue;
        }
        if !skipped.insert(id) {
            continue;
        }
        stack.extend(node.downstream().iter().cloned());
    }

    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeOptions;
    use crate::operator::{JoinOperator, MapOperator};
    use std::sync::Arc;

    #[test]
    fn flood_stops_at_join() {
        let mut dag = Dag::new("skip");
        let mut add = |id: &str, join: bool| {
            let op: Arc<dyn crate::operator::Operator> = if join {
                Arc::new(JoinOperator::first_non_null())
            } else {
                Arc::new(MapOperator::new(Ok))
            };
            dag.add_with(NodeOptions::default().with_id(id), op).unwrap()
        };
        let model = add("model", false);
        let post = add("post", false);
        let join = add("join", true);
        let after = add("after", false);
        dag.chain(&[model, post, join, after]).unwrap();

        let skipped = skip_closure(&dag, ["model".to_string()]);
        let mut skipped: Vec<_> = skipped.into_iter().collect();
        skipped.sort();
        assert_eq!(skipped, ["model", "post"]);
    }

    #[test]
    fn join_target_is_never_skipped() {
        let mut dag = Dag::new("skip-join");
        dag.add_with(
            NodeOptions::default().with_id("join"),
            Arc::new(JoinOperator::first_non_null()),
        )
        .unwrap();
        assert!(skip_closure(&dag, ["join".to_string()]).is_empty());
    }
}
