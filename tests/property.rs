mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use awel::Dag;
use awel::operator::{InputOperator, InputSource, JoinOperator};
use awel_test_utils::{CountingOperator, node_with_id};
use common::int;
use proptest::prelude::*;
use serde_json::json;

// Node i may only depend on nodes 0..i, which keeps every graph acyclic.
fn parents_strategy(max_nodes: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_nodes).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, deps)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            deps.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect()
            },
        )
    })
}

fn sum_join() -> JoinOperator {
    JoinOperator::new(|vals| Ok(json!(vals.iter().map(int).sum::<i64>())))
}

struct Built {
    dag: Dag,
    counters: Vec<Arc<AtomicUsize>>,
}

fn build(parents: &[BTreeSet<usize>]) -> Built {
    let mut dag = Dag::new("random");
    let mut refs = Vec::new();
    let mut counters = Vec::new();
    for (i, deps) in parents.iter().enumerate() {
        let id = format!("n{i}");
        let op = if deps.is_empty() {
            CountingOperator::new(&id, InputOperator::new(InputSource::value(1)))
        } else {
            CountingOperator::new(&id, sum_join())
        };
        counters.push(op.counter());
        refs.push(node_with_id(&mut dag, &id, op));
    }
    for (i, deps) in parents.iter().enumerate() {
        for &d in deps {
            dag.connect(&refs[d], &refs[i]).unwrap();
        }
    }
    Built { dag, counters }
}

/// Number of root-to-node paths; what the summing joins compute.
fn expected_paths(parents: &[BTreeSet<usize>]) -> Vec<i64> {
    let mut paths = vec![0i64; parents.len()];
    for (i, deps) in parents.iter().enumerate() {
        paths[i] = if deps.is_empty() {
            1
        } else {
            deps.iter().map(|&d| paths[d]).sum()
        };
    }
    paths
}

fn sorted_ids(ids: impl Iterator<Item = usize>) -> Vec<String> {
    let mut out: Vec<String> = ids.map(|i| format!("n{i}")).collect();
    out.sort();
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roots_and_leaves_follow_the_edges(parents in parents_strategy(12)) {
        let Built { dag, .. } = build(&parents);

        let roots = sorted_ids((0..parents.len()).filter(|&i| parents[i].is_empty()));
        let leaves = sorted_ids(
            (0..parents.len()).filter(|&i| !parents.iter().any(|deps| deps.contains(&i))),
        );

        prop_assert_eq!(dag.root_nodes(), roots.as_slice());
        prop_assert_eq!(dag.leaf_nodes(), leaves.as_slice());
    }

    #[test]
    fn every_upstream_node_runs_exactly_once(parents in parents_strategy(10)) {
        let Built { mut dag, counters } = build(&parents);
        let leaves: Vec<_> = dag
            .leaf_nodes()
            .iter()
            .filter_map(|id| dag.node(id))
            .map(|n| n.node_ref())
            .collect();
        let sink = node_with_id(&mut dag, "sink", sum_join());
        dag.set_upstream(&sink, &leaves).unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let out = rt.block_on(dag.call(&sink, None)).unwrap();

        let paths = expected_paths(&parents);
        let leaf_total: i64 = (0..parents.len())
            .filter(|&i| !parents.iter().any(|deps| deps.contains(&i)))
            .map(|i| paths[i])
            .sum();
        prop_assert_eq!(out, json!(leaf_total));
        for (i, counter) in counters.iter().enumerate() {
            prop_assert_eq!(counter.load(Ordering::SeqCst), 1, "node n{} ran more than once", i);
        }
    }
}
