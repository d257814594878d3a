mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use awel::operator::{
    BranchOperator, InputOperator, InputSource, JoinOperator, MapOperator, ReduceStreamOperator,
    TriggerOperator,
};
use awel::{AwelError, Dag, OperatorKind, TaskState};
use awel_test_utils::{CountingOperator, FailingOperator, node_with_id};
use common::{add, identity, init_tracing, square, with_timeout};
use serde_json::{Value, json};

#[tokio::test]
async fn linear_chain_yields_26() {
    init_tracing();
    let mut dag = Dag::new("linear");
    let input = dag.add(InputOperator::new(InputSource::value(5))).unwrap();
    let sq = dag.add(square()).unwrap();
    let inc = dag.add(add(1)).unwrap();
    dag.chain(&[input, sq, inc.clone()]).unwrap();

    let out = with_timeout(dag.call(&inc, None)).await.unwrap();
    assert_eq!(out, json!(26));
}

#[tokio::test]
async fn diamond_runs_shared_ancestor_once() {
    init_tracing();
    let mut dag = Dag::new("diamond");
    let a_op = CountingOperator::new("a", InputOperator::new(InputSource::value(3)));
    let a_count = a_op.counter();
    let a = node_with_id(&mut dag, "a", a_op);
    let b = node_with_id(&mut dag, "b", add(1));
    let c = node_with_id(&mut dag, "c", add(2));
    let d = node_with_id(
        &mut dag,
        "d",
        JoinOperator::new(|vals| Ok(json!(vals.iter().filter_map(Value::as_i64).sum::<i64>()))),
    );
    dag.set_downstream(&a, &[b.clone(), c.clone()]).unwrap();
    dag.set_upstream(&d, &[b, c]).unwrap();

    let out = with_timeout(dag.call(&d, None)).await.unwrap();
    assert_eq!(out, json!(9));
    assert_eq!(a_count.load(Ordering::SeqCst), 1);

    // A second call is a fresh run.
    with_timeout(dag.call(&d, None)).await.unwrap();
    assert_eq!(a_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn call_data_reaches_the_single_root() {
    let mut dag = Dag::new("call-data");
    let root = dag.add(TriggerOperator).unwrap();
    let sq = dag.add(square()).unwrap();
    dag.connect(&root, &sq).unwrap();

    assert_eq!(dag.call(&sq, Some(json!(7))).await.unwrap(), json!(49));
}

#[tokio::test]
async fn multi_root_call_data_is_split_by_root_id() {
    init_tracing();
    let mut dag = Dag::new("multi-root");
    let a = node_with_id(&mut dag, "A", TriggerOperator);
    let b = node_with_id(&mut dag, "B", TriggerOperator);
    let j = node_with_id(&mut dag, "J", JoinOperator::new(|vals| Ok(json!(vals))));
    dag.set_upstream(&j, &[a, b]).unwrap();

    let out = dag.call(&j, Some(json!({"A": 1, "B": 2}))).await.unwrap();
    assert_eq!(out, json!([1, 2]));

    // A root without a slice gets no call data.
    let out = dag.call(&j, Some(json!({"B": 2}))).await.unwrap();
    assert_eq!(out, json!([null, 2]));

    let err = dag.call(&j, Some(json!(12))).await.unwrap_err();
    assert!(matches!(err, AwelError::ConfigError(_)), "{err:?}");
}

#[tokio::test]
async fn root_map_prefers_call_data_and_fails_without_it() {
    let mut dag = Dag::new("root-map");
    let m = dag.add(square()).unwrap();

    assert_eq!(dag.call(&m, Some(json!(3))).await.unwrap(), json!(9));

    let err = dag.call(&m, None).await.unwrap_err();
    assert!(matches!(err, AwelError::ConfigError(_)), "{err:?}");
}

#[tokio::test]
async fn failure_surfaces_and_stops_downstream() {
    init_tracing();
    let mut dag = Dag::new("failure");
    let input = node_with_id(&mut dag, "in", InputOperator::new(InputSource::value(1)));
    let boom = node_with_id(&mut dag, "boom", FailingOperator::new("model exploded"));
    let after_op = CountingOperator::new("after", add(1));
    let after_count = after_op.counter();
    let after = node_with_id(&mut dag, "after", after_op);
    dag.chain(&[input, boom, after.clone()]).unwrap();

    assert_eq!(dag.node("boom").unwrap().kind(), OperatorKind::Custom);

    let err = dag.call(&after, None).await.unwrap_err();
    assert!(matches!(err, AwelError::Other(_)));
    assert!(err.to_string().contains("model exploded"));
    assert_eq!(after_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn continued_run_surfaces_failure() {
    let mut dag = Dag::new("states");
    let input = node_with_id(&mut dag, "in", InputOperator::new(InputSource::value(1)));
    let bad = node_with_id(&mut dag, "bad", FailingOperator::new("nope"));
    dag.connect(&input, &bad).unwrap();

    let ctx = dag.run(&input, None, false, None).await.unwrap();
    assert_eq!(ctx.task_context("in").unwrap().current_state(), TaskState::Success);

    // Continue the same run up to the failing node; the error still surfaces.
    let err = dag.run(&bad, None, false, Some(ctx)).await.unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[tokio::test]
async fn reduce_on_a_scalar_parent_is_a_config_error() {
    let mut dag = Dag::new("reduce-scalar");
    let input = dag.add(InputOperator::new(InputSource::value(1))).unwrap();
    let reduce = dag
        .add(ReduceStreamOperator::new(|a, b| {
            Ok(json!(a.as_i64().unwrap_or(0) + b.as_i64().unwrap_or(0)))
        }))
        .unwrap();
    dag.connect(&input, &reduce).unwrap();

    let err = dag.call(&reduce, None).await.unwrap_err();
    assert!(matches!(err, AwelError::ConfigError(_)), "{err:?}");
}

#[tokio::test]
async fn branch_on_a_stream_parent_is_a_config_error() {
    let mut dag = Dag::new("branch-stream");
    let input = dag
        .add(InputOperator::new(InputSource::iterable([json!(1), json!(2)])))
        .unwrap();
    let branch = dag
        .add(BranchOperator::new().branch(|_| Ok(true), "x"))
        .unwrap();
    let x = dag.add_named("x", identity()).unwrap();
    dag.chain(&[input, branch, x.clone()]).unwrap();

    let err = dag.call(&x, None).await.unwrap_err();
    assert!(matches!(err, AwelError::ConfigError(_)), "{err:?}");
}

#[tokio::test]
async fn lifecycle_hooks_run_around_non_streaming_calls() {
    let hooks = Arc::new(Mutex::new(Vec::new()));
    let mut dag = Dag::new("hooks");
    let a = dag
        .add(
            CountingOperator::new("a", InputOperator::new(InputSource::value(2)))
                .with_hook_log(hooks.clone()),
        )
        .unwrap();
    let b = dag
        .add(CountingOperator::new("b", square()).with_hook_log(hooks.clone()))
        .unwrap();
    dag.connect(&a, &b).unwrap();

    dag.call(&b, None).await.unwrap();
    let log = hooks.lock().unwrap().clone();
    assert_eq!(log.len(), 4);
    assert!(log[..2].iter().all(|e| e.starts_with("before:")));
    assert!(log[2..].iter().all(|e| e.starts_with("after:")));
}

#[tokio::test]
async fn reused_context_skips_memoized_nodes() {
    let mut dag = Dag::new("reuse");
    let a_op = CountingOperator::new("a", InputOperator::new(InputSource::value(4)));
    let a_count = a_op.counter();
    let a = dag.add(a_op).unwrap();
    let b = dag.add(square()).unwrap();
    let c = dag.add(add(1)).unwrap();
    dag.connect(&a, &b).unwrap();
    dag.connect(&a, &c).unwrap();

    let ctx = dag.run(&b, None, false, None).await.unwrap();
    let ctx = dag.run(&c, None, false, Some(ctx)).await.unwrap();

    assert_eq!(a_count.load(Ordering::SeqCst), 1);
    let c_out = ctx.task_context(c.node_id()).unwrap();
    assert_eq!(c_out.task_output().output().unwrap(), Some(&json!(5)));
}

#[tokio::test]
async fn async_map_functions_are_awaited() {
    let mut dag = Dag::new("async");
    let input = dag.add(InputOperator::new(InputSource::value(10))).unwrap();
    let halve = dag
        .add(MapOperator::from_async(|v: Value| async move {
            tokio::task::yield_now().await;
            Ok(json!(v.as_i64().unwrap_or(0) / 2))
        }))
        .unwrap();
    dag.connect(&input, &halve).unwrap();
    assert_eq!(dag.call(&halve, None).await.unwrap(), json!(5));
}

#[tokio::test]
async fn blocking_map_errors_surface_unchanged() {
    let mut dag = Dag::new("blocking-error");
    let input = dag.add(InputOperator::new(InputSource::value(0))).unwrap();
    let divide = dag
        .add(MapOperator::new(|v| {
            let d = v.as_i64().unwrap_or(0);
            if d == 0 {
                anyhow::bail!("division by zero");
            }
            Ok(json!(100 / d))
        }))
        .unwrap();
    dag.connect(&input, &divide).unwrap();

    let err = dag.call(&divide, None).await.unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
}
