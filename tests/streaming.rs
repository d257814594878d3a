mod common;

use std::sync::{Arc, Mutex};

use awel::operator::{
    InputOperator, InputSource, JoinOperator, ReduceStreamOperator, StreamifyOperator,
    TransformStreamOperator, UnstreamifyOperator,
};
use awel::task::collect_stream;
use awel::{AwelError, Dag, NodeRef, ValueStream};
use awel_test_utils::CountingOperator;
use common::{init_tracing, int, square, with_timeout};
use futures::StreamExt;
use serde_json::{Value, json};

fn range(v: Value) -> ValueStream {
    futures::stream::iter((0..int(&v)).map(|i| Ok(json!(i)))).boxed()
}

fn squares() -> TransformStreamOperator {
    TransformStreamOperator::new(|s| s.map(|item| item.map(|v| json!(int(&v) * int(&v)))).boxed())
}

fn streamed_squares(n: i64) -> (Dag, NodeRef) {
    let mut dag = Dag::new("squares");
    let input = dag.add(InputOperator::new(InputSource::value(n))).unwrap();
    let streamify = dag.add(StreamifyOperator::new(range)).unwrap();
    let transform = dag.add(squares()).unwrap();
    dag.chain(&[input, streamify, transform.clone()]).unwrap();
    (dag, transform)
}

#[tokio::test]
async fn streamify_then_transform_yields_squares() {
    init_tracing();
    let (dag, leaf) = streamed_squares(4);

    let stream = with_timeout(dag.call_stream(&leaf, None)).await.unwrap();
    let items = collect_stream(stream).await.unwrap();
    assert_eq!(items, json!([0, 1, 4, 9]));
}

#[tokio::test]
async fn call_stream_on_a_scalar_leaf_is_not_a_stream() {
    let mut dag = Dag::new("scalar");
    let input = dag.add(InputOperator::new(InputSource::value(3))).unwrap();
    let sq = dag.add(square()).unwrap();
    dag.connect(&input, &sq).unwrap();

    let err = dag.call_stream(&sq, None).await.err().unwrap();
    assert!(matches!(err, AwelError::NotAStream), "{err:?}");
}

#[tokio::test]
async fn reduce_folds_the_stream_left_to_right() {
    let mut dag = Dag::new("reduce");
    let input = dag
        .add(InputOperator::new(InputSource::iterable([
            json!(1),
            json!(2),
            json!(3),
            json!(4),
        ])))
        .unwrap();
    let sum = dag
        .add(ReduceStreamOperator::new(|acc, item| Ok(json!(int(&acc) + int(&item)))))
        .unwrap();
    dag.connect(&input, &sum).unwrap();

    assert_eq!(dag.call(&sum, None).await.unwrap(), json!(10));
}

#[tokio::test]
async fn map_applies_to_every_stream_element() {
    let mut dag = Dag::new("stream-map");
    let input = dag
        .add(InputOperator::new(InputSource::iterable([json!(2), json!(3)])))
        .unwrap();
    let sq = dag.add(square()).unwrap();
    dag.connect(&input, &sq).unwrap();

    let stream = dag.call_stream(&sq, None).await.unwrap();
    assert_eq!(collect_stream(stream).await.unwrap(), json!([4, 9]));
}

#[tokio::test]
async fn unstreamify_collects_into_an_array() {
    let (mut dag, transform) = streamed_squares(3);
    let collect = dag.add(UnstreamifyOperator::collect()).unwrap();
    dag.connect(&transform, &collect).unwrap();

    assert_eq!(dag.call(&collect, None).await.unwrap(), json!([0, 1, 4]));
}

#[tokio::test]
async fn stream_join_concatenates_parents_in_order() {
    let mut dag = Dag::new("stream-join");
    let a = dag
        .add(InputOperator::new(InputSource::iterable([json!("a1"), json!("a2")])))
        .unwrap();
    let b = dag
        .add(InputOperator::new(InputSource::iterable([json!("b1")])))
        .unwrap();
    let join = dag.add(JoinOperator::chain_streams()).unwrap();
    dag.set_upstream(&join, &[a, b]).unwrap();

    let stream = dag.call_stream(&join, None).await.unwrap();
    assert_eq!(
        collect_stream(stream).await.unwrap(),
        json!(["a1", "a2", "b1"])
    );
}

#[tokio::test]
async fn after_dag_end_waits_for_the_stream_to_drain() {
    let hooks = Arc::new(Mutex::new(Vec::new()));
    let mut dag = Dag::new("stream-hooks");
    let input = dag
        .add(
            CountingOperator::new("in", InputOperator::new(InputSource::value(2)))
                .with_hook_log(hooks.clone()),
        )
        .unwrap();
    let streamify = dag.add(StreamifyOperator::new(range)).unwrap();
    dag.connect(&input, &streamify).unwrap();

    let mut stream = dag.call_stream(&streamify, None).await.unwrap();
    assert_eq!(hooks.lock().unwrap().clone(), vec!["before:in".to_string()]);

    assert_eq!(stream.next().await.unwrap().unwrap(), json!(0));
    assert_eq!(stream.next().await.unwrap().unwrap(), json!(1));
    assert!(!hooks.lock().unwrap().iter().any(|e| e.starts_with("after:")));

    assert!(stream.next().await.is_none());
    assert_eq!(
        hooks.lock().unwrap().clone(),
        vec!["before:in".to_string(), "after:in".to_string()]
    );
}

#[tokio::test]
async fn stream_errors_reach_the_consumer() {
    let mut dag = Dag::new("stream-error");
    let input = dag.add(InputOperator::new(InputSource::value(1))).unwrap();
    let streamify = dag
        .add(StreamifyOperator::new(|_| {
            futures::stream::iter(vec![
                Ok(json!(1)),
                Err(AwelError::Other(anyhow::anyhow!("upstream hiccup"))),
            ])
            .boxed()
        }))
        .unwrap();
    dag.connect(&input, &streamify).unwrap();

    let stream = dag.call_stream(&streamify, None).await.unwrap();
    let err = collect_stream(stream).await.unwrap_err();
    assert!(err.to_string().contains("upstream hiccup"));
}
