#![allow(dead_code)]

use awel::operator::MapOperator;
use serde_json::{Value, json};

pub use awel_test_utils::{init_tracing, with_timeout};

pub fn int(v: &Value) -> i64 {
    v.as_i64().unwrap_or_default()
}

pub fn square() -> MapOperator {
    MapOperator::new(|v| Ok(json!(int(&v) * int(&v))))
}

pub fn add(n: i64) -> MapOperator {
    MapOperator::new(move |v| Ok(json!(int(&v) + n)))
}

pub fn identity() -> MapOperator {
    MapOperator::new(Ok)
}

pub fn map_to(value: Value) -> MapOperator {
    MapOperator::new(move |_| Ok(value.clone()))
}
