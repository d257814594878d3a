use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use awel::dag::DagContext;
use awel::errors::{AwelError, Result};
use awel::operator::Operator;
use awel::{OperatorKind, TaskContext, TaskOutput};
use futures::future::BoxFuture;

/// Shared, ordered record of lifecycle hook calls (`"before:<label>"`,
/// `"after:<label>"`).
pub type HookLog = Arc<Mutex<Vec<String>>>;

/// Wraps another operator and counts how often it executes.
///
/// Lifecycle hooks are recorded into an optional [`HookLog`].
pub struct CountingOperator {
    label: String,
    inner: Arc<dyn Operator>,
    executions: Arc<AtomicUsize>,
    hooks: Option<HookLog>,
}

impl CountingOperator {
    pub fn new(label: &str, inner: impl Operator + 'static) -> Self {
        Self {
            label: label.to_string(),
            inner: Arc::new(inner),
            executions: Arc::new(AtomicUsize::new(0)),
            hooks: None,
        }
    }

    pub fn with_hook_log(mut self, hooks: HookLog) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Handle that stays valid after the operator moves into a DAG.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.executions)
    }

    fn record(&self, event: &str) {
        if let Some(hooks) = &self.hooks {
            hooks.lock().unwrap().push(format!("{event}:{}", self.label));
        }
    }
}

impl Operator for CountingOperator {
    fn kind(&self) -> OperatorKind {
        self.inner.kind()
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(task, ctx)
    }

    fn before_dag_run(&self) -> BoxFuture<'_, Result<()>> {
        self.record("before");
        Box::pin(async { Ok(()) })
    }

    fn after_dag_end(&self) -> BoxFuture<'_, Result<()>> {
        self.record("after");
        Box::pin(async { Ok(()) })
    }
}

/// A user-defined operator that always fails with the given message.
pub struct FailingOperator {
    message: String,
}

impl FailingOperator {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Operator for FailingOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Custom
    }

    fn execute<'a>(
        &'a self,
        _task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move { Err(AwelError::from(anyhow!(self.message.clone()))) })
    }
}
