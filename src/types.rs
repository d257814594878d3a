// src/types.rs

//! Small shared types: identifiers, task states and operator kinds.

use std::fmt;

use serde::Serialize;

/// Canonical node identifier type used throughout the engine.
pub type NodeId = String;

/// Identifier of a DAG instance (distinct from its human-readable name).
pub type DagId = String;

/// Metadata key under which the run's call data is attached to a task.
pub const CALL_DATA_KEY: &str = "call_data";

/// Metadata key a branch node uses to publish the names of targets to skip.
pub const SKIP_NODE_NAMES_KEY: &str = "skip_node_names";

/// Metadata key a branch node uses to publish the ids of targets to skip.
pub const SKIP_NODE_IDS_KEY: &str = "skip_node_ids";

/// Per-node, per-run execution state.
///
/// `Init` is the only initial state; `Success`, `Failed` and `Skip` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Init,
    Running,
    Success,
    Failed,
    Skip,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed | TaskState::Skip)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Init, TaskState::Running) => true,
            (TaskState::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Init => "init",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// The capability an operator implements.
///
/// The scheduler only looks at this tag for two decisions: `Branch` nodes
/// publish skip targets, and `Join` nodes stop skip propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Input,
    Trigger,
    Map,
    Join,
    Reduce,
    Branch,
    Streamify,
    Unstreamify,
    TransformStream,
    /// Operators implemented outside this crate. Scheduled like `Map`.
    Custom,
}

impl OperatorKind {
    /// Kinds that count as DAG entry points in [`crate::dag::Dag::trigger_nodes`].
    pub fn is_trigger(self) -> bool {
        matches!(self, OperatorKind::Input | OperatorKind::Trigger)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatorKind::Input => "input",
            OperatorKind::Trigger => "trigger",
            OperatorKind::Map => "map",
            OperatorKind::Join => "join",
            OperatorKind::Reduce => "reduce",
            OperatorKind::Branch => "branch",
            OperatorKind::Streamify => "streamify",
            OperatorKind::Unstreamify => "unstreamify",
            OperatorKind::TransformStream => "transform_stream",
            OperatorKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_allows_only_forward_transitions() {
        assert!(TaskState::Init.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Success));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
        assert!(TaskState::Running.can_transition_to(TaskState::Skip));

        assert!(!TaskState::Init.can_transition_to(TaskState::Success));
        assert!(!TaskState::Success.can_transition_to(TaskState::Running));
        assert!(!TaskState::Skip.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Running.can_transition_to(TaskState::Init));
    }

    #[test]
    fn kinds_display_and_serialize_in_snake_case() {
        assert!(!OperatorKind::Custom.is_trigger());
        assert_eq!(OperatorKind::Custom.to_string(), "custom");
        assert_eq!(
            serde_json::to_value(OperatorKind::TransformStream).unwrap(),
            serde_json::json!("transform_stream")
        );
    }
}
