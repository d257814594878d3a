// src/config/mod.rs

//! Workflow files: a TOML description of a DAG whose functions are shell
//! commands.
//!
//! - [`model`] is the serde data model.
//! - [`loader`] reads a file from disk.
//! - [`validate`] checks references, shapes and acyclicity.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_and_validate};
pub use model::{BranchConfig, EngineSection, NodeConfig, NodeKind, RawWorkflowFile, WorkflowFile};
