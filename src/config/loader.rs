// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Read and deserialize a workflow file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawWorkflowFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Read, deserialize and validate a workflow file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    WorkflowFile::try_from(raw)
}

/// Validate a workflow given as TOML text.
pub fn parse_and_validate(contents: &str) -> Result<WorkflowFile> {
    let raw: RawWorkflowFile = toml::from_str(contents)?;
    WorkflowFile::try_from(raw)
}

/// `Awel.toml` in the current working directory.
pub fn default_workflow_path() -> PathBuf {
    PathBuf::from("Awel.toml")
}
