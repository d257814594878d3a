// src/exec/mod.rs

//! Execution helpers used by operators.
//!
//! - [`blocking`] runs synchronous user closures off the async scheduler.
//! - [`command`] turns shell commands into operator functions that speak
//!   JSON over stdin/stdout.

pub mod blocking;
pub mod command;

pub use blocking::{BlockingExecutor, DEFAULT_BLOCKING_THREADS};
pub use command::ShellCommand;
