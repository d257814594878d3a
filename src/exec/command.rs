// src/exec/command.rs

//! Shell commands as operator functions.
//!
//! Protocol: the input value is written to the command's stdin as JSON and
//! stdin is closed. Stdout is parsed as JSON; output that is not JSON becomes
//! a trimmed string and empty output becomes `null`. A non-zero exit is an
//! error carrying stderr. Predicates only look at the exit status.

use std::process::Stdio;

use anyhow::{Context, anyhow};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::errors::AwelError;
use crate::task::{
    Callable, JoinFunc, MapFunc, PredicateFunc, ReduceFunc, StreamifyFunc, TransformStreamFunc,
    UnstreamifyFunc, ValueStream, collect_stream, unstreamify_fn,
};

/// A shell command line run through `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    cmd: String,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.cmd
    }

    fn command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self) -> anyhow::Result<Child> {
        self.command()
            .spawn()
            .with_context(|| format!("spawning command `{}`", self.cmd))
    }

    /// Run once with `input` on stdin and parse stdout.
    pub async fn run_json(&self, input: &Value) -> anyhow::Result<Value> {
        let payload = serde_json::to_vec(input)?;
        let mut child = self.spawn()?;
        let write = feed_stdin(child.stdin.take(), payload);
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written.with_context(|| format!("writing stdin of `{}`", self.cmd))?;
        let output = output.with_context(|| format!("waiting for `{}`", self.cmd))?;

        if !output.status.success() {
            return Err(anyhow!(
                "command `{}` exited with {}: {}",
                self.cmd,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(cmd = %self.cmd, bytes = output.stdout.len(), "command finished");
        Ok(parse_output(&stdout))
    }

    /// Run once with `input` on stdin; true on a zero exit status.
    pub async fn check(&self, input: &Value) -> anyhow::Result<bool> {
        let payload = serde_json::to_vec(input)?;
        let mut child = self.spawn()?;
        let write = feed_stdin(child.stdin.take(), payload);
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written.with_context(|| format!("writing stdin of `{}`", self.cmd))?;
        let output = output.with_context(|| format!("waiting for `{}`", self.cmd))?;
        Ok(output.status.success())
    }

    /// Run once with `input` on stdin and yield one value per stdout line.
    ///
    /// Stdin is fed while stdout is read and stderr lines are logged at
    /// debug level. The child is killed if the stream is dropped before the
    /// end.
    pub fn stream_lines(&self, input: Value) -> ValueStream {
        stream::unfold(LineState::Pending(self.clone(), input), |state| async move {
            match state {
                LineState::Pending(cmd, input) => match cmd.spawn_lines(&input) {
                    Ok(reader) => next_line(reader).await,
                    Err(err) => Some((Err(AwelError::from(err)), LineState::Done)),
                },
                LineState::Reading(reader) => next_line(reader).await,
                LineState::Done => None,
            }
        })
        .boxed()
    }

    fn spawn_lines(&self, input: &Value) -> anyhow::Result<LineReader> {
        let payload = serde_json::to_vec(input)?;
        let mut child = self.spawn()?;
        let feed = Some(feed_stdin(child.stdin.take(), payload).boxed());
        let stderr = child.stderr.take().map(|e| BufReader::new(e).lines());
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout of `{}` was not captured", self.cmd))?;
        Ok(LineReader {
            cmd: self.clone(),
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr,
            feed,
        })
    }

    pub fn map_func(&self) -> MapFunc {
        let cmd = self.clone();
        Callable::from_async(move |v: Value| {
            let cmd = cmd.clone();
            async move { cmd.run_json(&v).await }
        })
    }

    pub fn predicate_func(&self) -> PredicateFunc {
        let cmd = self.clone();
        Callable::from_async(move |v: Value| {
            let cmd = cmd.clone();
            async move { cmd.check(&v).await }
        })
    }

    /// Receives `[accumulator, item]`.
    pub fn reduce_func(&self) -> ReduceFunc {
        let cmd = self.clone();
        Callable::from_async(move |(acc, item): (Value, Value)| {
            let cmd = cmd.clone();
            async move { cmd.run_json(&Value::Array(vec![acc, item])).await }
        })
    }

    /// Receives the array of parent values.
    pub fn join_func(&self) -> JoinFunc {
        let cmd = self.clone();
        Callable::from_async(move |values: Vec<Value>| {
            let cmd = cmd.clone();
            async move { cmd.run_json(&Value::Array(values)).await }
        })
    }

    pub fn streamify_func(&self) -> StreamifyFunc {
        let cmd = self.clone();
        std::sync::Arc::new(move |v: Value| cmd.stream_lines(v))
    }

    /// Receives the collected stream as an array.
    pub fn unstreamify_func(&self) -> UnstreamifyFunc {
        let cmd = self.clone();
        unstreamify_fn(move |input: ValueStream| {
            let cmd = cmd.clone();
            async move {
                let collected = collect_stream(input).await?;
                cmd.run_json(&collected).await
            }
        })
    }

    /// Runs once per element.
    pub fn transform_func(&self) -> TransformStreamFunc {
        let cmd = self.clone();
        std::sync::Arc::new(move |input: ValueStream| {
            let cmd = cmd.clone();
            input
                .and_then(move |item| {
                    let cmd = cmd.clone();
                    async move { cmd.run_json(&item).await.map_err(AwelError::from) }
                })
                .boxed()
        })
    }
}

enum LineState {
    Pending(ShellCommand, Value),
    Reading(LineReader),
    Done,
}

/// A running child of [`ShellCommand::stream_lines`]. `feed` is the
/// unfinished stdin write; `stderr` is `None` once it reached EOF.
struct LineReader {
    cmd: ShellCommand,
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    feed: Option<BoxFuture<'static, std::io::Result<()>>>,
}

impl LineReader {
    async fn finish(mut self) -> Option<(crate::errors::Result<Value>, LineState)> {
        self.feed = None;
        if let Some(mut stderr) = self.stderr.take() {
            while let Ok(Some(line)) = stderr.next_line().await {
                debug!(cmd = %self.cmd.cmd, "stderr: {}", line);
            }
        }
        match self.child.wait().await {
            Ok(status) if status.success() => None,
            Ok(status) => Some((
                Err(AwelError::Other(anyhow!(
                    "command `{}` exited with {}",
                    self.cmd.cmd,
                    status.code().unwrap_or(-1)
                ))),
                LineState::Done,
            )),
            Err(err) => Some((Err(AwelError::from(err)), LineState::Done)),
        }
    }
}

async fn next_line(mut reader: LineReader) -> Option<(crate::errors::Result<Value>, LineState)> {
    loop {
        tokio::select! {
            written = write_pending(&mut reader.feed) => {
                reader.feed = None;
                if let Err(err) = written {
                    let err = anyhow::Error::from(err)
                        .context(format!("writing stdin of `{}`", reader.cmd.cmd));
                    return Some((Err(AwelError::from(err)), LineState::Done));
                }
            }
            line = next_stderr(&mut reader.stderr) => match line {
                Some(line) => debug!(cmd = %reader.cmd.cmd, "stderr: {}", line),
                None => reader.stderr = None,
            },
            line = reader.stdout.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let value = parse_output(&line);
                    return Some((Ok(value), LineState::Reading(reader)));
                }
                Ok(None) => return reader.finish().await,
                Err(err) => return Some((Err(AwelError::from(err)), LineState::Done)),
            },
        }
    }
}

async fn write_pending(
    feed: &mut Option<BoxFuture<'static, std::io::Result<()>>>,
) -> std::io::Result<()> {
    match feed {
        Some(write) => write.await,
        None => std::future::pending().await,
    }
}

async fn next_stderr(stderr: &mut Option<Lines<BufReader<ChildStderr>>>) -> Option<String> {
    match stderr {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// Write `payload` and close stdin. Must be polled concurrently with the
/// reads of the child's output.
async fn feed_stdin(stdin: Option<ChildStdin>, payload: Vec<u8>) -> std::io::Result<()> {
    if let Some(mut stdin) = stdin {
        write_ignoring_broken_pipe(&mut stdin, &payload).await?;
    }
    Ok(())
}

async fn write_ignoring_broken_pipe(
    stdin: &mut ChildStdin,
    payload: &[u8],
) -> std::io::Result<()> {
    match stdin.write_all(payload).await {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Interpret command output: JSON if it parses, otherwise the trimmed text.
pub fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
