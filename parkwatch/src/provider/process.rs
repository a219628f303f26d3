//! Child process execution for external providers.
//!
//! Runs a program to completion with piped stdout/stderr collected line by
//! line, an optional timeout, and extra environment variables.

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Configuration for one provider invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// The program to execute.
    pub program: String,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Environment variables to set (merged with current env).
    pub env: HashMap<String, String>,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl ProcessOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Run `script` through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Outcome of a finished process.
#[derive(Debug)]
pub struct ProcessResult {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Whether the process was killed due to timeout.
    pub timed_out: bool,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stderr_string(&self) -> String {
        self.stderr.join("\n")
    }
}

/// Run a process to completion and collect its output.
///
/// The timeout covers both the exit and the draining of its pipes. On
/// timeout the process is killed and whatever it printed is discarded.
pub async fn run_process(options: ProcessOptions) -> Result<ProcessResult> {
    let mut cmd = Command::new(&options.program);
    cmd.args(&options.args)
        .envs(&options.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn process: {}", options.program))?;

    let mut stdout = child.stdout.take().map(|out| tokio::spawn(collect_lines(out)));
    let mut stderr = child.stderr.take().map(|err| tokio::spawn(collect_lines(err)));

    // The deadline covers output collection too: a grandchild holding the
    // pipes open must not outlive it.
    let collect_future = async {
        let status = child.wait().await;
        let stdout_lines = join_lines(stdout.as_mut()).await;
        let stderr_lines = join_lines(stderr.as_mut()).await;
        (status, stdout_lines, stderr_lines)
    };

    let collected = match options.timeout {
        Some(limit) => timeout(limit, collect_future).await.ok(),
        None => Some(collect_future.await),
    };

    let Some((status, stdout_lines, stderr_lines)) = collected else {
        for reader in [stdout, stderr].into_iter().flatten() {
            reader.abort();
        }
        let _ = child.kill().await;
        let status = child
            .wait()
            .await
            .context("Failed to wait for process to exit")?;

        return Ok(ProcessResult {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            timed_out: true,
        });
    };

    Ok(ProcessResult {
        status: status.context("Failed to wait for process to exit")?,
        stdout: stdout_lines,
        stderr: stderr_lines,
        timed_out: false,
    })
}

async fn collect_lines<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push(line);
    }
    collected
}

async fn join_lines(handle: Option<&mut JoinHandle<Vec<String>>>) -> Vec<String> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}
