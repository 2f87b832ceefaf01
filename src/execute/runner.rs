//! Child process runner for toolchain commands
//!
//! Commands run with a null stdin and captured output, under a timeout
//! clamped to the task's remaining [`Budget`]. The child is killed when the
//! timeout fires or the future is dropped. Capability checks go through
//! [`probe`].

use super::budget::Budget;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// What a command invocation looks like before it runs
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, cwd: impl AsRef<Path>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.as_ref().to_path_buf(),
            timeout: Duration::from_secs(600),
            env: Vec::new(),
        }
    }

    pub fn args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.args = args.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env_overrides(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
            .trim()
            .to_string()
    }
}

/// What happened when a command ran
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub name: String,
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Set when the process could not be started at all
    pub launch_error: Option<String>,
}

impl CommandOutcome {
    /// The process started and exited on its own, whatever its exit code.
    pub fn completed(&self) -> bool {
        self.launch_error.is_none() && !self.timed_out
    }

    /// Launch failures and timeouts; a non-zero exit is not a failure here.
    pub fn execution_failure(&self) -> Option<String> {
        if let Some(err) = &self.launch_error {
            return Some(format!("{}: {}", self.command, err));
        }
        if self.timed_out {
            return Some(format!(
                "{} timed out after {}ms",
                self.command, self.duration_ms
            ));
        }
        None
    }

    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Run `spec`, bounded by its own timeout and by `budget`.
///
/// The child is killed if the timeout fires or if the returned future is
/// dropped (for example when an outer task timeout preempts it).
pub async fn run_command(spec: &CommandSpec, budget: &Budget) -> CommandOutcome {
    let command_label = spec.label();
    let limit = budget.clamp(spec.timeout);
    let mut outcome = CommandOutcome {
        name: spec.name.clone(),
        command: command_label,
        ..Default::default()
    };

    if limit.is_zero() {
        outcome.timed_out = true;
        tracing::warn!(command = %outcome.command, "Skipping command, time budget exhausted");
        return outcome;
    }

    let mut command = Command::new(&spec.program);
    command
        .current_dir(&spec.cwd)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    tracing::debug!(command = %outcome.command, cwd = %spec.cwd.display(), timeout_ms = limit.as_millis() as u64, "Running command");
    let start = Instant::now();

    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            outcome.launch_error = Some(format!("Failed to start command: {}", err));
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            return outcome;
        }
    };

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            outcome.success = output.status.success();
            outcome.exit_code = output.status.code();
            outcome.stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            outcome.stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        Ok(Err(err)) => {
            outcome.launch_error = Some(format!("Failed to wait for command: {}", err));
        }
        Err(_) => {
            // Dropping the wait future kills the child
            outcome.timed_out = true;
        }
    }
    outcome.duration_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(
        command = %outcome.command,
        exit_code = ?outcome.exit_code,
        timed_out = outcome.timed_out,
        duration_ms = outcome.duration_ms,
        "Command finished"
    );
    outcome
}

/// Lightweight capability probe: does `program args` run and exit zero?
pub async fn probe(cwd: &Path, program: &str, args: &[&str], timeout: Duration, budget: &Budget) -> bool {
    let spec = CommandSpec::new(format!("probe {}", program), cwd, program)
        .args(args)
        .timeout(timeout);
    run_command(&spec, budget).await.success
}
