use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use flowpilot_core::api::{
    CancellationToken, Outcome, OutcomeStatus, Task, TaskBackend, TaskError, TaskErrorKind,
};

/// Runs a task's description as a shell script (`sh -c` unless a program is
/// configured). The child is killed when the task token fires.
pub struct ShellBackend {
    name: String,
    program: Vec<String>,
    workdir: Option<PathBuf>,
    capture_bytes: usize,
}

impl ShellBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: vec!["sh".to_string(), "-c".to_string()],
            workdir: None,
            capture_bytes: 64 * 1024,
        }
    }

    /// `command` is split on whitespace; the script is passed as the last argument.
    pub fn with_command(mut self, command: &str) -> Self {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if !parts.is_empty() {
            self.program = parts;
        }
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_capture_bytes(mut self, capture_bytes: usize) -> Self {
        self.capture_bytes = capture_bytes.max(1);
        self
    }

    fn command(&self, task: &Task) -> Command {
        let script = if task.description.trim().is_empty() {
            task.title.as_str()
        } else {
            task.description.as_str()
        };

        let mut cmd = Command::new(&self.program[0]);
        cmd.args(&self.program[1..])
            .arg(script)
            .env("FLOWPILOT_FLOW_ID", &task.flow_id)
            .env("FLOWPILOT_TASK_ID", &task.id)
            .env("FLOWPILOT_TASK_TYPE", &task.task_type)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl TaskBackend for ShellBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        let mut child = self
            .command(task)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.program[0]))?;
        tracing::debug!(
            target: "flowpilot.backend.shell",
            task_id = %task.id,
            pid = child.id().unwrap_or_default(),
            "shell task started"
        );

        let stdout = child.stdout.take().map(|r| read_tail(r, self.capture_bytes));
        let stderr = child.stderr.take().map(|r| read_tail(r, self.capture_bytes));

        let status = tokio::select! {
            status = child.wait() => Some(status.context("failed waiting for shell task")?),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            if let Err(e) = child.kill().await {
                tracing::warn!(
                    target: "flowpilot.backend.shell",
                    task_id = %task.id,
                    error.kind = "kill",
                    error.message = %e
                );
            }
            return Ok(Outcome::cancelled("shell task killed"));
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let mut result = json!({
            "exit_code": status.code(),
            "stdout": stdout.text(),
            "stderr": stderr.text(),
            "truncated": stdout.truncated || stderr.truncated,
        });
        if let Some(follow_ups) = follow_ups_from_stdout(&stdout.text()) {
            result["follow_ups"] = follow_ups;
        }

        if status.success() {
            return Ok(Outcome::completed(Some(result)));
        }

        let message = match status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let mut error = TaskError::new(TaskErrorKind::Executor, message);
        let last_line = stderr.text().lines().last().unwrap_or_default().trim().to_string();
        if !last_line.is_empty() {
            error = error.with_cause(last_line);
        }
        Ok(Outcome::from_error(OutcomeStatus::Failed, error).with_result(result))
    }
}

/// A script may print a JSON object with a `follow_ups` array as its output.
fn follow_ups_from_stdout(stdout: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    value.get("follow_ups").filter(|f| f.is_array()).cloned()
}

/// The last `cap` bytes of a stream.
#[derive(Debug, Default)]
struct Tail {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Tail {
    fn push(&mut self, data: &[u8], cap: usize) {
        self.bytes.extend_from_slice(data);
        if self.bytes.len() > cap {
            let overflow = self.bytes.len() - cap;
            self.bytes.drain(..overflow);
            self.truncated = true;
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

fn read_tail<R>(mut rd: R, cap: usize) -> JoinHandle<Tail>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = Tail::default();
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            match rd.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => tail.push(&buf[..n], cap),
            }
        }
        tail
    })
}

async fn collect(reader: Option<JoinHandle<Tail>>) -> Tail {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Tail::default(),
    }
}
