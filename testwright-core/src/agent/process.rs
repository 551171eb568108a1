//! Agent executors backed by coding-agent CLIs (Claude Code, Codex)

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::executor::AgentExecutor;
use super::output::{process_line, Transcript};
use super::prompts::system_prompt;
use super::response::{AgentResponse, ResponseSchema};
use super::types::AgentRole;
use crate::{Error, Result};

/// Which CLI to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliKind {
    Claude,
    Codex,
}

impl CliKind {
    pub fn name(&self) -> &'static str {
        match self {
            CliKind::Claude => "claude",
            CliKind::Codex => "codex",
        }
    }
}

/// Runs one role as a CLI subprocess in the workspace
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    name: String,
    kind: CliKind,
    role: AgentRole,
    program: String,
    model: Option<String>,
    workdir: PathBuf,
    schema: Option<ResponseSchema>,
    timeout: Duration,
}

impl ProcessExecutor {
    /// Create an executor for `role` using the CLI's default program name
    pub fn new(kind: CliKind, role: AgentRole, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: format!("{}({})", role, kind.name()),
            kind,
            role,
            program: kind.name().to_string(),
            model: None,
            workdir: workdir.into(),
            schema: role.schema(),
            timeout: Duration::from_secs(15 * 60),
        }
    }

    /// Use a custom executable path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.program = path.into();
        self
    }

    /// Use a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full prompt sent to the CLI
    fn compose_prompt(&self, prompt: &str) -> String {
        let mut full = String::new();
        if self.kind == CliKind::Codex {
            // codex exec has no separate system prompt flag
            full.push_str(system_prompt(self.role));
            full.push_str("\n\n");
        }
        full.push_str(prompt);
        if let Some(schema) = &self.schema {
            full.push_str("\n\n");
            full.push_str(&schema.instructions());
        }
        full
    }

    /// Build the command for one invocation
    pub fn build_command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);

        match self.kind {
            CliKind::Claude => {
                cmd.arg("--print")
                    .arg("--verbose")
                    .arg("--output-format")
                    .arg("stream-json")
                    .arg("--dangerously-skip-permissions")
                    .arg("--append-system-prompt")
                    .arg(system_prompt(self.role));
                if !self.role.can_write() {
                    cmd.arg("--disallowedTools")
                        .arg("Write Edit MultiEdit NotebookEdit");
                }
                if let Some(ref model) = self.model {
                    cmd.arg("--model").arg(model);
                }
            }
            CliKind::Codex => {
                cmd.arg("exec").arg("--skip-git-repo-check");
                if self.role.can_write() {
                    cmd.arg("--full-auto");
                } else {
                    cmd.arg("--sandbox").arg("read-only");
                }
                if let Some(ref model) = self.model {
                    cmd.arg("--model").arg(model);
                }
                cmd.arg("--cd").arg(&self.workdir);
            }
        }

        cmd.arg(self.compose_prompt(prompt));
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }

    async fn execute(
        &self,
        prompt: &str,
    ) -> Result<(std::process::ExitStatus, Transcript, String)> {
        let mut child = self.build_command(prompt).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Agent(format!(
                    "{} executable not found at '{}'. Is it installed?",
                    self.kind.name(),
                    self.program
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Agent("Agent stdout was not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut transcript = Transcript::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            process_line(&line, &mut transcript);
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        Ok((status, transcript, stderr))
    }
}

#[async_trait]
impl AgentExecutor for ProcessExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, prompt: &str) -> Result<AgentResponse> {
        ensure_dir(&self.workdir)?;
        info!(agent = %self.name, "Running agent");

        let (status, transcript, stderr) =
            match tokio::time::timeout(self.timeout, self.execute(prompt)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Error::Agent(format!(
                        "{} timed out after {}s",
                        self.name,
                        self.timeout.as_secs()
                    )))
                }
            };

        let text = transcript.text();
        if !status.success() || transcript.is_error() {
            if text.trim().is_empty() {
                return Err(Error::Agent(format!(
                    "{} exited with {}: {}",
                    self.name,
                    status,
                    stderr.trim()
                )));
            }
            warn!(agent = %self.name, %status, "Agent exited with an error but produced output");
        }

        let value = self.schema.as_ref().and_then(|schema| schema.extract(&text));
        if self.schema.is_some() && value.is_none() {
            warn!(agent = %self.name, "No structured payload found in agent output");
        }
        debug!(
            agent = %self.name,
            chars = text.len(),
            tool_uses = transcript.tool_uses(),
            "Agent finished"
        );

        Ok(AgentResponse { text, value })
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(Error::Agent(format!(
            "Working directory does not exist: {}",
            dir.display()
        )))
    }
}
