//! LLM-backed agents
//!
//! Each pipeline role runs behind [`AgentExecutor`]. Concrete executors:
//! - [`ChatExecutor`]: chat completions API with the tool belt as function tools
//! - [`ProcessExecutor`]: Claude Code or Codex CLI subprocess

mod chat;
mod executor;
pub mod output;
mod process;
pub mod prompts;
mod response;
mod types;

pub use chat::{ChatEndpoint, ChatExecutor};
pub use executor::{AgentExecutor, AgentSet};
pub use process::{CliKind, ProcessExecutor};
pub use prompts::{system_prompt, PromptBuilder, PromptContext, Task};
pub use response::{AgentResponse, ResponseSchema, ReviewerOutput, VerifierOutput};
pub use types::AgentRole;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{BackendKind, Config};
use crate::secrets::Secrets;
use crate::tools::ToolBelt;
use crate::Result;

/// Builds executors for each role from configuration
pub struct AgentFactory<'a> {
    config: &'a Config,
    api_key: Option<String>,
}

impl<'a> AgentFactory<'a> {
    pub fn new(config: &'a Config, secrets: &Secrets) -> Self {
        Self {
            config,
            api_key: secrets.llm_api_key(),
        }
    }

    /// Backend configured for a role
    pub fn backend_for(&self, role: AgentRole) -> BackendKind {
        match role {
            AgentRole::Implementer => self.config.agent.implementer_backend,
            _ => self.config.agent.backend,
        }
    }

    /// Build the executor for one role working in `workdir`
    pub fn build(&self, role: AgentRole, workdir: &Path) -> Result<Arc<dyn AgentExecutor>> {
        let agent = &self.config.agent;
        let backend = self.backend_for(role);

        let executor: Arc<dyn AgentExecutor> = match backend {
            BackendKind::Chat => {
                let endpoint = ChatEndpoint::from_config(
                    &self.config.chat,
                    agent.model.as_deref(),
                    self.api_key.clone(),
                )?;
                let mut tools = ToolBelt::new(workdir)
                    .with_test_timeout(self.config.workspace.test_timeout);
                if let Some(path) = &self.config.workspace.standards_path {
                    tools = tools.with_standards_path(path);
                }
                Arc::new(
                    ChatExecutor::new(role, endpoint, tools, agent.timeout)?
                        .with_max_tool_rounds(agent.max_tool_rounds),
                )
            }
            BackendKind::Claude | BackendKind::Codex => {
                let (kind, path) = if backend == BackendKind::Claude {
                    (CliKind::Claude, &agent.claude_path)
                } else {
                    (CliKind::Codex, &agent.codex_path)
                };
                let mut exec = ProcessExecutor::new(kind, role, workdir)
                    .with_path(path.as_str())
                    .with_timeout(agent.timeout);
                if let Some(model) = &agent.model {
                    exec = exec.with_model(model.as_str());
                }
                Arc::new(exec)
            }
        };

        info!(role = %role, backend = %backend, "Agent configured");
        Ok(executor)
    }

    /// Build executors for all four roles
    pub fn build_set(&self, workdir: &Path) -> Result<AgentSet> {
        Ok(AgentSet {
            verifier: self.build(AgentRole::Verifier, workdir)?,
            planner: self.build(AgentRole::Planner, workdir)?,
            implementer: self.build(AgentRole::Implementer, workdir)?,
            reviewer: self.build(AgentRole::Reviewer, workdir)?,
        })
    }
}
