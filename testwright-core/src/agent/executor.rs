//! The uniform run(prompt) contract every agent backend implements

use std::sync::Arc;

use async_trait::async_trait;

use super::response::AgentResponse;
use super::types::AgentRole;
use crate::Result;

/// An LLM-backed role behind a single call
///
/// Implementations may use tools internally before answering. An `Err`
/// means the call itself failed (process crash, HTTP error, timeout);
/// a response whose structured payload could not be decoded is still `Ok`.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Name used in logs, e.g. `verifier(chat)`
    fn name(&self) -> &str;

    /// Run the agent on one prompt
    async fn run(&self, prompt: &str) -> Result<AgentResponse>;
}

/// One executor per role, shared by the graph's agent nodes
#[derive(Clone)]
pub struct AgentSet {
    pub verifier: Arc<dyn AgentExecutor>,
    pub planner: Arc<dyn AgentExecutor>,
    pub implementer: Arc<dyn AgentExecutor>,
    pub reviewer: Arc<dyn AgentExecutor>,
}

impl AgentSet {
    /// Executor for a role
    pub fn get(&self, role: AgentRole) -> Arc<dyn AgentExecutor> {
        match role {
            AgentRole::Verifier => Arc::clone(&self.verifier),
            AgentRole::Planner => Arc::clone(&self.planner),
            AgentRole::Implementer => Arc::clone(&self.implementer),
            AgentRole::Reviewer => Arc::clone(&self.reviewer),
        }
    }
}

impl std::fmt::Debug for AgentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSet")
            .field("verifier", &self.verifier.name())
            .field("planner", &self.planner.name())
            .field("implementer", &self.implementer.name())
            .field("reviewer", &self.reviewer.name())
            .finish()
    }
}
