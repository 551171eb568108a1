//! Agent-backed nodes and the prompt/completion function nodes

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::graph::{Node, NodeContext, NodeKind};
use super::message::Message;
use super::results::{StepName, StepRecord, StepStatus};
use super::state::{SharedState, REVIEWER_FEEDBACK, VERIFIER_FEEDBACK};
use super::truncate;
use crate::agent::{AgentExecutor, AgentRole, PromptBuilder, Task};
use crate::Result;

/// How an agent node turns its input into a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The input text is the prompt
    Passthrough,
    /// The input is a plan to implement
    Implement,
    /// The input is the implementer's report to review
    Review,
}

/// Runs one agent on its input and forwards the response
pub struct AgentNode {
    id: String,
    role: AgentRole,
    executor: Arc<dyn AgentExecutor>,
    framing: Framing,
    step: StepName,
    record: bool,
}

impl AgentNode {
    pub fn new(id: impl Into<String>, role: AgentRole, executor: Arc<dyn AgentExecutor>) -> Self {
        let step = match role {
            AgentRole::Verifier => StepName::Verify,
            AgentRole::Planner => StepName::Plan,
            AgentRole::Implementer => StepName::Implement,
            AgentRole::Reviewer => StepName::Review,
        };
        Self {
            id: id.into(),
            role,
            executor,
            framing: Framing::Passthrough,
            step,
            record: false,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Append a results entry when the agent answers
    ///
    /// Nodes whose answer is recorded by a router leave this off.
    pub fn recorded(mut self) -> Self {
        self.record = true;
        self
    }

    fn prompt(&self, input: &Message, state: &SharedState) -> String {
        let repo = state.repo_path().display().to_string();
        match self.framing {
            Framing::Passthrough => input.text(),
            Framing::Implement => PromptBuilder::new(Task::Implement)
                .repo(repo)
                .var("PLAN", input.text())
                .build(),
            Framing::Review => PromptBuilder::new(Task::Review)
                .repo(repo)
                .var("REPORT", input.text())
                .build(),
        }
    }
}

#[async_trait]
impl Node for AgentNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        let prompt = self.prompt(&input, ctx.state);
        info!(role = %self.role, executor = self.executor.name(), "Invoking agent");

        let response = match self.executor.run(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                error!(role = %self.role, error = %e, "Agent failed");
                ctx.state.record(StepRecord::failed(self.step, e.to_string()));
                return Err(e);
            }
        };

        if self.record {
            let limit = ctx.state.settings().description_limit;
            let mut record = StepRecord::new(self.step, StepStatus::Completed)
                .with_feedback(truncate(response.text.trim(), limit));
            if self.step == StepName::Plan {
                record = record.with_revision(ctx.state.revision_count());
            }
            ctx.state.record(record);
        }

        ctx.send_message(Message::Response(response));
        Ok(())
    }
}

/// Which planner prompt to prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// First plan, from the verifier's analysis
    Initial,
    /// Re-plan with the reviewer's feedback
    Revision,
}

/// Builds the planner prompt from shared state
#[derive(Debug, Clone)]
pub struct PreparePrompt {
    id: String,
    kind: PromptKind,
}

impl PreparePrompt {
    pub fn new(id: impl Into<String>, kind: PromptKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    fn build(&self, state: &SharedState) -> String {
        let repo = state.repo_path().display().to_string();
        let task = match self.kind {
            PromptKind::Initial => Task::Plan,
            PromptKind::Revision => Task::Revise,
        };

        let mut builder = PromptBuilder::new(task).repo(repo);
        if let Some(feedback) = state.get_str(VERIFIER_FEEDBACK) {
            builder = builder.var("VERIFIER_FEEDBACK", feedback);
        }
        if self.kind == PromptKind::Revision {
            if let Some(feedback) = state.get_str(REVIEWER_FEEDBACK) {
                builder = builder.var("REVIEWER_FEEDBACK", feedback);
            }
            builder = builder
                .var("REVISION", state.revision_count().to_string())
                .var("MAX_REVISIONS", state.max_revisions().to_string());
        }
        builder.build()
    }
}

#[async_trait]
impl Node for PreparePrompt {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, _input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        let prompt = self.build(ctx.state);
        ctx.send_message(Message::Prompt(prompt));
        Ok(())
    }
}

/// Terminal node that yields the run's output
#[derive(Debug, Clone)]
pub struct CompleteNode {
    id: String,
    no_changes: bool,
}

impl CompleteNode {
    /// Completion when the existing tests were judged adequate
    pub fn no_changes(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            no_changes: true,
        }
    }

    /// Completion after the pull request step
    pub fn finished(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            no_changes: false,
        }
    }
}

#[async_trait]
impl Node for CompleteNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
        if self.no_changes {
            ctx.state.record(
                StepRecord::new(StepName::Complete, StepStatus::Skipped)
                    .with_note("tests already adequate; no pull request"),
            );
            ctx.yield_output("Tests already correct - no changes needed");
        } else {
            let status = input.text();
            ctx.state.record(
                StepRecord::new(StepName::Complete, StepStatus::Completed)
                    .with_note(status.clone()),
            );
            ctx.yield_output(format!("Workflow completed: {}", status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentResponse;
    use crate::config::WorkflowSettings;
    use crate::test_support::ScriptedAgent;
    use crate::workflow::state::RunArgs;

    fn state() -> SharedState {
        SharedState::new(RunArgs::new("/work/calc", WorkflowSettings::default()))
    }

    #[tokio::test]
    async fn test_implement_framing_wraps_plan() {
        let agent = Arc::new(ScriptedAgent::new("implementer", vec![AgentResponse::text("done")]));
        let node = AgentNode::new("implementer", AgentRole::Implementer, agent.clone())
            .with_framing(Framing::Implement)
            .recorded();

        let mut state = state();
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Response(AgentResponse::text("1. test add")), &mut ctx)
            .await
            .unwrap();
        let (sent, _) = ctx.into_parts();

        let prompts = agent.prompts();
        assert!(prompts[0].starts_with("Do not ask follow-up questions."));
        assert!(prompts[0].contains("/work/calc"));
        assert!(prompts[0].contains("1. test add"));
        assert_eq!(sent, vec![Message::Response(AgentResponse::text("done"))]);
        assert_eq!(state.results().last().unwrap().step, StepName::Implement);
    }

    #[tokio::test]
    async fn test_unrecorded_node_leaves_log_alone() {
        let agent = Arc::new(ScriptedAgent::new("verifier", vec![AgentResponse::text("x")]));
        let node = AgentNode::new("verifier", AgentRole::Verifier, agent);
        let mut state = state();
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Prompt("analyze".into()), &mut ctx).await.unwrap();
        assert!(state.results().is_empty());
    }

    #[tokio::test]
    async fn test_agent_failure_is_recorded_and_raised() {
        let agent = Arc::new(ScriptedAgent::new("planner", vec![]));
        let node = AgentNode::new("planner", AgentRole::Planner, agent).recorded();
        let mut state = state();
        let mut ctx = NodeContext::new(&mut state);
        assert!(node.handle(Message::Prompt("plan".into()), &mut ctx).await.is_err());
        let record = state.results().last().unwrap();
        assert_eq!(record.step, StepName::Plan);
        assert_eq!(record.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_revision_prompt_reads_state() {
        let mut state = state();
        state.set_str(VERIFIER_FEEDBACK, "no tests for divide");
        state.set_str(REVIEWER_FEEDBACK, "cover divide by zero");
        state.bump_revision();

        let node = PreparePrompt::new("prepare_revision", PromptKind::Revision);
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("revise".into()), &mut ctx).await.unwrap();
        let (sent, _) = ctx.into_parts();

        let prompt = sent[0].text();
        assert!(prompt.contains("cover divide by zero"));
        assert!(prompt.contains("no tests for divide"));
        assert!(prompt.contains("revision 1 of at most 3"));
    }

    #[tokio::test]
    async fn test_initial_prompt_tolerates_missing_feedback() {
        let mut state = state();
        let node = PreparePrompt::new("prepare_initial", PromptKind::Initial);
        let mut ctx = NodeContext::new(&mut state);
        node.handle(Message::Status("go".into()), &mut ctx).await.unwrap();
        let (sent, _) = ctx.into_parts();
        assert!(sent[0].text().contains("(not specified)"));
    }

    #[tokio::test]
    async fn test_complete_nodes_yield() {
        let mut state = state();
        let mut ctx = NodeContext::new(&mut state);
        CompleteNode::no_changes("tests_correct")
            .handle(Message::Status("x".into()), &mut ctx)
            .await
            .unwrap();
        let (_, outputs) = ctx.into_parts();
        assert_eq!(outputs, vec!["Tests already correct - no changes needed"]);
        assert_eq!(state.results().last().unwrap().status, StepStatus::Skipped);

        let mut ctx = NodeContext::new(&mut state);
        CompleteNode::finished("complete")
            .handle(Message::Status("Pull request created: u".into()), &mut ctx)
            .await
            .unwrap();
        let (_, outputs) = ctx.into_parts();
        assert_eq!(outputs, vec!["Workflow completed: Pull request created: u"]);
    }
}
