//! The test-generation pipeline graph
//!
//! ```text
//! verifier -> verifier_router --TESTS_CORRECT--> tests_correct
//!                             \--default-------> prepare_initial -> planner
//! planner -> implementer -> reviewer -> reviewer_router
//! reviewer_router --REVISE--> prepare_revision -> planner
//!                 \--default-> create_pr -> complete
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use super::create_pr::CreatePrNode;
use super::graph::{SwitchCase, Workflow};
use super::message::{Decision, Message};
use super::nodes::{AgentNode, CompleteNode, Framing, PreparePrompt, PromptKind};
use super::routing::{ReviewerRouter, VerifierRouter};
use super::state::{RunArgs, SharedState};
use super::summary::{RunStatus, RunSummary};
use crate::agent::{AgentRole, AgentSet, PromptBuilder, Task};
use crate::config::WorkflowSettings;
use crate::git::WorkingTree;
use crate::scm::SourceControl;
use crate::{Error, Result};

/// Node ids of the pipeline graph
pub mod ids {
    pub const VERIFIER: &str = "verifier";
    pub const VERIFIER_ROUTER: &str = "verifier_router";
    pub const TESTS_CORRECT: &str = "tests_correct";
    pub const PREPARE_INITIAL: &str = "prepare_initial";
    pub const PLANNER: &str = "planner";
    pub const IMPLEMENTER: &str = "implementer";
    pub const REVIEWER: &str = "reviewer";
    pub const REVIEWER_ROUTER: &str = "reviewer_router";
    pub const PREPARE_REVISION: &str = "prepare_revision";
    pub const CREATE_PR: &str = "create_pr";
    pub const COMPLETE: &str = "complete";
}

/// Node executions per planner/implementer/reviewer cycle
pub const STEPS_PER_CYCLE: usize = 5;
/// Node executions outside the cycle
pub const FIXED_OVERHEAD: usize = 5;

/// Step ceiling for a revision ceiling: `(ceiling + 1) * cycle + overhead`
pub fn default_max_steps(max_revisions: u32) -> usize {
    (max_revisions as usize + 1) * STEPS_PER_CYCLE + FIXED_OVERHEAD
}

/// Build the pipeline graph
pub fn build_workflow(
    agents: &AgentSet,
    tree: Arc<dyn WorkingTree>,
    gateway: Arc<dyn SourceControl>,
    settings: &WorkflowSettings,
) -> Result<Workflow> {
    let max_steps = settings
        .max_steps
        .unwrap_or_else(|| default_max_steps(settings.max_revisions));

    Workflow::builder()
        .add_node(AgentNode::new(
            ids::VERIFIER,
            AgentRole::Verifier,
            agents.get(AgentRole::Verifier),
        ))
        .add_node(VerifierRouter::new(ids::VERIFIER_ROUTER))
        .add_node(CompleteNode::no_changes(ids::TESTS_CORRECT))
        .add_node(PreparePrompt::new(ids::PREPARE_INITIAL, PromptKind::Initial))
        .add_node(
            AgentNode::new(ids::PLANNER, AgentRole::Planner, agents.get(AgentRole::Planner))
                .recorded(),
        )
        .add_node(
            AgentNode::new(
                ids::IMPLEMENTER,
                AgentRole::Implementer,
                agents.get(AgentRole::Implementer),
            )
                .with_framing(Framing::Implement)
                .recorded(),
        )
        .add_node(
            AgentNode::new(ids::REVIEWER, AgentRole::Reviewer, agents.get(AgentRole::Reviewer))
                .with_framing(Framing::Review),
        )
        .add_node(ReviewerRouter::new(ids::REVIEWER_ROUTER))
        .add_node(PreparePrompt::new(ids::PREPARE_REVISION, PromptKind::Revision))
        .add_node(CreatePrNode::new(ids::CREATE_PR, tree, gateway))
        .add_node(CompleteNode::finished(ids::COMPLETE))
        .set_start(ids::VERIFIER)
        .add_edge(ids::VERIFIER, ids::VERIFIER_ROUTER)
        .add_switch(
            ids::VERIFIER_ROUTER,
            SwitchCase::new(ids::PREPARE_INITIAL)
                .when_decision(Decision::TESTS_CORRECT, ids::TESTS_CORRECT),
        )
        .add_edge(ids::PREPARE_INITIAL, ids::PLANNER)
        .add_edge(ids::PLANNER, ids::IMPLEMENTER)
        .add_edge(ids::IMPLEMENTER, ids::REVIEWER)
        .add_edge(ids::REVIEWER, ids::REVIEWER_ROUTER)
        .add_switch(
            ids::REVIEWER_ROUTER,
            SwitchCase::new(ids::CREATE_PR).when_decision(Decision::REVISE, ids::PREPARE_REVISION),
        )
        .add_edge(ids::PREPARE_REVISION, ids::PLANNER)
        .add_edge(ids::CREATE_PR, ids::COMPLETE)
        .max_steps(max_steps)
        .build()
}

/// The verifier's seed prompt
pub fn initial_prompt(repo_path: &Path) -> String {
    PromptBuilder::new(Task::Verify)
        .repo(repo_path.display().to_string())
        .build()
}

/// Run the pipeline once against a cloned repository
///
/// Never returns an error: failures are reported in the summary together
/// with the steps recorded before the failure.
pub async fn run_pipeline(
    repo_path: &Path,
    agents: &AgentSet,
    tree: Arc<dyn WorkingTree>,
    gateway: Arc<dyn SourceControl>,
    settings: WorkflowSettings,
) -> RunSummary {
    let started_at = Utc::now();
    let mut state = SharedState::new(RunArgs::new(repo_path, settings.clone()));

    let result = match build_workflow(agents, tree, gateway, &settings) {
        Ok(workflow) => {
            info!(
                repo = %repo_path.display(),
                max_steps = workflow.max_steps(),
                "Starting workflow"
            );
            workflow
                .run(Message::Prompt(initial_prompt(repo_path)), &mut state)
                .await
                .and_then(|outcome| {
                    if outcome.outputs.is_empty() {
                        Err(Error::Workflow(
                            "workflow finished without yielding an output".to_string(),
                        ))
                    } else {
                        Ok(outcome.outputs)
                    }
                })
        }
        Err(e) => Err(e),
    };

    let steps_executed = state.steps_executed();
    let (steps, revision_count) = state.into_results();
    let (status, outputs, error) = match result {
        Ok(outputs) => {
            info!(steps = steps_executed, revisions = revision_count, "Workflow completed");
            (RunStatus::Completed, outputs, None)
        }
        Err(e) => {
            error!(error = %e, "Workflow failed");
            (RunStatus::Failed, Vec::new(), Some(e.to_string()))
        }
    };

    RunSummary {
        status,
        started_at,
        completed_at: Utc::now(),
        repo_path: repo_path.to_path_buf(),
        outputs,
        steps,
        revision_count,
        steps_executed,
        error,
    }
}
