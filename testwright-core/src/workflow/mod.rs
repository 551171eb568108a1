//! Workflow graph, routing, and the test-generation pipeline
//!
//! This module provides:
//! - [`Workflow`]: a validated graph of nodes with edges and switch routes,
//!   run by a single-threaded message scheduler with a step ceiling
//! - [`SharedState`]: the run-scoped key-value store and revision counter
//! - Routing nodes reading structured verdicts with a `VERDICT:` fallback
//! - [`CreatePrNode`]: commit, push and pull request as a graph node
//! - [`run_pipeline`]: the Verifier → Planner → Implementer → Reviewer pipeline

mod create_pr;
mod graph;
mod message;
mod nodes;
pub mod pipeline;
mod results;
mod routing;
mod state;
mod summary;

pub use create_pr::{branch_name, describe, CreatePrNode, NO_CHANGES};
pub use graph::{
    Node, NodeContext, NodeKind, Predicate, Route, RunOutcome, SwitchCase, Workflow,
    WorkflowBuilder, DEFAULT_MAX_STEPS,
};
pub use message::{Decision, Message, ReviewerDecision, VerifierDecision};
pub use nodes::{AgentNode, CompleteNode, Framing, PreparePrompt, PromptKind};
pub use pipeline::{build_workflow, default_max_steps, initial_prompt, run_pipeline};
pub use results::{DecisionSource, ResultsLog, StepName, StepRecord, StepStatus};
pub use routing::{
    read_reviewer, read_verifier, verdict_marker, Parsed, Reading, ReviewerRouter, RoutingMode,
    VerifierRouter,
};
pub use state::{
    RunArgs, SharedState, PR_URL, REVIEWER_FEEDBACK, REVIEW_SUMMARY, VERIFIER_FEEDBACK,
    VERIFIER_REPORT,
};
pub use summary::{RunStatus, RunSummary};

/// Cut `text` to at most `limit` characters, marking the cut with `...`
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
